//! Task model
//!
//! A task is an opaque unit of work with a defined lifecycle contract: the
//! orchestrator never looks inside it, it only drives state transitions and
//! delegates abort/resume to the task's [`TaskDriver`]. Identity is split in
//! two: `task_id` is stable across resumptions, `instance_id` names one
//! in-memory execution (a resumed task gets a fresh instance).

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use tracing::{debug, warn};
use uuid::Uuid;

use statestore::TaskSettings;

use crate::events::{EventEmitter, TaskUsage};

/// Lifecycle states as observed by the orchestrator
///
/// `Removed` is terminal: a popped instance never re-enters the stack. A
/// resumed task of the same `task_id` is a new instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Constructed, not yet on the stack
    Created,
    /// Current (tail) stack entry
    Focused,
    /// Paused ancestor or otherwise out of focus
    Unfocused,
    /// Soft-paused without leaving the stack
    Idle,
    /// Explicitly activated by the host
    Active,
    /// Abort requested, cleanup in flight
    Aborting,
    /// Popped from the stack; terminal
    Removed,
}

/// The lifecycle contract a task implementation fulfils
///
/// Abort is graceful cancellation: request and best-effort wait. No timeout
/// is enforced here; a hung abort stalls the caller until an external
/// watchdog intervenes.
#[async_trait]
pub trait TaskDriver: Send + Sync {
    /// Request graceful cancellation
    async fn abort(&self) -> Result<()> {
        Ok(())
    }

    /// Whether this task can accept a resume message from a finished subtask
    fn supports_resume(&self) -> bool {
        false
    }

    /// Hand the task a finished subtask's final output
    async fn resume_with_message(&self, _last_message: &str) -> Result<()> {
        Ok(())
    }
}

/// Driver for tasks with no cancellation or resumption behavior
#[derive(Debug, Default)]
pub struct NoopDriver;

#[async_trait]
impl TaskDriver for NoopDriver {}

/// Construction-time options for a task
#[derive(Clone)]
pub struct TaskOptions {
    /// The lifecycle driver; defaults to a no-op
    pub driver: Arc<dyn TaskDriver>,
    /// Image attachments handed to the task
    pub images: Vec<String>,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            driver: Arc::new(NoopDriver),
            images: Vec::new(),
        }
    }
}

impl std::fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskOptions").field("images", &self.images).finish()
    }
}

/// A unit of work on the stack
///
/// The stack is the sole owner of a task's lifetime; `root_task_id` and
/// `parent_task_id` are relation-only back-references, never ownership.
pub struct Task {
    /// Stable identity across resumptions
    pub task_id: String,
    /// Identity of this in-memory execution
    pub instance_id: String,
    /// 1-based stack position at creation time
    pub task_number: usize,
    /// Id of the stack's bottom-most task at creation (self for a root task)
    pub root_task_id: String,
    /// Id of the spawning task, if this is a subtask
    pub parent_task_id: Option<String>,
    /// Task text
    pub text: Option<String>,
    /// Image attachments
    pub images: Vec<String>,
    /// Settings snapshot fetched at construction
    pub settings: TaskSettings,
    abandoned: AtomicBool,
    state: RwLock<TaskState>,
    emitter: EventEmitter,
    driver: Arc<dyn TaskDriver>,
}

impl Task {
    /// Construct a task with a fresh instance id
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_id: impl Into<String>,
        task_number: usize,
        root_task_id: impl Into<String>,
        parent_task_id: Option<String>,
        text: Option<String>,
        settings: TaskSettings,
        emitter: EventEmitter,
        options: TaskOptions,
    ) -> Self {
        let task_id = task_id.into();
        let instance_id = Uuid::now_v7().to_string();
        debug!(%task_id, %instance_id, task_number, "Task::new: called");
        Self {
            task_id,
            instance_id,
            task_number,
            root_task_id: root_task_id.into(),
            parent_task_id,
            text,
            images: options.images,
            settings,
            abandoned: AtomicBool::new(false),
            state: RwLock::new(TaskState::Created),
            emitter,
            driver: options.driver,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> TaskState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Transition to a new state; `Removed` is terminal and sticky
    pub fn set_state(&self, next: TaskState) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *state == TaskState::Removed {
            warn!(task_id = %self.task_id, ?next, "set_state: task already removed, ignoring");
            return;
        }
        debug!(task_id = %self.task_id, from = ?*state, to = ?next, "set_state");
        *state = next;
    }

    /// Mark this task abandoned; it will fail validation from now on
    pub fn mark_abandoned(&self) {
        debug!(task_id = %self.task_id, "mark_abandoned");
        self.abandoned.store(true, Ordering::SeqCst);
    }

    /// Whether the task has been abandoned
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::SeqCst)
    }

    /// Validation predicate: ids present and not abandoned
    pub fn is_valid(&self) -> bool {
        !self.task_id.is_empty() && !self.instance_id.is_empty() && !self.is_abandoned()
    }

    /// The emitter bound to this task's id
    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }

    /// Request graceful cancellation via the driver
    ///
    /// Emits `Aborted` when the driver acknowledges. Errors propagate to the
    /// caller, which decides whether they matter (the stack swallows them).
    pub async fn abort(&self) -> Result<()> {
        debug!(task_id = %self.task_id, "Task::abort: called");
        self.set_state(TaskState::Aborting);
        self.driver.abort().await?;
        self.emitter.aborted();
        Ok(())
    }

    /// Whether the driver accepts resume messages
    pub fn supports_resume(&self) -> bool {
        self.driver.supports_resume()
    }

    /// Hand this task a finished subtask's final output
    pub async fn resume_with_message(&self, last_message: &str) -> Result<()> {
        debug!(task_id = %self.task_id, "Task::resume_with_message: called");
        self.driver.resume_with_message(last_message).await
    }

    /// Emit completion with usage totals
    pub fn complete(&self, usage: TaskUsage) {
        debug!(task_id = %self.task_id, "Task::complete: called");
        self.emitter.completed(usage);
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("task_id", &self.task_id)
            .field("instance_id", &self.instance_id)
            .field("task_number", &self.task_number)
            .field("root_task_id", &self.root_task_id)
            .field("parent_task_id", &self.parent_task_id)
            .field("state", &self.state())
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}
