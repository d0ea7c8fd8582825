//! Task stack orchestrator
//!
//! A strict LIFO stack of tasks: the tail entry is the one in focus, every
//! other entry is a paused ancestor waiting for its subtask chain to unwind.
//! The stack is the sole owner of task lifetimes. Callers serialize access
//! themselves; there is no internal locking.
//!
//! Removal and cleanup are deliberately decoupled: `pop` takes the entry off
//! the stack first and only then requests abort, so a misbehaving task can
//! never block stack bookkeeping. Preparation hooks are the opposite case,
//! their failures propagate because an unprepared task must not reach the
//! stack at all.

use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use statestore::{HistoryItem, StateStore};

use crate::events::EventBus;
use crate::task::{Task, TaskOptions, TaskState};

/// External collaborator run once per task before it reaches the stack
///
/// Failures propagate: preparation is load-bearing for correct task setup.
#[async_trait]
pub trait PrepareHook: Send + Sync {
    async fn perform_preparation_tasks(&self, task: &Task) -> Result<()>;
}

/// Synchronous callback invoked once per created task, before it is returned
pub type OnCreated = Box<dyn Fn(&Task) + Send + Sync>;

/// Point-in-time counters over the stack
///
/// `completed` is always 0: completed tasks leave the stack, and counting
/// them is a history concern, not an in-memory one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackMetrics {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
}

/// LIFO stack of tasks sharing one event bus and one state store
pub struct TaskStack {
    tasks: Vec<Arc<Task>>,
    event_bus: Arc<EventBus>,
    store: Arc<Mutex<StateStore>>,
    on_created: Option<OnCreated>,
    prepare: Option<Arc<dyn PrepareHook>>,
}

impl TaskStack {
    pub fn new(event_bus: Arc<EventBus>, store: Arc<Mutex<StateStore>>) -> Self {
        Self {
            tasks: Vec::new(),
            event_bus,
            store,
            on_created: None,
            prepare: None,
        }
    }

    /// Register the task-creation callback
    pub fn with_on_created(mut self, on_created: OnCreated) -> Self {
        self.on_created = Some(on_created);
        self
    }

    /// Register the preparation hook
    pub fn with_prepare_hook(mut self, hook: Arc<dyn PrepareHook>) -> Self {
        self.prepare = Some(hook);
        self
    }

    /// The tail entry, if any
    pub fn current_task(&self) -> Option<Arc<Task>> {
        self.tasks.last().cloned()
    }

    pub fn stack_size(&self) -> usize {
        self.tasks.len()
    }

    /// Task ids bottom-to-top
    pub fn stack_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.task_id.clone()).collect()
    }

    /// Append a task to the tail and focus it
    ///
    /// Unconditional: no dedup check, the caller must not push a task that
    /// is already present.
    pub fn push(&mut self, task: Arc<Task>) {
        debug!(task_id = %task.task_id, depth = self.tasks.len() + 1, "push");
        if let Some(prev) = self.tasks.last() {
            prev.set_state(TaskState::Unfocused);
        }
        task.set_state(TaskState::Focused);
        task.emitter().focused();
        self.tasks.push(task);
    }

    /// Remove the tail entry and request its abort
    ///
    /// The entry is gone before abort is invoked; abort failure is logged
    /// and swallowed, never a correctness hazard for stack state.
    pub async fn pop(&mut self) -> Option<Arc<Task>> {
        let task = self.tasks.pop()?;
        debug!(task_id = %task.task_id, depth = self.tasks.len(), "pop");
        task.emitter().unfocused();
        if let Err(error) = task.abort().await {
            warn!(task_id = %task.task_id, %error, "pop: abort failed, task already removed");
        }
        task.set_state(TaskState::Removed);
        Some(task)
    }

    /// Pop the current task if the stack is non-empty
    pub async fn clear_current(&mut self) {
        if !self.tasks.is_empty() {
            self.pop().await;
        }
    }

    /// Pop until empty, aborting strictly top-to-bottom
    ///
    /// Each abort is fully awaited before the next pop; failures stay
    /// isolated per task.
    pub async fn clear_all(&mut self) {
        debug!(depth = self.tasks.len(), "clear_all");
        while !self.tasks.is_empty() {
            self.pop().await;
        }
    }

    pub fn find_by_id(&self, task_id: &str) -> Option<Arc<Task>> {
        self.tasks.iter().find(|t| t.task_id == task_id).cloned()
    }

    /// True iff `task_id` is the current task's id
    pub fn is_active(&self, task_id: &str) -> bool {
        self.tasks.last().is_some_and(|t| t.task_id == task_id)
    }

    /// Construct a new task, prepare it, record it in history, and push it
    ///
    /// Configuration is fetched fresh from the store per call. The stack is
    /// not mutated until every fallible step has succeeded.
    pub async fn create_task(
        &mut self,
        text: Option<String>,
        parent: Option<&Arc<Task>>,
        options: TaskOptions,
    ) -> Result<Arc<Task>> {
        let task_id = Uuid::now_v7().to_string();
        debug!(%task_id, "create_task: called");

        let settings = self.store.lock().await.task_settings()?;
        let root_task_id = self
            .tasks
            .first()
            .map(|t| t.task_id.clone())
            .unwrap_or_else(|| task_id.clone());
        let parent_task_id = parent.map(|t| t.task_id.clone());
        let task_number = self.tasks.len() + 1;

        let task = Arc::new(Task::new(
            task_id.clone(),
            task_number,
            root_task_id.clone(),
            parent_task_id.clone(),
            text.clone(),
            settings,
            self.event_bus.emitter_for(&task_id),
            options,
        ));

        if let Some(hook) = &self.prepare {
            hook.perform_preparation_tasks(&task).await?;
        }
        if let Some(on_created) = &self.on_created {
            on_created(&task);
        }

        {
            let mut store = self.store.lock().await;
            let mut item = HistoryItem::new(&task_id, text.unwrap_or_default(), store.workspace())
                .with_number(task_number);
            item = item.with_root_task(&root_task_id);
            if let Some(parent_id) = &parent_task_id {
                item = item.with_parent_task(parent_id);
            }
            store.update_task_history(item)?;
        }

        task.emitter().started();
        self.push(Arc::clone(&task));
        Ok(task)
    }

    /// Rebuild a previously-run task from its history record and push it
    ///
    /// Identity and stack relations come from the record, not from current
    /// stack depth. The rebuilt task is a new instance of the same id.
    pub async fn create_task_from_history(
        &mut self,
        item: &HistoryItem,
        options: TaskOptions,
    ) -> Result<Arc<Task>> {
        debug!(task_id = %item.id, "create_task_from_history: called");

        let settings = self.store.lock().await.task_settings()?;
        let root_task_id = item.root_task_id.clone().unwrap_or_else(|| item.id.clone());

        let task = Arc::new(Task::new(
            &item.id,
            item.number,
            root_task_id,
            item.parent_task_id.clone(),
            Some(item.task.clone()),
            settings,
            self.event_bus.emitter_for(&item.id),
            options,
        ));

        if let Some(hook) = &self.prepare {
            hook.perform_preparation_tasks(&task).await?;
        }
        if let Some(on_created) = &self.on_created {
            on_created(&task);
        }

        task.emitter().started();
        self.push(Arc::clone(&task));
        Ok(task)
    }

    /// Request abort on the current task without removing it
    ///
    /// Removal is expected to follow from the task's own abort completion;
    /// nothing here assumes it happens synchronously.
    pub async fn cancel_current(&mut self) {
        let Some(task) = self.tasks.last().cloned() else {
            return;
        };
        debug!(task_id = %task.task_id, "cancel_current");
        if let Err(error) = task.abort().await {
            warn!(task_id = %task.task_id, %error, "cancel_current: abort failed");
        }
    }

    /// Re-assert focus on a stacked task
    ///
    /// Resuming a non-top task does not reorder the stack: every non-tail
    /// entry stays a paused ancestor. Returns `false` for an absent id, and
    /// `true` as a no-op when the task is already current.
    pub fn resume(&mut self, task_id: &str) -> bool {
        let Some(task) = self.find_by_id(task_id) else {
            return false;
        };
        if self.is_active(task_id) {
            return true;
        }
        debug!(%task_id, "resume: re-asserting focus on non-top task");
        task.set_state(TaskState::Focused);
        task.emitter().focused();
        true
    }

    /// Subtask-return protocol: pop the current entry and hand its final
    /// output to the new current task as a resumption argument
    pub async fn finish_subtask(&mut self, last_message: &str) -> Result<()> {
        debug!(depth = self.tasks.len(), "finish_subtask: called");
        self.pop().await;
        if let Some(parent) = self.current_task()
            && parent.supports_resume()
        {
            parent.set_state(TaskState::Focused);
            parent.resume_with_message(last_message).await?;
        }
        Ok(())
    }

    /// Pure validation predicate over a task
    pub fn validate(&self, task: &Task) -> bool {
        task.is_valid()
    }

    pub fn metrics(&self) -> StackMetrics {
        StackMetrics {
            total: self.tasks.len(),
            active: usize::from(self.current_task().is_some()),
            completed: 0,
        }
    }

    /// Soft pause: emit `Idle` on the current task, keep it on the stack
    pub fn pause_current(&mut self) {
        if let Some(task) = self.tasks.last() {
            debug!(task_id = %task.task_id, "pause_current");
            task.set_state(TaskState::Idle);
            task.emitter().idle();
        }
    }

    /// Mark a stacked task explicitly active; `false` for an absent id
    pub fn activate(&mut self, task_id: &str) -> bool {
        let Some(task) = self.find_by_id(task_id) else {
            return false;
        };
        debug!(%task_id, "activate");
        task.set_state(TaskState::Active);
        task.emitter().active();
        true
    }
}

impl std::fmt::Debug for TaskStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStack")
            .field("stack_ids", &self.stack_ids())
            .finish()
    }
}
