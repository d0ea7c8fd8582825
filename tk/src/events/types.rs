//! Lifecycle event types
//!
//! The vocabulary of task activity as seen from the outside: every state
//! transition the orchestrator drives emits exactly one of these. External
//! consumers (UI, telemetry) subscribe to the bus and match on the variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Usage/telemetry payload attached to task completion
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskUsage {
    /// Input tokens consumed over the task's lifetime
    pub tokens_in: u64,
    /// Output tokens produced over the task's lifetime
    pub tokens_out: u64,
    /// Total cost in dollars
    pub total_cost: f64,
}

/// Core event enum - every variant carries the task id it concerns
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskEvent {
    /// The task has begun executing
    Started { task_id: String },
    /// The task became the current (tail) stack entry
    Focused { task_id: String },
    /// The task stopped being the current stack entry
    Unfocused { task_id: String },
    /// The task was explicitly activated by the host
    Active { task_id: String },
    /// The task is waiting on user interaction
    Interactive { task_id: String },
    /// The task can be resumed from persisted history
    Resumable { task_id: String },
    /// The task was soft-paused without leaving the stack
    Idle { task_id: String },
    /// The task was aborted
    Aborted { task_id: String },
    /// The task finished, with its usage totals
    Completed { task_id: String, usage: TaskUsage },
}

impl TaskEvent {
    /// Get the task id this event concerns
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::Started { task_id }
            | TaskEvent::Focused { task_id }
            | TaskEvent::Unfocused { task_id }
            | TaskEvent::Active { task_id }
            | TaskEvent::Interactive { task_id }
            | TaskEvent::Resumable { task_id }
            | TaskEvent::Idle { task_id }
            | TaskEvent::Aborted { task_id }
            | TaskEvent::Completed { task_id, .. } => task_id,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            TaskEvent::Started { .. } => "Started",
            TaskEvent::Focused { .. } => "Focused",
            TaskEvent::Unfocused { .. } => "Unfocused",
            TaskEvent::Active { .. } => "Active",
            TaskEvent::Interactive { .. } => "Interactive",
            TaskEvent::Resumable { .. } => "Resumable",
            TaskEvent::Idle { .. } => "Idle",
            TaskEvent::Aborted { .. } => "Aborted",
            TaskEvent::Completed { .. } => "Completed",
        }
    }

    /// True for events that end a task's observable life
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Aborted { .. } | TaskEvent::Completed { .. })
    }
}

/// A timestamped event log entry for file persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Timestamp of the event
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// The event
    pub event: TaskEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(event: TaskEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
