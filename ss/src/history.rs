//! HistoryItem - persisted record of a task occurrence
//!
//! Independent of any in-memory task object. Ids are unique across the full
//! history collection; updates replace in place, new ids append, so the
//! sequence order is discovery order rather than time order.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::now_ms;

/// A persisted record of a task's occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    /// Stable task id this record belongs to
    pub id: String,
    /// Epoch millis of the occurrence; 0 means unknown and the item is
    /// excluded from recent-tasks computation
    #[serde(default)]
    pub ts: i64,
    /// Task text as shown to the user
    #[serde(default)]
    pub task: String,
    /// Workspace path the task ran in
    #[serde(default)]
    pub workspace: String,
    /// 1-based position in the stack at creation time
    #[serde(default)]
    pub number: usize,
    /// Id of the stack's root task at creation, if the task was nested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_task_id: Option<String>,
    /// Id of the parent task, if the task was a subtask
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,
}

impl HistoryItem {
    /// Create a new history item stamped with the current time
    pub fn new(id: impl Into<String>, task: impl Into<String>, workspace: impl Into<String>) -> Self {
        let id = id.into();
        debug!(%id, "HistoryItem::new: called");
        Self {
            id,
            ts: now_ms(),
            task: task.into(),
            workspace: workspace.into(),
            number: 1,
            root_task_id: None,
            parent_task_id: None,
        }
    }

    /// Set the timestamp
    pub fn with_ts(mut self, ts: i64) -> Self {
        self.ts = ts;
        self
    }

    /// Set the task number
    pub fn with_number(mut self, number: usize) -> Self {
        self.number = number;
        self
    }

    /// Set the root task back-reference
    pub fn with_root_task(mut self, id: impl Into<String>) -> Self {
        self.root_task_id = Some(id.into());
        self
    }

    /// Set the parent task back-reference
    pub fn with_parent_task(mut self, id: impl Into<String>) -> Self {
        self.parent_task_id = Some(id.into());
        self
    }
}
