//! Event bus - central pub/sub for task lifecycle events
//!
//! Built on tokio broadcast channels. The orchestrator emits, consumers
//! (UI, telemetry, the JSONL logger) subscribe. Subscription is symmetric by
//! construction: dropping the receiver unsubscribes, and an emitter holds no
//! receiver, so a disposed task cannot leak a subscription.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::{TaskEvent, TaskUsage};

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// Central bus for task lifecycle events
pub struct EventBus {
    tx: broadcast::Sender<TaskEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped; a full
    /// channel drops its oldest events.
    pub fn emit(&self, event: TaskEvent) {
        debug!(event_type = event.event_type(), task_id = event.task_id(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Create an emitter handle bound to one task id
    pub fn emitter_for(&self, task_id: impl Into<String>) -> EventEmitter {
        let task_id = task_id.into();
        debug!(%task_id, "EventBus::emitter_for: creating emitter");
        EventEmitter {
            tx: self.tx.clone(),
            task_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle for emitting events for one task without owning the bus
///
/// Cheap to clone; carries the sending half only.
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<TaskEvent>,
    task_id: String,
}

impl EventEmitter {
    /// The task id this emitter is bound to
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Emit a raw event
    pub fn emit(&self, event: TaskEvent) {
        debug!(event_type = event.event_type(), "EventEmitter::emit");
        let _ = self.tx.send(event);
    }

    // === Convenience methods ===

    /// Emit a started event
    pub fn started(&self) {
        self.emit(TaskEvent::Started {
            task_id: self.task_id.clone(),
        });
    }

    /// Emit a focused event
    pub fn focused(&self) {
        self.emit(TaskEvent::Focused {
            task_id: self.task_id.clone(),
        });
    }

    /// Emit an unfocused event
    pub fn unfocused(&self) {
        self.emit(TaskEvent::Unfocused {
            task_id: self.task_id.clone(),
        });
    }

    /// Emit an active event
    pub fn active(&self) {
        self.emit(TaskEvent::Active {
            task_id: self.task_id.clone(),
        });
    }

    /// Emit an interactive event
    pub fn interactive(&self) {
        self.emit(TaskEvent::Interactive {
            task_id: self.task_id.clone(),
        });
    }

    /// Emit a resumable event
    pub fn resumable(&self) {
        self.emit(TaskEvent::Resumable {
            task_id: self.task_id.clone(),
        });
    }

    /// Emit an idle event
    pub fn idle(&self) {
        self.emit(TaskEvent::Idle {
            task_id: self.task_id.clone(),
        });
    }

    /// Emit an aborted event
    pub fn aborted(&self) {
        self.emit(TaskEvent::Aborted {
            task_id: self.task_id.clone(),
        });
    }

    /// Emit a completed event with usage totals
    pub fn completed(&self, usage: TaskUsage) {
        self.emit(TaskEvent::Completed {
            task_id: self.task_id.clone(),
            usage,
        });
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}
