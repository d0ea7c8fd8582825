//! Lifecycle event system
//!
//! Every task state transition the orchestrator drives emits a typed event
//! to a central bus (tokio broadcast). Consumers subscribe for UI updates,
//! telemetry, or persistence; the bundled [`EventLogger`] writes a JSONL
//! trail per task id.
//!
//! ```text
//!   TaskStack ──emit──▶ EventBus ──▶ subscriber (UI)
//!                            │
//!                            ├─────▶ subscriber (telemetry)
//!                            └─────▶ EventLogger (.jsonl)
//! ```
//!
//! Subscription and unsubscription are symmetric: receivers unsubscribe by
//! drop, and emitters hold only the sending half, so task disposal cannot
//! leak a listener.

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter, create_event_bus};
pub use logger::{EventLogger, read_task_events, spawn_event_logger};
pub use types::{EventLogEntry, TaskEvent, TaskUsage};
