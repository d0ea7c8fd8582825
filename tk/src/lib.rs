//! TaskStack - Hierarchical Task Lifecycle Orchestrator
//!
//! TaskStack manages a strict LIFO stack of tasks: starting a subtask suspends
//! its parent, finishing it resumes the parent with the subtask's final
//! output. Every lifecycle transition fans out over a typed event bus so UI
//! and telemetry collaborators can observe tasks without owning them.
//!
//! # Core Concepts
//!
//! - **The stack owns lifetime**: parent/root links are ids, never ownership
//! - **Removal beats cleanup**: a popped entry is gone before abort runs;
//!   a misbehaving task cannot corrupt stack state
//! - **Fresh instances**: a resumed task is a new instance of the same id
//! - **State in the store**: configuration and history live in [`statestore`],
//!   fetched fresh per task creation
//!
//! # Modules
//!
//! - [`events`] - Typed lifecycle event bus and JSONL event logger
//! - [`task`] - Task model, lifecycle states, and the driver contract
//! - [`stack`] - The LIFO orchestrator

pub mod events;
pub mod stack;
pub mod task;

pub use stack::{OnCreated, PrepareHook, StackMetrics, TaskStack};
pub use task::{NoopDriver, Task, TaskDriver, TaskOptions, TaskState};

// Events module re-exports
pub use events::{
    DEFAULT_CHANNEL_CAPACITY, EventBus, EventEmitter, EventLogEntry, EventLogger, TaskEvent, TaskUsage,
    create_event_bus, read_task_events, spawn_event_logger,
};

// Store types the orchestrator surfaces at its API boundary
pub use statestore::{HistoryItem, StateStore, TaskSettings};
