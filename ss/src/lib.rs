//! StateStore - workspace-scoped persistent state with a recent-tasks cache
//!
//! A typed facade over an opaque key-value persistence backend. On top of the
//! raw get/set it maintains the persisted task history, a lazily computed
//! "recent tasks" cache scoped to one workspace, settings validation,
//! versioned migrations, and export/import of full state snapshots.
//!
//! # Core Concepts
//!
//! - **Backend is opaque**: the host supplies any [`StateBackend`]; no
//!   multi-key transactionality is assumed.
//! - **Conservative cache**: any write that could touch the history clears
//!   the recent-tasks cache instead of patching it. It is rebuilt on the
//!   next read.
//! - **Structured failure**: validation, sync, migration, and import report
//!   problems as values; only `reset_state` propagates its error.
//!
//! # Modules
//!
//! - [`backend`] - the persistence seam plus memory/file implementations
//! - [`history`] - the persisted [`HistoryItem`] record
//! - [`store`] - the [`StateStore`] itself
//! - [`migrate`] - the versioned upgrade table

pub mod backend;
pub mod error;
pub mod history;
pub mod migrate;
pub mod store;

pub use backend::{FileBackend, MemoryBackend, StateBackend};
pub use error::{StoreError, StoreResult};
pub use history::HistoryItem;
pub use migrate::{MIGRATIONS, Migration};
pub use store::{
    API_CONFIG_NAME_KEY, CacheStats, ExportMetadata, StateBackup, StateMetrics, StateStore, StateValidation,
    SyncReport, TASK_HISTORY_KEY, TaskSettings,
};

/// Current epoch time in milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
