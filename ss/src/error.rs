//! Store errors
//!
//! Structured error type for state operations. Recoverable categories
//! (sync, migration, import) are caught at the store boundary and surfaced
//! as booleans or reports; these errors are what gets logged on the way.

use thiserror::Error;

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Invalid backup: {0}")]
    InvalidBackup(String),
}

/// Result from state operations
pub type StoreResult<T> = Result<T, StoreError>;
