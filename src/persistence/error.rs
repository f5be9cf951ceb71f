//! Error types for persistence operations.

use thiserror::Error;

/// Errors that can occur while writing or loading snapshots.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// I/O error (file operations, disk I/O)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Format error (bad magic bytes, version mismatch, misaligned files, truncation)
    #[error("format error: {0}")]
    Format(String),

    /// Serialization error (serde_json manifest)
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Snapshot cannot be produced from the current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Resource not found (file, pool, etc.)
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Persisted configuration is not usable
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(format!("serde_json error: {}", e))
    }
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;
