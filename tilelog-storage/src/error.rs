//! Error types for tilelog-storage

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage driver error type
///
/// `PreconditionFailed` is expected under writer contention and should
/// trigger retry logic upstream, not be treated as fatal.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O or backend error
    #[error("I/O error: {0}")]
    Io(String),

    /// Object not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// State CAS conflict: another writer advanced the log
    #[error("Precondition failed (state CAS conflict)")]
    PreconditionFailed,

    /// Stored bytes fail validation
    #[error("Corrupt object: {0}")]
    Corrupt(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    /// Create an I/O error
    pub fn io(msg: impl Into<String>) -> Self {
        StorageError::Io(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        StorageError::NotFound(msg.into())
    }

    /// Create a corrupt object error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        StorageError::Corrupt(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        StorageError::Other(msg.into())
    }

    /// Whether this is the CAS-conflict case
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, StorageError::PreconditionFailed)
    }

    /// Whether this is the not-found case
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}
