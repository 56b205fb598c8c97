//! Error types for tilelog-engine
//!
//! `EngineError` is `Clone`: when a batch fails, every waiter in that batch
//! (the original submitter and all deduped duplicates) is resolved with the
//! same error value.

use thiserror::Error;
use tilelog_storage::StorageError;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Object not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lost the state CAS: another writer advanced the log. Retryable.
    #[error("State conflict: {0}")]
    StateConflict(String),

    /// Client-supplied entry was rejected
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    /// The queue is full; back off and resubmit
    #[error("Queue overloaded")]
    Overloaded,

    /// The queue has shut down
    #[error("Queue closed")]
    QueueClosed,

    /// A structural invariant does not hold. Fatal; state is never advanced
    /// past one of these.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    /// Migration completed but the recomputed root disagrees with the
    /// source. Fatal.
    #[error("Root mismatch: local {local} != source {source_root}")]
    RootMismatch {
        /// Locally recomputed root, hex
        local: String,
        /// Root advertised by the source, hex
        source_root: String,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        EngineError::Storage(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        EngineError::NotFound(msg.into())
    }

    /// Create a state conflict error
    pub fn state_conflict(msg: impl Into<String>) -> Self {
        EngineError::StateConflict(msg.into())
    }

    /// Create an invalid entry error
    pub fn invalid_entry(msg: impl Into<String>) -> Self {
        EngineError::InvalidEntry(msg.into())
    }

    /// Create an invariant violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        EngineError::Invariant(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }

    /// Whether the caller may retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::StateConflict(_) | EngineError::Storage(_) | EngineError::Overloaded
        )
    }

    /// Whether this is the not-found case
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::PreconditionFailed => EngineError::state_conflict(e.to_string()),
            StorageError::NotFound(msg) => EngineError::NotFound(msg),
            other => EngineError::Storage(other.to_string()),
        }
    }
}

impl From<tilelog_core::Error> for EngineError {
    fn from(e: tilelog_core::Error) -> Self {
        // Core parse failures over stored or fetched bytes mean the data
        // does not say what the tree claims it says.
        EngineError::Invariant(e.to_string())
    }
}
