//! Error types for tilelog-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed hash tile bytes
    #[error("Malformed tile: {0}")]
    MalformedTile(String),

    /// Malformed entry bundle bytes
    #[error("Malformed bundle: {0}")]
    MalformedBundle(String),

    /// Malformed checkpoint or note
    #[error("Malformed checkpoint: {0}")]
    MalformedCheckpoint(String),

    /// Unparseable tile or bundle path
    #[error("Malformed path: {0}")]
    MalformedPath(String),

    /// Entry exceeds the bundle length-prefix limit
    #[error("Entry too large: {0} bytes (max {max})", max = crate::bundle::MAX_ENTRY_SIZE)]
    EntryTooLarge(usize),

    /// Signing or verification failure
    #[error("Signature error: {0}")]
    Signature(String),
}

impl Error {
    /// Create a malformed tile error
    pub fn malformed_tile(msg: impl Into<String>) -> Self {
        Error::MalformedTile(msg.into())
    }

    /// Create a malformed bundle error
    pub fn malformed_bundle(msg: impl Into<String>) -> Self {
        Error::MalformedBundle(msg.into())
    }

    /// Create a malformed checkpoint error
    pub fn malformed_checkpoint(msg: impl Into<String>) -> Self {
        Error::MalformedCheckpoint(msg.into())
    }

    /// Create a malformed path error
    pub fn malformed_path(msg: impl Into<String>) -> Self {
        Error::MalformedPath(msg.into())
    }

    /// Create a signature error
    pub fn signature(msg: impl Into<String>) -> Self {
        Error::Signature(msg.into())
    }
}
