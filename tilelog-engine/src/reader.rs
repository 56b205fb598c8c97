//! The public read surface
//!
//! Strict byte pass-throughs from the storage driver. Reads never touch the
//! write path and never wait for in-flight integration: they serve whatever
//! snapshot the driver returns.

use crate::error::{EngineError, Result};
use std::sync::Arc;
use tilelog_storage::LogStorage;

/// Read-only access to a log's published objects.
#[derive(Debug, Clone)]
pub struct LogReader {
    storage: Arc<dyn LogStorage>,
}

impl LogReader {
    /// Create a reader over the given driver.
    pub fn new(storage: Arc<dyn LogStorage>) -> Self {
        Self { storage }
    }

    /// The latest signed checkpoint note, or `NotFound` while the log has
    /// never integrated anything.
    pub async fn read_checkpoint(&self) -> Result<Vec<u8>> {
        match self.storage.get_state().await? {
            Some(state) => Ok(state.checkpoint),
            None => Err(EngineError::not_found("checkpoint")),
        }
    }

    /// Raw tile bytes at `(level, index, partial)`.
    pub async fn read_tile(&self, level: u64, index: u64, partial: u64) -> Result<Vec<u8>> {
        Ok(self.storage.get_tile(level, index, partial).await?)
    }

    /// Raw entry bundle bytes at `(index, partial)`.
    pub async fn read_entry_bundle(&self, index: u64, partial: u64) -> Result<Vec<u8>> {
        Ok(self.storage.get_entry_bundle(index, partial).await?)
    }
}
