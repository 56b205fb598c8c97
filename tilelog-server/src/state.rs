//! Application state shared across request handlers

use crate::config::ServerConfig;
use std::sync::Arc;
use tilelog_core::CheckpointSigner;
use tilelog_engine::{AppendOptions, Appender, LogReader, QueueOptions};
use tilelog_storage::LogStorage;

/// Shared server state: the write façade, the read surface, and the config
/// the limits came from.
#[derive(Debug)]
pub struct AppState {
    /// Write path.
    pub appender: Appender,
    /// Read path; answers straight from storage.
    pub reader: LogReader,
    /// Request limits and identity.
    pub config: ServerConfig,
}

impl AppState {
    /// Assemble state over an already-constructed driver and signer set.
    pub fn new(
        config: ServerConfig,
        storage: Arc<dyn LogStorage>,
        signers: Vec<Arc<dyn CheckpointSigner>>,
    ) -> Self {
        let appender = Appender::new(
            storage.clone(),
            config.origin.clone(),
            signers,
            AppendOptions {
                queue: QueueOptions {
                    max_batch_size: config.max_batch_size,
                    max_batch_age: config.max_batch_age(),
                    max_pending: config.max_pending,
                },
            },
        );
        let reader = LogReader::new(storage);
        Self {
            appender,
            reader,
            config,
        }
    }
}
