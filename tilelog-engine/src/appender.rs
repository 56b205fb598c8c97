//! The public write façade
//!
//! An [`Appender`] wires the admission queue to a [`Sequencer`] over a
//! storage driver. `add` returns a shared future that resolves once the
//! entry's batch has been integrated and its checkpoint published; dropping
//! the future abandons the wait but never the integration. Dropping the
//! appender shuts the queue down and resolves unfinished waiters with
//! [`EngineError::QueueClosed`].

use crate::queue::{BatchFn, Queue};
use crate::sequencer::Sequencer;
use futures::FutureExt;
use std::sync::Arc;
use tilelog_core::{CheckpointSigner, Entry};
use tilelog_storage::LogStorage;

pub use crate::queue::{IndexFuture, QueueOptions};

/// Tuning for an [`Appender`].
#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Queue batching and admission knobs.
    pub queue: QueueOptions,
}

/// Accepts entries and drives them through sequencing and integration.
#[derive(Debug)]
pub struct Appender {
    queue: Queue,
    sequencer: Arc<Sequencer>,
}

impl Appender {
    /// Create an appender for the log identified by `origin`, publishing
    /// checkpoints signed by `signers`.
    pub fn new(
        storage: Arc<dyn LogStorage>,
        origin: impl Into<String>,
        signers: Vec<Arc<dyn CheckpointSigner>>,
        options: AppendOptions,
    ) -> Self {
        let sequencer = Arc::new(Sequencer::new(storage, origin, signers));
        let flush: BatchFn = {
            let sequencer = sequencer.clone();
            Arc::new(move |entries: Vec<Entry>| {
                let sequencer = sequencer.clone();
                async move { sequencer.append_batch(&entries).await }.boxed()
            })
        };
        Self {
            queue: Queue::new(options.queue, flush),
            sequencer,
        }
    }

    /// Queue an entry for integration. The returned future resolves with
    /// the entry's assigned index once its batch's checkpoint is published.
    /// A submission whose identity is already in flight receives the
    /// original submission's future.
    pub fn add(&self, entry: Entry) -> IndexFuture {
        self.queue.add(entry)
    }

    /// The log's origin string.
    pub fn origin(&self) -> &str {
        self.sequencer.origin()
    }
}
