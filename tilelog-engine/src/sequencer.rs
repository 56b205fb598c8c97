//! The sequencer: single-writer batch transactions
//!
//! One transaction assigns contiguous indices to a batch, writes its entry
//! bundles, integrates the new leaf hashes into the tile grid, signs a fresh
//! checkpoint, and publishes the advanced state with a compare-and-swap on
//! the stored record. The CAS is the linearization point: a lost swap means
//! another writer advanced the log, the transaction is retried from the
//! reloaded state, and any tiles written meanwhile are unreferenced noise.
//!
//! An in-process mutex keeps transactions serial inside this process; the
//! CAS protects against writers elsewhere.

use crate::bundles::write_bundles;
use crate::error::{EngineError, Result};
use crate::integrate::integrate;
use std::sync::Arc;
use tilelog_core::{sign_note, Checkpoint, CheckpointSigner, Entry, Hash};
use tilelog_storage::{LogStorage, TreeState};
use tokio::sync::Mutex;

/// Lost-CAS retries before surfacing the conflict to the queue.
const MAX_CAS_RETRIES: u32 = 3;

/// Assigns indices and drives integration for one log.
pub struct Sequencer {
    storage: Arc<dyn LogStorage>,
    origin: String,
    signers: Vec<Arc<dyn CheckpointSigner>>,
    write_lock: Mutex<()>,
}

impl Sequencer {
    /// Create a sequencer for the log identified by `origin`.
    pub fn new(
        storage: Arc<dyn LogStorage>,
        origin: impl Into<String>,
        signers: Vec<Arc<dyn CheckpointSigner>>,
    ) -> Self {
        Self {
            storage,
            origin: origin.into(),
            signers,
            write_lock: Mutex::new(()),
        }
    }

    /// The log's origin string, as stamped into checkpoints.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Sequence and integrate one batch, returning the index assigned to
    /// the first entry. Entries receive `start, start+1, ...` in submission
    /// order.
    pub async fn append_batch(&self, entries: &[Entry]) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let mut attempt = 0;
        loop {
            match self.try_append(entries).await {
                Err(EngineError::StateConflict(msg)) if attempt < MAX_CAS_RETRIES => {
                    attempt += 1;
                    tracing::warn!(attempt, %msg, "state CAS lost, retrying batch");
                }
                other => return other,
            }
        }
    }

    /// Integrate entries whose bundles are already durable (the migration
    /// path), returning the new tree size.
    pub(crate) async fn integrate_hashes(&self, leaf_hashes: &[Hash]) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let prev = self.storage.get_state().await?;
        let base_size = prev.as_ref().map_or(0, |s| s.size);
        self.publish(prev, base_size, leaf_hashes).await
    }

    async fn try_append(&self, entries: &[Entry]) -> Result<u64> {
        let prev = self.storage.get_state().await?;
        let base_size = prev.as_ref().map_or(0, |s| s.size);
        if entries.is_empty() {
            return Ok(base_size);
        }

        write_bundles(self.storage.as_ref(), base_size, entries).await?;
        let hashes: Vec<Hash> = entries.iter().map(Entry::leaf_hash).collect();
        self.publish(prev, base_size, &hashes).await?;
        Ok(base_size)
    }

    /// Integrate `leaf_hashes` on top of `base_size`, then CAS-publish the
    /// new signed state.
    async fn publish(
        &self,
        prev: Option<TreeState>,
        base_size: u64,
        leaf_hashes: &[Hash],
    ) -> Result<u64> {
        let (size, root) = integrate(self.storage.as_ref(), base_size, leaf_hashes).await?;
        let checkpoint = Checkpoint {
            origin: self.origin.clone(),
            size,
            root,
        };
        let signer_refs: Vec<&dyn CheckpointSigner> =
            self.signers.iter().map(|s| s.as_ref()).collect();
        let note = sign_note(&checkpoint, &signer_refs)?;

        let next = TreeState {
            size,
            root,
            checkpoint: note,
        };
        self.storage.put_state(prev.as_ref(), &next).await?;
        tracing::info!(size, root = %hex::encode(root), "published checkpoint");
        Ok(size)
    }
}

impl std::fmt::Debug for Sequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sequencer")
            .field("origin", &self.origin)
            .field("signers", &self.signers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use tilelog_core::{open_note, Ed25519CheckpointSigner};
    use tilelog_storage::MemoryLogStorage;

    fn test_sequencer(storage: Arc<dyn LogStorage>) -> (Sequencer, Ed25519CheckpointSigner) {
        let key = SigningKey::from_bytes(&[3u8; 32]);
        let signer = Ed25519CheckpointSigner::new("test.example/log", key.clone()).unwrap();
        let seq = Sequencer::new(
            storage,
            "test.example/log",
            vec![Arc::new(
                Ed25519CheckpointSigner::new("test.example/log", key).unwrap(),
            )],
        );
        (seq, signer)
    }

    fn entries(range: std::ops::Range<u64>) -> Vec<Entry> {
        range
            .map(|i| Entry::new(format!("entry-{i}").into_bytes()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_first_batch_starts_at_zero() {
        let storage = Arc::new(MemoryLogStorage::new());
        let (seq, signer) = test_sequencer(storage.clone());

        let start = seq.append_batch(&entries(0..3)).await.unwrap();
        assert_eq!(start, 0);

        let state = storage.get_state().await.unwrap().unwrap();
        assert_eq!(state.size, 3);
        let cp = open_note(&state.checkpoint, &signer.verifier()).unwrap();
        assert_eq!(cp.size, 3);
        assert_eq!(cp.root, state.root);
        assert_eq!(cp.origin, "test.example/log");
    }

    #[tokio::test]
    async fn test_batches_are_contiguous() {
        let storage = Arc::new(MemoryLogStorage::new());
        let (seq, _) = test_sequencer(storage.clone());

        assert_eq!(seq.append_batch(&entries(0..10)).await.unwrap(), 0);
        assert_eq!(seq.append_batch(&entries(10..15)).await.unwrap(), 10);
        assert_eq!(seq.append_batch(&entries(15..16)).await.unwrap(), 15);
        assert_eq!(storage.get_state().await.unwrap().unwrap().size, 16);
    }

    #[tokio::test]
    async fn test_published_size_never_decreases() {
        let storage = Arc::new(MemoryLogStorage::new());
        let (seq, _) = test_sequencer(storage.clone());

        let mut last = 0;
        for chunk in [1u64, 255, 256, 7] {
            seq.append_batch(&entries(last..last + chunk)).await.unwrap();
            let size = storage.get_state().await.unwrap().unwrap().size;
            assert!(size >= last);
            last += chunk;
        }
        assert_eq!(storage.get_state().await.unwrap().unwrap().size, 519);
    }
}
