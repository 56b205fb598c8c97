//! Shared helpers for engine integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tilelog_core::{
    CheckpointSigner, Ed25519CheckpointSigner, Ed25519CheckpointVerifier, Entry,
};
use tilelog_storage::{LogStorage, MemoryLogStorage, StorageError, TreeState};

pub const ORIGIN: &str = "itest.example/log";

pub fn signer() -> Ed25519CheckpointSigner {
    let key = SigningKey::from_bytes(&[11u8; 32]);
    Ed25519CheckpointSigner::new(ORIGIN, key).unwrap()
}

pub fn verifier() -> Ed25519CheckpointVerifier {
    signer().verifier()
}

pub fn signers() -> Vec<Arc<dyn CheckpointSigner>> {
    vec![Arc::new(signer())]
}

pub fn entries(range: std::ops::Range<u64>) -> Vec<Entry> {
    range
        .map(|i| Entry::new(format!("entry-{i}").into_bytes()).unwrap())
        .collect()
}

/// Memory storage with fault injection and write accounting.
#[derive(Debug, Default)]
pub struct TestStorage {
    inner: MemoryLogStorage,
    bundle_puts: AtomicU64,
    state_fail_remaining: AtomicU32,
    state_fail_cas: AtomicBool,
}

impl TestStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryLogStorage {
        &self.inner
    }

    /// Number of `put_entry_bundle` calls so far.
    pub fn bundle_puts(&self) -> u64 {
        self.bundle_puts.load(Ordering::SeqCst)
    }

    /// Make the next `n` `put_state` calls fail: as CAS conflicts when
    /// `cas`, as permanent I/O errors otherwise.
    pub fn fail_state_puts(&self, n: u32, cas: bool) {
        self.state_fail_remaining.store(n, Ordering::SeqCst);
        self.state_fail_cas.store(cas, Ordering::SeqCst);
    }
}

#[async_trait]
impl LogStorage for TestStorage {
    async fn get_state(&self) -> Result<Option<TreeState>, StorageError> {
        self.inner.get_state().await
    }

    async fn put_state(
        &self,
        prev: Option<&TreeState>,
        next: &TreeState,
    ) -> Result<(), StorageError> {
        let remaining = self.state_fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.state_fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(if self.state_fail_cas.load(Ordering::SeqCst) {
                StorageError::PreconditionFailed
            } else {
                StorageError::io("injected state write failure")
            });
        }
        self.inner.put_state(prev, next).await
    }

    async fn get_tile(&self, level: u64, index: u64, partial: u64) -> Result<Vec<u8>, StorageError> {
        self.inner.get_tile(level, index, partial).await
    }

    async fn put_tile(
        &self,
        level: u64,
        index: u64,
        partial: u64,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        self.inner.put_tile(level, index, partial, bytes).await
    }

    async fn get_entry_bundle(&self, index: u64, partial: u64) -> Result<Vec<u8>, StorageError> {
        self.inner.get_entry_bundle(index, partial).await
    }

    async fn put_entry_bundle(
        &self,
        index: u64,
        partial: u64,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        self.bundle_puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put_entry_bundle(index, partial, bytes).await
    }
}
