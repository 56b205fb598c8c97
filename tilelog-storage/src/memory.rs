//! In-memory storage driver
//!
//! Objects live in a HashMap keyed by layout path; the state record sits
//! behind its own lock so the CAS compare-and-store is genuinely atomic.
//! Used by the engine tests and by embedders that want an ephemeral log.

use crate::{LogStorage, Result, StorageError, TreeState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tilelog_core::layout;

/// A simple in-memory driver for testing and ephemeral logs.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogStorage {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    state: Arc<RwLock<Option<TreeState>>>,
}

impl MemoryLogStorage {
    /// Create a new empty driver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects (tiles + bundles), for tests.
    pub fn object_count(&self) -> usize {
        self.objects.read().expect("RwLock poisoned").len()
    }

    /// Snapshot of all object keys, for tests.
    pub fn object_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .expect("RwLock poisoned")
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .expect("RwLock poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))
    }

    fn put(&self, key: String, bytes: &[u8]) {
        self.objects
            .write()
            .expect("RwLock poisoned")
            .insert(key, bytes.to_vec());
    }
}

#[async_trait]
impl LogStorage for MemoryLogStorage {
    async fn get_state(&self) -> Result<Option<TreeState>> {
        Ok(self.state.read().expect("RwLock poisoned").clone())
    }

    async fn put_state(&self, prev: Option<&TreeState>, next: &TreeState) -> Result<()> {
        let mut state = self.state.write().expect("RwLock poisoned");
        let matches = match (&*state, prev) {
            (None, None) => true,
            (Some(stored), Some(expected)) => stored.size == expected.size,
            _ => false,
        };
        if !matches {
            return Err(StorageError::PreconditionFailed);
        }
        *state = Some(next.clone());
        Ok(())
    }

    async fn get_tile(&self, level: u64, index: u64, partial: u64) -> Result<Vec<u8>> {
        self.get(&layout::tile_path(level, index, partial))
    }

    async fn put_tile(&self, level: u64, index: u64, partial: u64, bytes: &[u8]) -> Result<()> {
        self.put(layout::tile_path(level, index, partial), bytes);
        Ok(())
    }

    async fn get_entry_bundle(&self, index: u64, partial: u64) -> Result<Vec<u8>> {
        self.get(&layout::entries_path(index, partial))
    }

    async fn put_entry_bundle(&self, index: u64, partial: u64, bytes: &[u8]) -> Result<()> {
        self.put(layout::entries_path(index, partial), bytes);
        Ok(())
    }
}
