//! Filesystem storage driver
//!
//! Objects are laid out beneath a base directory using the wire path
//! encoding directly (`tile/0/x001/234`, `tile/entries/067.p/12`), so a
//! log's data directory can be served as-is by any static file server. The
//! state record is a small JSON file written via temp-file + rename.
//!
//! The CAS on the state record is enforced with an in-process mutex: this
//! driver supports a single writer per process and assumes no other process
//! writes the same directory. Multi-process deployments need a driver with
//! backend-level conditional writes.

use crate::{LogStorage, Result, StorageError, TreeState};
use async_trait::async_trait;
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tilelog_core::{layout, HASH_SIZE};
use tokio::sync::Mutex;

const STATE_FILE: &str = "state";

/// On-disk form of [`TreeState`]: hex root, base64 note.
#[derive(Debug, Serialize, Deserialize)]
struct StateRecord {
    size: u64,
    root: String,
    checkpoint: String,
}

impl StateRecord {
    fn from_state(state: &TreeState) -> Self {
        Self {
            size: state.size,
            root: hex::encode(state.root),
            checkpoint: BASE64_STANDARD.encode(&state.checkpoint),
        }
    }

    fn into_state(self) -> Result<TreeState> {
        let root_bytes = hex::decode(&self.root)
            .map_err(|e| StorageError::corrupt(format!("state root hex: {e}")))?;
        if root_bytes.len() != HASH_SIZE {
            return Err(StorageError::corrupt(format!(
                "state root is {} bytes, want {HASH_SIZE}",
                root_bytes.len()
            )));
        }
        let mut root = [0u8; HASH_SIZE];
        root.copy_from_slice(&root_bytes);
        let checkpoint = BASE64_STANDARD
            .decode(&self.checkpoint)
            .map_err(|e| StorageError::corrupt(format!("state checkpoint base64: {e}")))?;
        Ok(TreeState {
            size: self.size,
            root,
            checkpoint,
        })
    }
}

/// File-based storage driver for single-node deployments.
#[derive(Debug)]
pub struct FileLogStorage {
    base_path: PathBuf,
    state_lock: Mutex<()>,
}

impl FileLogStorage {
    /// Create a driver rooted at `base_path`. The directory is created on
    /// first write.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            state_lock: Mutex::new(()),
        }
    }

    /// The base directory for this log.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a layout path, rejecting absolute paths and traversal.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let p = Path::new(path);
        if p.is_absolute()
            || p.components()
                .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(StorageError::other(format!(
                "invalid storage path {path:?}: must be relative without '..'"
            )));
        }
        Ok(self.base_path.join(p))
    }

    async fn read_object(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        tokio::fs::read(&full).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::not_found(path)
            } else {
                StorageError::io(format!("read {}: {e}", full.display()))
            }
        })
    }

    async fn write_object(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(format!("mkdir {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|e| StorageError::io(format!("write {}: {e}", full.display())))
    }

    async fn read_state_unlocked(&self) -> Result<Option<TreeState>> {
        let bytes = match self.read_object(STATE_FILE).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let record: StateRecord = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::corrupt(format!("state record: {e}")))?;
        record.into_state().map(Some)
    }
}

#[async_trait]
impl LogStorage for FileLogStorage {
    async fn get_state(&self) -> Result<Option<TreeState>> {
        self.read_state_unlocked().await
    }

    async fn put_state(&self, prev: Option<&TreeState>, next: &TreeState) -> Result<()> {
        let _guard = self.state_lock.lock().await;

        let stored = self.read_state_unlocked().await?;
        let matches = match (&stored, prev) {
            (None, None) => true,
            (Some(s), Some(p)) => s.size == p.size,
            _ => false,
        };
        if !matches {
            return Err(StorageError::PreconditionFailed);
        }

        let bytes = serde_json::to_vec(&StateRecord::from_state(next))
            .map_err(|e| StorageError::other(format!("encode state: {e}")))?;
        let tmp = format!("{STATE_FILE}.tmp");
        self.write_object(&tmp, &bytes).await?;
        let (tmp_full, state_full) = (self.resolve(&tmp)?, self.resolve(STATE_FILE)?);
        tokio::fs::rename(&tmp_full, &state_full)
            .await
            .map_err(|e| StorageError::io(format!("rename state: {e}")))
    }

    async fn get_tile(&self, level: u64, index: u64, partial: u64) -> Result<Vec<u8>> {
        self.read_object(&layout::tile_path(level, index, partial)).await
    }

    async fn put_tile(&self, level: u64, index: u64, partial: u64, bytes: &[u8]) -> Result<()> {
        self.write_object(&layout::tile_path(level, index, partial), bytes)
            .await
    }

    async fn get_entry_bundle(&self, index: u64, partial: u64) -> Result<Vec<u8>> {
        self.read_object(&layout::entries_path(index, partial)).await
    }

    async fn put_entry_bundle(&self, index: u64, partial: u64, bytes: &[u8]) -> Result<()> {
        self.write_object(&layout::entries_path(index, partial), bytes)
            .await
    }
}
