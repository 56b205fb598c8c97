//! Storage driver interface for tilelog
//!
//! The engine consumes storage through the [`LogStorage`] trait: opaque byte
//! objects addressed by tile/bundle coordinates, plus a single mutable state
//! record advanced only by compare-and-swap. Everything else in the system
//! is append-only; the state record is the linearization point between
//! writers, so `put_state` must be atomic with respect to concurrent calls.
//!
//! ## Implementations
//!
//! - [`MemoryLogStorage`]: HashMap-backed, for tests and embedding
//! - [`FileLogStorage`]: filesystem-backed, single writer per process
//!
//! Object stores with conditional-write support can implement the trait the
//! same way; the engine never assumes anything beyond these six operations.

mod error;
pub mod file;
pub mod memory;

pub use error::{Result, StorageError};
pub use file::FileLogStorage;
pub use memory::MemoryLogStorage;

use async_trait::async_trait;
use std::fmt::Debug;
use tilelog_core::Hash;

/// The persisted tree state: the one mutable record per log.
///
/// Invariant: `root` is the RFC 6962 Merkle root of the first `size` leaves,
/// and `checkpoint` is a signed note committing to exactly that pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeState {
    /// Number of integrated leaves.
    pub size: u64,
    /// Merkle root over the first `size` leaves.
    pub root: Hash,
    /// Signed checkpoint note bytes as served to clients.
    pub checkpoint: Vec<u8>,
}

/// Storage driver consumed by the engine.
///
/// Tiles and bundles are immutable once written at a given address (an
/// address embeds the partial width, so a growing tail object occupies a
/// fresh address each time). `put_state` carries the driver's only
/// concurrency obligation: the write must succeed only if the stored record
/// still matches `prev`, comparing sizes.
#[async_trait]
pub trait LogStorage: Debug + Send + Sync {
    /// Read the current tree state, or `None` if the log is empty.
    async fn get_state(&self) -> Result<Option<TreeState>>;

    /// Atomically replace the tree state.
    ///
    /// Succeeds only if the stored record matches `prev` (`None` = no record
    /// yet); otherwise fails with [`StorageError::PreconditionFailed`] and
    /// leaves the stored record untouched.
    async fn put_state(&self, prev: Option<&TreeState>, next: &TreeState) -> Result<()>;

    /// Read the hash tile at `(level, index, partial)`.
    ///
    /// Returns [`StorageError::NotFound`] if absent.
    async fn get_tile(&self, level: u64, index: u64, partial: u64) -> Result<Vec<u8>>;

    /// Write the hash tile at `(level, index, partial)`.
    async fn put_tile(&self, level: u64, index: u64, partial: u64, bytes: &[u8]) -> Result<()>;

    /// Read the entry bundle at `(index, partial)`.
    ///
    /// Returns [`StorageError::NotFound`] if absent.
    async fn get_entry_bundle(&self, index: u64, partial: u64) -> Result<Vec<u8>>;

    /// Write the entry bundle at `(index, partial)`.
    async fn put_entry_bundle(&self, index: u64, partial: u64, bytes: &[u8]) -> Result<()>;
}
