//! Tile integration
//!
//! [`TreeBuilder`] folds new leaf hashes into the tile grid: each hash lands
//! in the trailing level-0 tile, and every tile that fills emits its subtree
//! root one tile-level up. Partial tiles are loaded from storage lazily, at
//! the width they had when the batch began; every touched tile is written
//! back (full tiles at their final address, partials at a width-suffixed
//! address). The tree root is then assembled from the perfect-subtree
//! decomposition of the new size.
//!
//! Integration is deterministic: replaying the same `(base_size, hashes)`
//! against the same storage produces byte-identical tiles and the same root.

use crate::error::{EngineError, Result};
use std::collections::BTreeMap;
use tilelog_core::layout::{self, TILE_WIDTH};
use tilelog_core::{empty_root, node_hash, Hash, HashTile};
use tilelog_storage::LogStorage;

/// In-memory view of the tiles touched while integrating one batch.
pub(crate) struct TreeBuilder<'a> {
    storage: &'a dyn LogStorage,
    /// Tree size including appended leaves.
    size: u64,
    /// Loaded tiles by `(tile_level, tile_index)`; deterministic order so
    /// flushes replay identically.
    tiles: BTreeMap<(u64, u64), HashTile>,
    /// Addresses of tiles modified by this batch.
    dirty: Vec<(u64, u64)>,
}

impl<'a> TreeBuilder<'a> {
    pub(crate) fn new(storage: &'a dyn LogStorage, base_size: u64) -> Self {
        Self {
            storage,
            size: base_size,
            tiles: BTreeMap::new(),
            dirty: Vec::new(),
        }
    }

    /// Tree size after the appends so far.
    pub(crate) fn size(&self) -> u64 {
        self.size
    }

    /// Fetch a tile into the map, expecting `expected_width` nodes on disk
    /// (0 = none yet, i.e. a fresh tile).
    async fn load_tile(&mut self, level: u64, index: u64, expected_width: u64) -> Result<()> {
        if self.tiles.contains_key(&(level, index)) {
            return Ok(());
        }
        let tile = if expected_width == 0 {
            HashTile::new()
        } else {
            let partial = expected_width % TILE_WIDTH;
            let bytes = self.storage.get_tile(level, index, partial).await?;
            let tile = HashTile::from_bytes(&bytes)?;
            if tile.len() as u64 != expected_width {
                return Err(EngineError::invariant(format!(
                    "tile ({level}, {index}) holds {} nodes, expected {expected_width}",
                    tile.len()
                )));
            }
            tile
        };
        self.tiles.insert((level, index), tile);
        Ok(())
    }

    /// Append one leaf hash, bubbling full-tile roots upward.
    async fn append(&mut self, leaf: Hash) -> Result<()> {
        let mut hash = leaf;
        let mut level = 0u64;
        // Node index of the new hash within its level's bottom row.
        let mut position = self.size;
        loop {
            let tile_index = position / TILE_WIDTH;
            let node_offset = position % TILE_WIDTH;
            // First touch in this batch: everything already in the tile
            // predates the batch and sits at the width-`node_offset` address.
            self.load_tile(level, tile_index, node_offset).await?;
            let tile = self
                .tiles
                .get_mut(&(level, tile_index))
                .expect("tile just loaded");
            if tile.len() as u64 != node_offset {
                return Err(EngineError::invariant(format!(
                    "appending node {node_offset} to tile ({level}, {tile_index}) of {} nodes",
                    tile.len()
                )));
            }
            tile.push(hash);
            if !self.dirty.contains(&(level, tile_index)) {
                self.dirty.push((level, tile_index));
            }
            let tile = &self.tiles[&(level, tile_index)];
            if !tile.is_full() {
                break;
            }
            // The completed tile's root becomes one node of the parent row.
            hash = tile.full_root();
            level += 1;
            position = tile_index;
        }
        self.size += 1;
        Ok(())
    }

    /// Append a batch of leaf hashes in order.
    pub(crate) async fn append_leaves(&mut self, hashes: &[Hash]) -> Result<()> {
        for h in hashes {
            self.append(*h).await?;
        }
        Ok(())
    }

    /// Write every modified tile. Full tiles land at their final address;
    /// partial tiles at a width-suffixed address. Earlier, narrower partial
    /// writes become unreferenced once the new checkpoint is published.
    pub(crate) async fn flush(&self) -> Result<()> {
        for &(level, index) in &self.dirty {
            let tile = &self.tiles[&(level, index)];
            let partial = tile.len() as u64 % TILE_WIDTH;
            self.storage
                .put_tile(level, index, partial, &tile.to_bytes())
                .await?;
            tracing::debug!(level, index, width = tile.len(), "wrote tile");
        }
        Ok(())
    }

    /// Shrink the working set after a flush: forget full tiles (their
    /// addresses are final; `node` reloads them on demand) and stop tracking
    /// them as dirty. Lets a long-running caller stream millions of leaves
    /// through one builder.
    pub(crate) fn compact(&mut self) {
        self.dirty.clear();
        self.tiles.retain(|_, tile| !tile.is_full());
    }

    /// Hash of the tree node at `(tree_level, tree_index)`, resolved from
    /// the in-memory tiles or storage.
    async fn node(&mut self, tree_level: u64, tree_index: u64) -> Result<Hash> {
        let (tile_level, tile_index, node_level, node_index) =
            layout::node_coords_to_tile_address(tree_level, tree_index);
        // Untouched tiles kept their width across the batch, so the current
        // size addresses them correctly.
        let width = match layout::partial_tile_size(tile_level, tile_index, self.size) {
            0 => TILE_WIDTH,
            w => w,
        };
        self.load_tile(tile_level, tile_index, width).await?;
        let tile = &self.tiles[&(tile_level, tile_index)];
        Ok(tile.node(node_level, node_index)?)
    }

    /// Merkle root over the first `size` leaves: fold the roots of the
    /// perfect-subtree decomposition from the right edge leftward.
    pub(crate) async fn root(&mut self) -> Result<Hash> {
        if self.size == 0 {
            return Ok(empty_root());
        }
        let mut subtrees = Vec::new();
        let mut offset = 0u64;
        for level in (0..64).rev() {
            if self.size & (1u64 << level) != 0 {
                subtrees.push((level as u64, offset >> level));
                offset += 1u64 << level;
            }
        }
        let (level, index) = subtrees.pop().expect("size > 0");
        let mut acc = self.node(level, index).await?;
        for (level, index) in subtrees.into_iter().rev() {
            let left = self.node(level, index).await?;
            acc = node_hash(&left, &acc);
        }
        Ok(acc)
    }
}

/// Integrate `leaf_hashes` on top of a tree of `base_size` leaves: write all
/// affected tiles and return the new `(size, root)`.
///
/// The caller owns transactionality: bundles are written before this runs,
/// and the state record is CAS-published after it returns.
pub(crate) async fn integrate(
    storage: &dyn LogStorage,
    base_size: u64,
    leaf_hashes: &[Hash],
) -> Result<(u64, Hash)> {
    let mut builder = TreeBuilder::new(storage, base_size);
    builder.append_leaves(leaf_hashes).await?;
    builder.flush().await?;
    let root = builder.root().await?;
    Ok((builder.size(), root))
}
