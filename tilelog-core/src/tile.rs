//! Hash tile serialization
//!
//! A tile stores the 32-byte hashes of its bottom row — up to 256 of them —
//! and nothing else; the seven rows above are derived on demand. Tile bytes
//! on the wire are simply those hashes concatenated in index order.

use crate::error::{Error, Result};
use crate::hash::{subtree_root, Hash, HASH_SIZE};
use crate::layout::TILE_WIDTH;

/// One Merkle tile: the bottom-row hashes of an 8-level slab.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HashTile {
    hashes: Vec<Hash>,
}

impl HashTile {
    /// Create an empty tile.
    pub fn new() -> Self {
        Self { hashes: Vec::new() }
    }

    /// Parse tile bytes: a multiple of 32 bytes, 1..=256 hashes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() % HASH_SIZE != 0 {
            return Err(Error::malformed_tile(format!(
                "tile length {} is not a positive multiple of {HASH_SIZE}",
                bytes.len()
            )));
        }
        let count = bytes.len() / HASH_SIZE;
        if count > TILE_WIDTH as usize {
            return Err(Error::malformed_tile(format!(
                "tile holds {count} hashes, max {TILE_WIDTH}"
            )));
        }
        let hashes = bytes
            .chunks_exact(HASH_SIZE)
            .map(|c| {
                let mut h = [0u8; HASH_SIZE];
                h.copy_from_slice(c);
                h
            })
            .collect();
        Ok(Self { hashes })
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.hashes.len() * HASH_SIZE);
        for h in &self.hashes {
            out.extend_from_slice(h);
        }
        out
    }

    /// Number of bottom-row hashes present.
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Whether the tile holds no hashes yet.
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Whether the tile's bottom row is complete.
    pub fn is_full(&self) -> bool {
        self.hashes.len() == TILE_WIDTH as usize
    }

    /// Append one bottom-row hash.
    ///
    /// # Panics
    ///
    /// Panics if the tile is already full; full tiles are immutable.
    pub fn push(&mut self, hash: Hash) {
        assert!(!self.is_full(), "push into a full tile");
        self.hashes.push(hash);
    }

    /// Root over the complete bottom row, emitted into the parent tile when
    /// this tile fills.
    ///
    /// # Panics
    ///
    /// Panics if the tile is not full; a partial tile has no fixed root.
    pub fn full_root(&self) -> Hash {
        assert!(self.is_full(), "root of a partial tile");
        subtree_root(&self.hashes)
    }

    /// Hash of the in-tile node at `(node_level, node_index)`, where level 0
    /// is the bottom row. The node's whole subtree must be present.
    pub fn node(&self, node_level: u32, node_index: u64) -> Result<Hash> {
        let width = 1usize << node_level;
        let lo = node_index as usize * width;
        let hi = lo + width;
        if node_level >= 8 || hi > self.hashes.len() {
            return Err(Error::malformed_tile(format!(
                "node ({node_level}, {node_index}) not covered by tile of {} hashes",
                self.hashes.len()
            )));
        }
        Ok(subtree_root(&self.hashes[lo..hi]))
    }
}
