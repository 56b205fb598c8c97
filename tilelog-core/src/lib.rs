//! Core types and layout math for the tilelog transparency log engine
//!
//! This crate holds everything below the I/O line: RFC 6962 hashing, the
//! tile/bundle coordinate math and path encoding, the wire serializations of
//! hash tiles and entry bundles, log entries with their dedup identities,
//! and signed checkpoint notes. Nothing here suspends; the async machinery
//! lives in `tilelog-engine` and the drivers in `tilelog-storage`.

pub mod bundle;
pub mod checkpoint;
pub mod entry;
mod error;
pub mod hash;
pub mod layout;
pub mod tile;

pub use bundle::{EntryBundle, MAX_ENTRY_SIZE};
pub use checkpoint::{
    open_note, sign_note, Checkpoint, CheckpointSigner, CheckpointVerifier,
    Ed25519CheckpointSigner, Ed25519CheckpointVerifier,
};
pub use entry::Entry;
pub use error::{Error, Result};
pub use hash::{empty_root, leaf_hash, node_hash, subtree_root, Hash, HASH_SIZE};
pub use layout::{BundleAddress, ENTRY_BUNDLE_WIDTH, TILE_HEIGHT, TILE_WIDTH};
pub use tile::HashTile;
