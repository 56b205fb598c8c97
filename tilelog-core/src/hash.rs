//! RFC 6962 Merkle hashing primitives
//!
//! Domain-separated SHA-256: a `0x00` prefix byte for leaves and `0x01` for
//! interior nodes, so a leaf can never be confused with a node. These
//! functions are pure and infallible; everything above them (tiles, the
//! integrator, checkpoints) is built from the three operations here.

use sha2::{Digest, Sha256};

/// A raw 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

/// Size in bytes of a [`Hash`].
pub const HASH_SIZE: usize = 32;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Root hash of the empty tree: `SHA-256("")`.
pub fn empty_root() -> Hash {
    Sha256::digest(b"").into()
}

/// Hash a leaf entry: `SHA-256(0x00 || entry)`.
pub fn leaf_hash(entry: &[u8]) -> Hash {
    let mut h = Sha256::new();
    h.update([LEAF_PREFIX]);
    h.update(entry);
    h.finalize().into()
}

/// Hash two child nodes: `SHA-256(0x01 || left || right)`.
pub fn node_hash(left: &Hash, right: &Hash) -> Hash {
    let mut h = Sha256::new();
    h.update([NODE_PREFIX]);
    h.update(left);
    h.update(right);
    h.finalize().into()
}

/// Root of the subtree whose leaf-level hashes are `hashes`, per RFC 6962:
/// split at the largest power of two strictly less than the length.
///
/// For the common power-of-two case (in-tile nodes, full tile roots) the
/// split is an even halving all the way down.
///
/// # Panics
///
/// Panics if `hashes` is empty; callers always hold at least one node.
pub fn subtree_root(hashes: &[Hash]) -> Hash {
    match hashes.len() {
        0 => panic!("subtree_root of zero nodes"),
        1 => hashes[0],
        n => {
            let split = largest_power_of_two_below(n);
            let left = subtree_root(&hashes[..split]);
            let right = subtree_root(&hashes[split..]);
            node_hash(&left, &right)
        }
    }
}

/// Largest power of two strictly less than `n` (n >= 2).
fn largest_power_of_two_below(n: usize) -> usize {
    let mut k = 1;
    while k * 2 < n {
        k *= 2;
    }
    k
}
