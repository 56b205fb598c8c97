//! Tile and bundle layout math
//!
//! Maps between leaf indices, `(level, index)` tree-node coordinates, and
//! `(tile_level, tile_index, node_level, node_index)` tile coordinates, and
//! renders/parses the on-the-wire object paths. Everything here is pure:
//! layout never suspends and never fails (path *parsing* can, since it takes
//! untrusted request strings).
//!
//! A tile is an 8-level slab of the tree with up to 256 nodes on its bottom
//! row; an entry bundle groups up to 256 leaf entries. Paths render indices
//! in thousands-grouped form (`x001/x234/567`) with a `.p/<W>` suffix for
//! partial objects — this encoding is part of the public wire contract and
//! must not change.

use crate::error::{Error, Result};

/// Height in tree levels of one tile.
pub const TILE_HEIGHT: u64 = 8;

/// Maximum number of nodes on a tile's bottom row.
pub const TILE_WIDTH: u64 = 256;

/// Maximum number of entries in one entry bundle.
pub const ENTRY_BUNDLE_WIDTH: u64 = 256;

/// Storage path of the checkpoint object.
pub const CHECKPOINT_PATH: &str = "checkpoint";

/// Expected number of nodes in the tile at `(level, index)` within a tree of
/// `log_size` leaves, or 0 if the tile is fully populated.
pub fn partial_tile_size(level: u64, index: u64, log_size: u64) -> u64 {
    let size_at_level = log_size >> (level * TILE_HEIGHT);
    let full_tiles = size_at_level / TILE_WIDTH;
    if index < full_tiles {
        return 0;
    }
    size_at_level % TILE_WIDTH
}

/// Expected number of entries in bundle `index` within a tree of `log_size`
/// leaves, or 0 if the bundle is complete.
pub fn partial_bundle_size(index: u64, log_size: u64) -> u64 {
    if index < log_size / ENTRY_BUNDLE_WIDTH {
        return 0;
    }
    log_size % ENTRY_BUNDLE_WIDTH
}

/// Map tree-node coordinates to tile space: returns
/// `(tile_level, tile_index, node_level, node_index)` where the node levels
/// and indices are relative to the containing tile.
pub fn node_coords_to_tile_address(tree_level: u64, tree_index: u64) -> (u64, u64, u32, u64) {
    let tile_row_width = 1u64 << (TILE_HEIGHT - tree_level % TILE_HEIGHT);
    let tile_level = tree_level / TILE_HEIGHT;
    let tile_index = tree_index / tile_row_width;
    let node_level = (tree_level % TILE_HEIGHT) as u32;
    let node_index = tree_index % tile_row_width;

    (tile_level, tile_index, node_level, node_index)
}

/// Recover the tree-node coordinates addressed by tile coordinates.
/// Inverse of [`node_coords_to_tile_address`].
pub fn tile_address_to_node_coords(
    tile_level: u64,
    tile_index: u64,
    node_level: u32,
    node_index: u64,
) -> (u64, u64) {
    let tree_level = tile_level * TILE_HEIGHT + node_level as u64;
    let tile_row_width = 1u64 << (TILE_HEIGHT - tree_level % TILE_HEIGHT);
    let tree_index = tile_index * tile_row_width + node_index;

    (tree_level, tree_index)
}

/// Render `n` in thousands-grouped path form: zero-padded three-digit groups,
/// all but the last prefixed with `x` (`1234567` → `x001/x234/567`).
fn fmt_path_index(n: u64) -> String {
    let digits = format!("{:03}", n);
    let pad = (3 - digits.len() % 3) % 3;
    let padded = format!("{}{}", "0".repeat(pad), digits);

    let groups: Vec<&str> = padded
        .as_bytes()
        .chunks(3)
        .map(|c| std::str::from_utf8(c).expect("ascii digits"))
        .collect();
    let last = groups.len() - 1;
    groups
        .iter()
        .enumerate()
        .map(|(i, g)| if i < last { format!("x{g}") } else { (*g).to_string() })
        .collect::<Vec<_>>()
        .join("/")
}

/// Append the partial-width suffix, if any.
fn fmt_partial(path: String, partial: u64) -> String {
    if partial == 0 {
        path
    } else {
        format!("{path}.p/{partial}")
    }
}

/// Storage path of the hash tile at `(level, index)`, with `partial = 0`
/// meaning the full tile.
pub fn tile_path(level: u64, index: u64, partial: u64) -> String {
    fmt_partial(format!("tile/{}/{}", level, fmt_path_index(index)), partial)
}

/// Storage path of the entry bundle at `index`, with `partial = 0` meaning
/// the complete bundle.
pub fn entries_path(index: u64, partial: u64) -> String {
    fmt_partial(format!("tile/entries/{}", fmt_path_index(index)), partial)
}

/// Parse a thousands-grouped index with optional `.p/<W>` suffix.
///
/// Rejects non-canonical spellings: re-rendering the parsed value must
/// reproduce the input exactly, so each index has a single valid path.
fn parse_path_index(s: &str) -> Result<(u64, u64)> {
    let (index_part, partial) = match s.split_once(".p/") {
        Some((idx, w)) => {
            let partial: u64 = w
                .parse()
                .map_err(|_| Error::malformed_path(format!("bad partial width in {s:?}")))?;
            if partial == 0 || partial >= TILE_WIDTH {
                return Err(Error::malformed_path(format!(
                    "partial width {partial} out of range in {s:?}"
                )));
            }
            (idx, partial)
        }
        None => (s, 0),
    };

    let mut digits = String::new();
    let groups: Vec<&str> = index_part.split('/').collect();
    let last = groups.len() - 1;
    for (i, g) in groups.iter().enumerate() {
        let body = if i < last {
            g.strip_prefix('x')
                .ok_or_else(|| Error::malformed_path(format!("missing x prefix in {s:?}")))?
        } else {
            g
        };
        if body.len() != 3 || !body.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::malformed_path(format!("bad group {g:?} in {s:?}")));
        }
        digits.push_str(body);
    }

    let index: u64 = digits
        .parse()
        .map_err(|_| Error::malformed_path(format!("index overflow in {s:?}")))?;
    if fmt_path_index(index) != index_part {
        return Err(Error::malformed_path(format!("non-canonical index in {s:?}")));
    }
    Ok((index, partial))
}

/// Parse the `<level>/<N>[.p/<W>]` remainder of a tile path.
pub fn parse_tile_path(rest: &str) -> Result<(u64, u64, u64)> {
    let (level_s, index_s) = rest
        .split_once('/')
        .ok_or_else(|| Error::malformed_path(format!("missing tile level in {rest:?}")))?;
    let level: u64 = level_s
        .parse()
        .map_err(|_| Error::malformed_path(format!("bad tile level in {rest:?}")))?;
    // 64 tree levels fit in 8 tile levels.
    if level_s != level.to_string() || level >= 8 {
        return Err(Error::malformed_path(format!("bad tile level in {rest:?}")));
    }
    let (index, partial) = parse_path_index(index_s)?;
    Ok((level, index, partial))
}

/// Parse the `<N>[.p/<W>]` remainder of an entry bundle path.
pub fn parse_entries_path(rest: &str) -> Result<(u64, u64)> {
    parse_path_index(rest)
}

/// Address of one entry bundle as published in a tree of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleAddress {
    /// Bundle index (`leaf_index / 256`).
    pub index: u64,
    /// Published width: 0 for a complete bundle, else the entry count.
    pub partial: u64,
}

/// Enumerate the bundle addresses spanning leaves `[start, end)` as published
/// in a tree of `tree_size` leaves. Feeding these to a fetcher yields every
/// byte needed to reconstruct that leaf range.
pub fn bundle_range(
    start: u64,
    end: u64,
    tree_size: u64,
) -> impl Iterator<Item = BundleAddress> {
    debug_assert!(start <= end && end <= tree_size);
    let first = start / ENTRY_BUNDLE_WIDTH;
    let last = if end > start { (end - 1) / ENTRY_BUNDLE_WIDTH + 1 } else { first };
    (first..last).map(move |index| BundleAddress {
        index,
        partial: partial_bundle_size(index, tree_size),
    })
}
