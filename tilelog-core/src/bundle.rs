//! Entry bundle serialization
//!
//! A bundle is up to 256 leaf entries concatenated in index order, each
//! prefixed with a two-byte big-endian length. The trailing bundle of a log
//! is published partial and superseded as it grows; complete bundles are
//! immutable.

use crate::error::{Error, Result};
use crate::layout::ENTRY_BUNDLE_WIDTH;

/// Largest entry representable by the two-byte length prefix.
pub const MAX_ENTRY_SIZE: usize = u16::MAX as usize;

/// A group of up to 256 leaf entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryBundle {
    entries: Vec<Vec<u8>>,
}

impl EntryBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Parse bundle bytes, validating every length prefix.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut rest = bytes;
        while !rest.is_empty() {
            if rest.len() < 2 {
                return Err(Error::malformed_bundle("truncated length prefix".to_string()));
            }
            let len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
            rest = &rest[2..];
            if rest.len() < len {
                return Err(Error::malformed_bundle(format!(
                    "entry length {len} exceeds remaining {} bytes",
                    rest.len()
                )));
            }
            entries.push(rest[..len].to_vec());
            rest = &rest[len..];
            if entries.len() > ENTRY_BUNDLE_WIDTH as usize {
                return Err(Error::malformed_bundle(format!(
                    "bundle holds more than {ENTRY_BUNDLE_WIDTH} entries"
                )));
            }
        }
        if entries.is_empty() {
            return Err(Error::malformed_bundle("empty bundle".to_string()));
        }
        Ok(Self { entries })
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for e in &self.entries {
            out.extend_from_slice(&(e.len() as u16).to_be_bytes());
            out.extend_from_slice(e);
        }
        out
    }

    /// Append one entry.
    ///
    /// # Panics
    ///
    /// Panics if the bundle is already full; complete bundles are immutable.
    /// Oversized entries are rejected at admission, before bundling.
    pub fn push(&mut self, entry: &[u8]) {
        assert!(!self.is_full(), "push into a full bundle");
        debug_assert!(entry.len() <= MAX_ENTRY_SIZE);
        self.entries.push(entry.to_vec());
    }

    /// Number of entries present.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bundle holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the bundle is complete.
    pub fn is_full(&self) -> bool {
        self.entries.len() == ENTRY_BUNDLE_WIDTH as usize
    }

    /// The entries, in leaf-index order.
    pub fn entries(&self) -> &[Vec<u8>] {
        &self.entries
    }
}
