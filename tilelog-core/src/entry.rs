//! Log entries and their dedup identities

use crate::bundle::MAX_ENTRY_SIZE;
use crate::error::{Error, Result};
use crate::hash::{leaf_hash, Hash};
use sha2::{Digest, Sha256};

/// One submitted log entry: opaque bytes plus a short identity used solely
/// to collapse in-flight duplicates. The identity never appears on the wire;
/// by default it is the SHA-256 of the data, but callers with a cheaper
/// deterministic key may supply their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    data: Vec<u8>,
    identity: Vec<u8>,
}

impl Entry {
    /// Create an entry with the default content-hash identity.
    pub fn new(data: Vec<u8>) -> Result<Self> {
        let identity = Sha256::digest(&data).to_vec();
        Self::with_identity(data, identity)
    }

    /// Create an entry with a caller-derived identity.
    pub fn with_identity(data: Vec<u8>, identity: Vec<u8>) -> Result<Self> {
        if data.len() > MAX_ENTRY_SIZE {
            return Err(Error::EntryTooLarge(data.len()));
        }
        Ok(Self { data, identity })
    }

    /// The entry bytes as submitted.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The dedup identity.
    pub fn identity(&self) -> &[u8] {
        &self.identity
    }

    /// RFC 6962 leaf hash of this entry.
    pub fn leaf_hash(&self) -> Hash {
        leaf_hash(&self.data)
    }

    /// Consume the entry, returning its data.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_identity_is_content_hash() {
        let a = Entry::new(b"same".to_vec()).unwrap();
        let b = Entry::new(b"same".to_vec()).unwrap();
        let c = Entry::new(b"other".to_vec()).unwrap();
        assert_eq!(a.identity(), b.identity());
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn test_size_limit() {
        assert!(Entry::new(vec![0u8; MAX_ENTRY_SIZE]).is_ok());
        assert!(matches!(
            Entry::new(vec![0u8; MAX_ENTRY_SIZE + 1]),
            Err(Error::EntryTooLarge(_))
        ));
    }
}
