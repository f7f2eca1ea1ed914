//! Content-addressed payload storage
//!
//! File payloads are stored once, keyed by their BLAKE3 hash, and shared by
//! every version that references them (including versions created by copy
//! and restore). Versions own a *reference*, never the blob: the store keeps
//! a reference count per hash, and blobs whose count has dropped to zero stay
//! around until [`ContentStore::collect`] runs as part of a sync pass.

use std::collections::HashMap;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Size of a BLAKE3 hash in bytes
pub const HASH_SIZE: usize = 32;

/// BLAKE3 hash identifying a content blob
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ContentHash([u8; HASH_SIZE]);

impl ContentHash {
    pub fn of(data: &[u8]) -> Self {
        ContentHash(*blake3::hash(data).as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContentHashError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected 32 bytes, got {0}")]
    Length(usize),
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_hex()
    }
}

impl TryFrom<String> for ContentHash {
    type Error = ContentHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for ContentHash {
    type Err = ContentHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let array: [u8; HASH_SIZE] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ContentHashError::Length(bytes.len()))?;
        Ok(ContentHash(array))
    }
}

#[derive(Debug, Clone)]
struct Blob {
    data: Bytes,
    refs: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ContentStore {
    blobs: HashMap<ContentHash, Blob>,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` (if not already present) and take a reference on it
    pub fn retain(&mut self, data: Bytes) -> ContentHash {
        let hash = ContentHash::of(&data);
        self.blobs
            .entry(hash)
            .or_insert_with(|| Blob { data, refs: 0 })
            .refs += 1;
        hash
    }

    /// Take another reference on a blob that is already stored.
    ///
    /// Returns false if the hash is unknown.
    pub fn retain_existing(&mut self, hash: &ContentHash) -> bool {
        match self.blobs.get_mut(hash) {
            Some(blob) => {
                blob.refs += 1;
                true
            }
            None => false,
        }
    }

    /// Drop a reference. The blob itself is only removed by [`collect`](Self::collect).
    pub fn release(&mut self, hash: &ContentHash) {
        if let Some(blob) = self.blobs.get_mut(hash) {
            blob.refs = blob.refs.saturating_sub(1);
        }
    }

    pub fn get(&self, hash: &ContentHash) -> Option<Bytes> {
        self.blobs.get(hash).map(|blob| blob.data.clone())
    }

    pub fn refs(&self, hash: &ContentHash) -> u64 {
        self.blobs.get(hash).map(|blob| blob.refs).unwrap_or(0)
    }

    /// Remove every blob nobody references any more
    pub fn collect(&mut self) -> Vec<ContentHash> {
        let dead: Vec<ContentHash> = self
            .blobs
            .iter()
            .filter(|(_, blob)| blob.refs == 0)
            .map(|(hash, _)| *hash)
            .collect();
        for hash in &dead {
            self.blobs.remove(hash);
        }
        dead
    }

    /// Every hash held, referenced or not
    pub fn hashes(&self) -> impl Iterator<Item = &ContentHash> + '_ {
        self.blobs.keys()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_shared_content_is_stored_once() {
        let mut store = ContentStore::new();
        let a = store.retain(Bytes::from_static(b"same"));
        let b = store.retain(Bytes::from_static(b"same"));
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!(store.refs(&a), 2);
    }

    #[test]
    fn test_collect_only_drops_unreferenced() {
        let mut store = ContentStore::new();
        let kept = store.retain(Bytes::from_static(b"kept"));
        let dropped = store.retain(Bytes::from_static(b"dropped"));

        store.release(&dropped);
        assert!(store.get(&dropped).is_some());

        let collected = store.collect();
        assert_eq!(collected, vec![dropped]);
        assert!(store.get(&dropped).is_none());
        assert_eq!(store.get(&kept).unwrap(), Bytes::from_static(b"kept"));
    }

    #[test]
    fn test_hash_hex_roundtrip() {
        let hash = ContentHash::of(b"Hello, FileEngine!");
        let parsed: ContentHash = hash.to_hex().parse().unwrap();
        assert_eq!(hash, parsed);
        assert!("abcd".parse::<ContentHash>().is_err());
        assert!("zz".parse::<ContentHash>().is_err());
    }
}
