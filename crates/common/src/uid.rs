//! Identity allocation
//!
//! Every node gets a [`Uid`] that is unique for the lifetime of the store and
//! across tenants. The allocator remembers everything it has ever issued
//! (including uids restored from snapshots), so a purged node's uid can never
//! come back and resurrect a dangling reference.

use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, globally unique node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(Uuid);

impl Uid {
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Uid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Uid(Uuid::parse_str(s)?))
    }
}

impl From<Uuid> for Uid {
    fn from(uuid: Uuid) -> Self {
        Uid(uuid)
    }
}

/// Issues uids that have never been seen by this store
#[derive(Debug, Default)]
pub struct UidAllocator {
    issued: HashSet<Uid>,
}

impl UidAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> Uid {
        loop {
            let uid = Uid(Uuid::new_v4());
            if self.issued.insert(uid) {
                return uid;
            }
            tracing::warn!("uid collision on {}, drawing again", uid);
        }
    }

    /// Mark a uid restored from elsewhere as taken
    pub fn reserve(&mut self, uid: Uid) -> bool {
        self.issued.insert(uid)
    }

    pub fn is_issued(&self, uid: &Uid) -> bool {
        self.issued.contains(uid)
    }

    pub fn len(&self) -> usize {
        self.issued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issued.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_allocate_unique() {
        let mut allocator = UidAllocator::new();
        let uids: HashSet<Uid> = (0..1000).map(|_| allocator.allocate()).collect();
        assert_eq!(uids.len(), 1000);
        assert_eq!(allocator.len(), 1000);
    }

    #[test]
    fn test_reserved_uid_is_never_issued() {
        let mut allocator = UidAllocator::new();
        let restored: Uid = "6f1c1d52-4b8e-4a43-9a3f-0d2a4f0f7b11".parse().unwrap();
        assert!(allocator.reserve(restored));
        assert!(!allocator.reserve(restored));
        assert!(allocator.is_issued(&restored));
        let fresh = allocator.allocate();
        assert_ne!(fresh, restored);
    }

    #[test]
    fn test_uid_display_roundtrip() {
        let mut allocator = UidAllocator::new();
        let uid = allocator.allocate();
        let parsed: Uid = uid.to_string().parse().unwrap();
        assert_eq!(uid, parsed);
        assert!("".parse::<Uid>().is_err());
    }
}
