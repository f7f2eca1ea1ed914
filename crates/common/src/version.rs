//! Version ledger
//!
//! Each file owns an append-only [`VersionHistory`]. Versions are stamped
//! with a per-file logical clock measured in microseconds since the epoch:
//! a new stamp is the wall clock, bumped to `last + 1` whenever the wall
//! clock has not moved past the previous stamp. The clock never goes back,
//! not even after old versions are purged, so a stamp is never handed out
//! twice for the same file.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::content::ContentHash;
use crate::error::EngineError;
use crate::metadata::MetadataMap;
use crate::uid::Uid;

/// Microseconds since the unix epoch, per-file monotonic
pub type VersionStamp = u64;

pub fn now_micros() -> VersionStamp {
    chrono::Utc::now().timestamp_micros().max(0) as u64
}

/// Parse a stamp as it travels on the wire (decimal string)
pub fn parse_stamp(raw: &str) -> Result<VersionStamp, EngineError> {
    raw.trim()
        .parse::<VersionStamp>()
        .map_err(|_| EngineError::InvalidArgument(format!("invalid version timestamp: {raw:?}")))
}

/// An immutable entry in a file's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub timestamp: VersionStamp,
    pub content: ContentHash,
    pub size: u64,
    /// Live metadata of the node at the moment this version was appended
    pub metadata: MetadataMap,
    pub created_by: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionHistory {
    versions: Vec<Version>,
    /// Last stamp ever issued for this file
    clock: VersionStamp,
}

impl VersionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&Version> {
        self.versions.last()
    }

    /// Size of the current version, 0 when there is none
    pub fn size(&self) -> u64 {
        self.current().map(|v| v.size).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn clock(&self) -> VersionStamp {
        self.clock
    }

    pub fn next_stamp(&self, now: VersionStamp) -> VersionStamp {
        now.max(self.clock.saturating_add(1))
    }

    pub fn append(&mut self, version: Version) -> Result<VersionStamp, EngineError> {
        if version.timestamp <= self.clock {
            return Err(EngineError::Internal(format!(
                "version stamp {} does not advance clock {}",
                version.timestamp, self.clock
            )));
        }
        self.clock = version.timestamp;
        self.versions.push(version);
        Ok(self.clock)
    }

    pub fn find(&self, timestamp: VersionStamp) -> Option<&Version> {
        self.versions
            .binary_search_by_key(&timestamp, |v| v.timestamp)
            .ok()
            .map(|idx| &self.versions[idx])
    }

    pub fn timestamps(&self) -> Vec<VersionStamp> {
        self.versions.iter().map(|v| v.timestamp).collect()
    }

    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// Drop all but the `keep` most recent versions, returning the dropped ones
    pub fn retain_latest(&mut self, keep: usize) -> Vec<Version> {
        if self.versions.len() <= keep {
            return Vec::new();
        }
        let cut = self.versions.len() - keep;
        self.versions.drain(..cut).collect()
    }

    /// Rebuild a history from snapshot parts, validating ordering
    pub fn from_parts(versions: Vec<Version>, clock: VersionStamp) -> Result<Self, EngineError> {
        let ordered = versions.windows(2).all(|w| w[0].timestamp < w[1].timestamp);
        let last = versions.last().map(|v| v.timestamp).unwrap_or(0);
        if !ordered || last > clock {
            return Err(EngineError::Internal(
                "version history is not strictly increasing".to_string(),
            ));
        }
        Ok(Self { versions, clock })
    }
}

/// Histories of every file, keyed by node uid
#[derive(Debug, Clone, Default)]
pub struct VersionLedger {
    histories: HashMap<Uid, VersionHistory>,
}

impl VersionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self, uid: &Uid) -> Option<&VersionHistory> {
        self.histories.get(uid)
    }

    pub fn history_mut(&mut self, uid: Uid) -> &mut VersionHistory {
        self.histories.entry(uid).or_default()
    }

    /// Current size of a file, 0 for files without versions
    pub fn size(&self, uid: &Uid) -> u64 {
        self.histories.get(uid).map(|h| h.size()).unwrap_or(0)
    }

    pub fn count(&self, uid: &Uid) -> usize {
        self.histories.get(uid).map(|h| h.len()).unwrap_or(0)
    }

    pub fn insert(&mut self, uid: Uid, history: VersionHistory) {
        self.histories.insert(uid, history);
    }

    pub fn remove(&mut self, uid: &Uid) -> Option<VersionHistory> {
        self.histories.remove(uid)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn version(timestamp: VersionStamp, data: &[u8]) -> Version {
        Version {
            timestamp,
            content: ContentHash::of(data),
            size: data.len() as u64,
            metadata: MetadataMap::new(),
            created_by: "tester".to_string(),
        }
    }

    #[test]
    fn test_stamps_advance_even_when_clock_stalls() {
        let mut history = VersionHistory::new();
        let first = history.next_stamp(100);
        history.append(version(first, b"a")).unwrap();
        // wall clock went backwards
        let second = history.next_stamp(50);
        assert_eq!(second, 101);
        history.append(version(second, b"bb")).unwrap();
        assert_eq!(history.timestamps(), vec![100, 101]);
        assert_eq!(history.size(), 2);
    }

    #[test]
    fn test_append_rejects_stale_stamp() {
        let mut history = VersionHistory::new();
        history.append(version(10, b"a")).unwrap();
        assert!(history.append(version(10, b"b")).is_err());
        assert!(history.append(version(9, b"b")).is_err());
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_retain_latest_keeps_clock() {
        let mut history = VersionHistory::new();
        for ts in 1..=5 {
            history.append(version(ts, &[ts as u8])).unwrap();
        }
        let dropped = history.retain_latest(2);
        assert_eq!(dropped.len(), 3);
        assert_eq!(history.timestamps(), vec![4, 5]);
        assert_eq!(history.next_stamp(0), 6);
        assert!(history.find(2).is_none());
        assert_eq!(history.find(4).unwrap().size, 1);
    }

    #[test]
    fn test_parse_stamp() {
        assert_eq!(parse_stamp("1700000000000000").unwrap(), 1_700_000_000_000_000);
        assert!(parse_stamp("yesterday").is_err());
        assert!(parse_stamp("-1").is_err());
    }
}
