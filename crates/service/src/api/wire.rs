use serde::{Deserialize, Serialize};

use common::tree::{DirectoryEntry, FileInfo};
use common::uid::Uid;

/// Directory listing row as it goes over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEntry {
    pub uid: String,
    pub name: String,
    /// REGULAR_FILE=0, DIRECTORY=1, SYMLINK=2
    #[serde(rename = "type")]
    pub node_type: u8,
    pub size: u64,
    /// unix seconds
    pub created_at: i64,
    pub modified_at: i64,
    pub version_count: usize,
    pub deleted: bool,
}

impl From<DirectoryEntry> for WireEntry {
    fn from(entry: DirectoryEntry) -> Self {
        Self {
            uid: entry.uid.to_string(),
            deleted: entry.is_deleted(),
            name: entry.name,
            node_type: entry.node_type as u8,
            size: entry.size,
            created_at: entry.created_at.timestamp(),
            modified_at: entry.modified_at.timestamp(),
            version_count: entry.version_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireFileInfo {
    pub uid: String,
    pub name: String,
    /// empty for nodes hanging off the tenant root
    pub parent_uid: String,
    #[serde(rename = "type")]
    pub node_type: u8,
    pub size: u64,
    pub owner: String,
    /// unix mode bits
    pub permissions: u32,
    pub created_at: i64,
    pub modified_at: i64,
    /// current version stamp, empty when there is none
    pub version: String,
}

impl From<FileInfo> for WireFileInfo {
    fn from(info: FileInfo) -> Self {
        Self {
            uid: info.uid.to_string(),
            name: info.name,
            parent_uid: info.parent.as_ref().map(Uid::to_string).unwrap_or_default(),
            node_type: info.node_type as u8,
            size: info.size,
            owner: info.owner,
            permissions: info.mode,
            created_at: info.created_at.timestamp(),
            modified_at: info.modified_at.timestamp(),
            version: info.version.map(|v| v.to_string()).unwrap_or_default(),
        }
    }
}
