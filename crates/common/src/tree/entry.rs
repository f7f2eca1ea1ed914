use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::uid::Uid;
use crate::version::{VersionLedger, VersionStamp};

use super::node::{Node, NodeType};

/// One row of a directory listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub uid: Uid,
    pub name: String,
    pub node_type: NodeType,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub version_count: usize,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl DirectoryEntry {
    pub(crate) fn describe(node: &Node, ledger: &VersionLedger) -> Self {
        Self {
            uid: node.uid,
            name: node.name.clone(),
            node_type: node.node_type,
            size: ledger.size(&node.uid),
            created_at: node.created_at,
            modified_at: node.modified_at,
            version_count: ledger.count(&node.uid),
            deleted_at: node.deleted_at(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// What `stat` reports about a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub uid: Uid,
    pub name: String,
    pub parent: Option<Uid>,
    pub node_type: NodeType,
    pub size: u64,
    pub owner: String,
    pub mode: u32,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Stamp of the current version, if the file has one
    pub version: Option<VersionStamp>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FileInfo {
    pub(crate) fn describe(node: &Node, ledger: &VersionLedger) -> Self {
        Self {
            uid: node.uid,
            name: node.name.clone(),
            parent: node.parent,
            node_type: node.node_type,
            size: ledger.size(&node.uid),
            owner: node.owner.clone(),
            mode: node.mode,
            created_at: node.created_at,
            modified_at: node.modified_at,
            version: ledger
                .history(&node.uid)
                .and_then(|history| history.current())
                .map(|version| version.timestamp),
            deleted_at: node.deleted_at(),
        }
    }
}
