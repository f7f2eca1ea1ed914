use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::uid::Uid;

/// Default permission bits for new directories
pub const DEFAULT_DIRECTORY_MODE: u32 = 0o755;
/// Default permission bits for new files
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Node type, numbered as on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum NodeType {
    RegularFile = 0,
    Directory = 1,
    Symlink = 2,
}

impl NodeType {
    pub fn is_dir(&self) -> bool {
        matches!(self, NodeType::Directory)
    }
}

/// Lifecycle tag: live -> soft-deleted -> purged.
///
/// Purged nodes stay in the table as tombstones so their uid is still
/// recognised (and refused) after everything they owned is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeState {
    Live,
    Deleted { at: DateTime<Utc> },
    Purged { at: DateTime<Utc> },
}

/// Where a node hangs in the namespace: under a tenant root or a directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKey {
    TenantRoot(String),
    Node(Uid),
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKey::TenantRoot(tenant) => write!(f, "<root of {}>", tenant),
            NodeKey::Node(uid) => write!(f, "{}", uid),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub uid: Uid,
    /// `None` only for nodes that sit directly under their tenant root
    pub parent: Option<Uid>,
    pub name: String,
    pub node_type: NodeType,
    pub tenant: String,
    pub owner: String,
    /// Permission bits snapshot, reported by stat
    pub mode: u32,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub state: NodeState,
}

impl Node {
    pub fn parent_key(&self) -> NodeKey {
        match self.parent {
            Some(parent) => NodeKey::Node(parent),
            None => NodeKey::TenantRoot(self.tenant.clone()),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state, NodeState::Live)
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self.state, NodeState::Deleted { .. })
    }

    pub fn is_purged(&self) -> bool {
        matches!(self.state, NodeState::Purged { .. })
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            NodeState::Deleted { at } => Some(at),
            _ => None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.node_type.is_dir()
    }
}

/// Names are single path components
pub fn validate_name(name: &str) -> Result<(), crate::error::EngineError> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(crate::error::EngineError::InvalidArgument(format!(
            "invalid node name: {name:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("f.txt").is_ok());
        assert!(validate_name("with space").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("..").is_err());
    }

    #[test]
    fn test_node_type_wire_numbers() {
        assert_eq!(NodeType::RegularFile as u8, 0);
        assert_eq!(NodeType::Directory as u8, 1);
        assert_eq!(NodeType::Symlink as u8, 2);
    }
}
