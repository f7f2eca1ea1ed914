//! Tree manager
//!
//! Nodes live in a flat table keyed by [`Uid`](crate::uid::Uid) with a
//! children index on the side; [`Engine`] is the facade every request goes
//! through. It authorizes against the ACL table, mutates nodes, versions and
//! metadata, and reports space changes to the quota accountant.

mod annotations;
mod engine;
mod entry;
mod files;
mod index;
mod locks;
mod namespace;
mod node;

pub use engine::Engine;
pub use entry::{DirectoryEntry, FileInfo};
pub use index::Tree;
pub use locks::{NodeGuard, NodeLocks};
pub use node::{
    validate_name, Node, NodeKey, NodeState, NodeType, DEFAULT_DIRECTORY_MODE, DEFAULT_FILE_MODE,
};
