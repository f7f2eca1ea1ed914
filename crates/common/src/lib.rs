/**
 * Access control: permissions, explicit grants
 *  and per-tenant fallback policy.
 */
pub mod acl;
pub mod auth;
/**
 * Content-addressed, reference counted payload
 *  storage shared by versions and copies.
 */
pub mod content;
pub mod error;
pub mod metadata;
pub mod quota;
/**
 * Tenant snapshots and the storage interface
 *  they are persisted through.
 */
pub mod snapshot;
/**
 * Background reconciliation: coalescing trigger
 *  queue plus the worker that drains it.
 */
pub mod sync;
/**
 * The node tree and the engine facade every
 *  request goes through.
 */
pub mod tree;
pub mod uid;
/**
 * Per-file version histories.
 */
pub mod version;

pub mod prelude {
    pub use crate::acl::{Permission, PermissionSet, TenantPolicy};
    pub use crate::auth::AuthContext;
    pub use crate::error::{EngineError, ErrorKind};
    pub use crate::quota::StorageUsage;
    pub use crate::snapshot::{MemorySnapshotStore, SnapshotStore};
    pub use crate::sync::{SyncAck, SyncCoordinator};
    pub use crate::tree::{DirectoryEntry, Engine, FileInfo, NodeType};
    pub use crate::uid::Uid;
    pub use crate::version::VersionStamp;
}
