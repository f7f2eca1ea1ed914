//! Request and payload records of the file service.
//!
//! Uids travel as strings, with `""` standing for the tenant root where a
//! parent is expected. Version stamps travel as decimal strings, permissions
//! and file types by their numeric value.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use common::auth::AuthContext;
use common::sync::SyncAck;

use super::wire::{WireEntry, WireFileInfo};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakeDirectoryRequest {
    #[serde(default)]
    pub parent_uid: String,
    pub name: String,
    pub auth: AuthContext,
    /// unix mode bits, 0 for the default
    #[serde(default)]
    pub permissions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TouchRequest {
    #[serde(default)]
    pub parent_uid: String,
    pub name: String,
    pub auth: AuthContext,
}

/// Any request that names a single node and nothing else
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UidRequest {
    #[serde(default)]
    pub uid: String,
    pub auth: AuthContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutFileRequest {
    pub uid: String,
    pub auth: AuthContext,
    pub data: Bytes,
    #[serde(default)]
    pub chunk_index: Option<u32>,
    #[serde(default)]
    pub total_chunks: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetFileRequest {
    pub uid: String,
    #[serde(default)]
    pub version_timestamp: Option<String>,
    pub auth: AuthContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRequest {
    pub uid: String,
    pub version_timestamp: String,
    pub auth: AuthContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameRequest {
    pub uid: String,
    pub new_name: String,
    pub auth: AuthContext,
}

/// Used by both move and copy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source_uid: String,
    #[serde(default)]
    pub destination_parent_uid: String,
    pub auth: AuthContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetMetadataRequest {
    pub uid: String,
    pub key: String,
    pub value: String,
    pub auth: AuthContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataKeyRequest {
    pub uid: String,
    pub key: String,
    pub auth: AuthContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionMetadataRequest {
    pub uid: String,
    pub version_timestamp: String,
    /// absent when asking for every key
    #[serde(default)]
    pub key: Option<String>,
    pub auth: AuthContext,
}

/// Used by both grant and revoke
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionChangeRequest {
    pub resource_uid: String,
    pub principal: String,
    pub permission: i64,
    pub auth: AuthContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckPermissionRequest {
    #[serde(default)]
    pub resource_uid: String,
    pub required_permission: i64,
    pub auth: AuthContext,
}

/// Used by storage usage and sync triggers; `tenant` defaults to the caller's
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRequest {
    pub auth: AuthContext,
    #[serde(default)]
    pub tenant: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeOldVersionsRequest {
    pub uid: String,
    pub keep_count: u32,
    pub auth: AuthContext,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UidPayload {
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntriesPayload {
    pub entries: Vec<WireEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoPayload {
    pub info: WireFileInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistsPayload {
    pub exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPayload {
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutFilePayload {
    /// false while chunks are still being collected
    pub complete: bool,
    /// stamp of the stored version once complete
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionsPayload {
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoredPayload {
    pub restored_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgedPayload {
    pub purged: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuePayload {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPayload {
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HasPermissionPayload {
    pub has_permission: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub ack: SyncAck,
}
