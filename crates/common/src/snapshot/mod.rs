//! Tenant snapshots
//!
//! A [`TenantSnapshot`] is everything the engine knows about one tenant:
//! nodes (purged tombstones included, so their uids stay reserved after a
//! restart), version histories, live metadata, explicit grants, the access
//! policy set at runtime and the usage counter. Payloads are not embedded;
//! snapshots reference them by content hash and the blobs travel separately
//! through the [`SnapshotStore`].

mod memory;
mod provider;

use std::collections::{BTreeSet, HashMap};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::acl::{AclEntry, TenantPolicy};
use crate::content::ContentHash;
use crate::error::EngineError;
use crate::metadata::MetadataMap;
use crate::tree::{Engine, Node};
use crate::uid::Uid;
use crate::version::{Version, VersionHistory, VersionStamp};

pub use memory::{MemorySnapshotStore, MemorySnapshotStoreError};
pub use provider::{SnapshotStore, SnapshotStoreError};

/// Bumped whenever the snapshot layout changes incompatibly
pub const SNAPSHOT_FORMAT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub uid: Uid,
    pub clock: VersionStamp,
    pub versions: Vec<Version>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub uid: Uid,
    pub entries: MetadataMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantSnapshot {
    pub format: u32,
    pub tenant: String,
    pub taken_at: DateTime<Utc>,
    pub nodes: Vec<Node>,
    pub histories: Vec<HistoryRecord>,
    pub metadata: Vec<MetadataRecord>,
    pub acl: Vec<AclEntry>,
    /// absent when the tenant runs on the engine default
    #[serde(default)]
    pub policy: Option<TenantPolicy>,
    pub used_space: u64,
    pub total_space: u64,
}

impl TenantSnapshot {
    pub fn empty(tenant: &str) -> Self {
        Self {
            format: SNAPSHOT_FORMAT,
            tenant: tenant.to_string(),
            taken_at: Utc::now(),
            nodes: Vec::new(),
            histories: Vec::new(),
            metadata: Vec::new(),
            acl: Vec::new(),
            policy: None,
            used_space: 0,
            total_space: 0,
        }
    }

    /// Every distinct content hash some retained version points at
    pub fn referenced_content(&self) -> BTreeSet<ContentHash> {
        self.histories
            .iter()
            .flat_map(|record| record.versions.iter().map(|v| v.content))
            .collect()
    }
}

/// A snapshot plus the bytes of every blob it references, read together
#[derive(Debug, Clone)]
pub struct TenantExport {
    pub snapshot: TenantSnapshot,
    pub blobs: Vec<(ContentHash, Bytes)>,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError<T> {
    #[error("snapshot store error: {0}")]
    Store(#[from] SnapshotStoreError<T>),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
}

impl Engine {
    /// Capture one tenant under a single read of engine state
    pub fn export_tenant(&self, tenant: &str) -> TenantExport {
        let state = self.read();
        // counters only move inside write sections, so this matches the nodes
        let usage = self.quotas().usage(tenant);

        let mut nodes: Vec<Node> = state.tree.nodes_of(tenant).cloned().collect();
        nodes.sort_by_key(|node| node.uid);

        let mut snapshot = TenantSnapshot::empty(tenant);
        for node in &nodes {
            if let Some(history) = state.ledger.history(&node.uid) {
                snapshot.histories.push(HistoryRecord {
                    uid: node.uid,
                    clock: history.clock(),
                    versions: history.versions().to_vec(),
                });
            }
            let entries = state.metadata.all(&node.uid);
            if !entries.is_empty() {
                snapshot.metadata.push(MetadataRecord {
                    uid: node.uid,
                    entries,
                });
            }
            snapshot.acl.extend(state.acl.entries_for(node.uid));
        }
        snapshot.nodes = nodes;
        snapshot.policy = state.policies.get(tenant).cloned();
        snapshot.used_space = usage.used_space;
        snapshot.total_space = usage.total_space;

        let blobs = snapshot
            .referenced_content()
            .into_iter()
            .filter_map(|hash| state.content.get(&hash).map(|data| (hash, data)))
            .collect();

        TenantExport { snapshot, blobs }
    }

    /// Load a tenant from a snapshot into an engine that does not know it yet
    pub fn import_tenant(
        &self,
        snapshot: TenantSnapshot,
        blobs: &HashMap<ContentHash, Bytes>,
    ) -> Result<(), EngineError> {
        if snapshot.format != SNAPSHOT_FORMAT {
            return Err(EngineError::Internal(format!(
                "unsupported snapshot format {}",
                snapshot.format
            )));
        }
        let tenant = snapshot.tenant.clone();
        if let Some(node) = snapshot.nodes.iter().find(|node| node.tenant != tenant) {
            return Err(EngineError::Internal(format!(
                "node {} of tenant {} found in snapshot of {}",
                node.uid, node.tenant, tenant
            )));
        }

        let mut histories = Vec::with_capacity(snapshot.histories.len());
        for record in snapshot.histories {
            let history = VersionHistory::from_parts(record.versions, record.clock)?;
            histories.push((record.uid, history));
        }

        let mut guard = self.write();
        let state = &mut *guard;
        if state.tree.nodes_of(&tenant).next().is_some() {
            return Err(EngineError::Conflict(format!(
                "tenant {tenant} is already loaded"
            )));
        }

        // make sure every payload is present before touching anything
        for (_, history) in &histories {
            for version in history.versions() {
                let held = state.content.get(&version.content).is_some();
                if !held && !blobs.contains_key(&version.content) {
                    return Err(EngineError::Internal(format!(
                        "content {} is missing from the snapshot",
                        version.content
                    )));
                }
            }
        }

        let node_count = snapshot.nodes.len();
        for node in snapshot.nodes {
            state.uids.reserve(node.uid);
            state.tree.insert(node);
        }
        for (uid, history) in histories {
            for version in history.versions() {
                if !state.content.retain_existing(&version.content) {
                    if let Some(data) = blobs.get(&version.content) {
                        state.content.retain(data.clone());
                    }
                }
            }
            state.ledger.insert(uid, history);
        }
        for record in snapshot.metadata {
            state.metadata.replace(record.uid, record.entries);
        }
        for entry in snapshot.acl {
            state.acl.insert_entry(entry);
        }
        if let Some(policy) = snapshot.policy {
            state.policies.insert(tenant.clone(), policy);
        }
        drop(guard);

        self.quotas().set_total(&tenant, snapshot.total_space);
        self.quotas().restore_used(&tenant, snapshot.used_space);
        tracing::info!(
            "imported tenant {} ({} nodes, {} bytes used)",
            tenant,
            node_count,
            snapshot.used_space
        );
        Ok(())
    }
}

/// Load every tenant the store has a snapshot of. Returns the tenants loaded.
pub async fn hydrate<S: SnapshotStore>(
    engine: &Engine,
    store: &S,
) -> Result<Vec<String>, PersistError<S::Error>> {
    let mut loaded = Vec::new();
    for tenant in store.tenants().await? {
        let Some(snapshot) = store.latest_snapshot(&tenant).await? else {
            continue;
        };
        let blobs = store.load_blobs(&snapshot).await?;
        engine.import_tenant(snapshot, &blobs)?;
        loaded.push(tenant);
    }
    Ok(loaded)
}
