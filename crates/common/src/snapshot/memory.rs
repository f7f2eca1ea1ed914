use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use super::provider::{verify_blob, SnapshotStore, SnapshotStoreError};
use super::TenantSnapshot;
use crate::content::ContentHash;

/// In-memory snapshot store, for tests and ephemeral deployments
#[derive(Debug, Clone)]
pub struct MemorySnapshotStore {
    inner: Arc<RwLock<MemorySnapshotStoreInner>>,
}

#[derive(Debug, Default)]
struct MemorySnapshotStoreInner {
    blobs: HashMap<ContentHash, Bytes>,
    /// Every snapshot taken per tenant, oldest first
    snapshots: HashMap<String, Vec<TenantSnapshot>>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemorySnapshotStoreError {
    #[error("memory store error: {0}")]
    Internal(String),
}

fn poisoned<E: std::fmt::Display>(e: E) -> SnapshotStoreError<MemorySnapshotStoreError> {
    SnapshotStoreError::Provider(MemorySnapshotStoreError::Internal(format!(
        "failed to acquire lock: {}",
        e
    )))
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemorySnapshotStoreInner::default())),
        }
    }

    /// Number of snapshots recorded for `tenant`
    pub fn snapshot_count(&self, tenant: &str) -> usize {
        self.inner
            .read()
            .map(|inner| inner.snapshots.get(tenant).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn blob_count(&self) -> usize {
        self.inner.read().map(|inner| inner.blobs.len()).unwrap_or(0)
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    type Error = MemorySnapshotStoreError;

    async fn has_blob(&self, hash: &ContentHash) -> Result<bool, SnapshotStoreError<Self::Error>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.blobs.contains_key(hash))
    }

    async fn put_blob(
        &self,
        hash: ContentHash,
        data: Bytes,
    ) -> Result<(), SnapshotStoreError<Self::Error>> {
        verify_blob::<Self::Error>(&hash, &data)?;
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.blobs.entry(hash).or_insert(data);
        Ok(())
    }

    async fn get_blob(&self, hash: &ContentHash) -> Result<Bytes, SnapshotStoreError<Self::Error>> {
        let inner = self.inner.read().map_err(poisoned)?;
        inner
            .blobs
            .get(hash)
            .cloned()
            .ok_or(SnapshotStoreError::BlobNotFound(*hash))
    }

    async fn put_snapshot(
        &self,
        snapshot: &TenantSnapshot,
    ) -> Result<(), SnapshotStoreError<Self::Error>> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner
            .snapshots
            .entry(snapshot.tenant.clone())
            .or_default()
            .push(snapshot.clone());
        Ok(())
    }

    async fn latest_snapshot(
        &self,
        tenant: &str,
    ) -> Result<Option<TenantSnapshot>, SnapshotStoreError<Self::Error>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .snapshots
            .get(tenant)
            .and_then(|snapshots| snapshots.last())
            .cloned())
    }

    async fn tenants(&self) -> Result<Vec<String>, SnapshotStoreError<Self::Error>> {
        let inner = self.inner.read().map_err(poisoned)?;
        let mut tenants: Vec<String> = inner.snapshots.keys().cloned().collect();
        tenants.sort();
        Ok(tenants)
    }

    async fn prune_snapshots(
        &self,
        tenant: &str,
        keep: usize,
    ) -> Result<usize, SnapshotStoreError<Self::Error>> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let Some(snapshots) = inner.snapshots.get_mut(tenant) else {
            return Ok(0);
        };
        let excess = snapshots.len().saturating_sub(keep);
        snapshots.drain(..excess);
        Ok(excess)
    }

    async fn blob_hashes(&self) -> Result<Vec<ContentHash>, SnapshotStoreError<Self::Error>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.blobs.keys().copied().collect())
    }

    async fn remove_blob(&self, hash: &ContentHash) -> Result<(), SnapshotStoreError<Self::Error>> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.blobs.remove(hash);
        Ok(())
    }
}
