use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

use crate::content::ContentHash;

use super::TenantSnapshot;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStoreError<T> {
    /// Anything the backing store itself failed at
    #[error("unhandled snapshot store error: {0}")]
    Provider(#[from] T),
    #[error("blob not found: {0}")]
    BlobNotFound(ContentHash),
    /// Blob bytes do not hash to the key they were stored under
    #[error("blob hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },
}

/// Durable home for tenant snapshots and the content blobs they reference.
///
/// Blobs are content addressed, so writing the same blob twice is harmless.
#[async_trait]
pub trait SnapshotStore: Send + Sync + Debug + Clone + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn has_blob(&self, hash: &ContentHash) -> Result<bool, SnapshotStoreError<Self::Error>>;

    /// Store a blob under its hash
    ///
    /// Should fail with `HashMismatch` if `data` does not hash to `hash`.
    async fn put_blob(
        &self,
        hash: ContentHash,
        data: Bytes,
    ) -> Result<(), SnapshotStoreError<Self::Error>>;

    async fn get_blob(&self, hash: &ContentHash) -> Result<Bytes, SnapshotStoreError<Self::Error>>;

    /// Record a snapshot as the newest one for its tenant
    async fn put_snapshot(
        &self,
        snapshot: &TenantSnapshot,
    ) -> Result<(), SnapshotStoreError<Self::Error>>;

    async fn latest_snapshot(
        &self,
        tenant: &str,
    ) -> Result<Option<TenantSnapshot>, SnapshotStoreError<Self::Error>>;

    /// Every tenant with at least one snapshot
    async fn tenants(&self) -> Result<Vec<String>, SnapshotStoreError<Self::Error>>;

    /// Drop all but the newest `keep` snapshots of `tenant`; returns how many went
    async fn prune_snapshots(
        &self,
        tenant: &str,
        keep: usize,
    ) -> Result<usize, SnapshotStoreError<Self::Error>>;

    /// Hashes of every blob held
    async fn blob_hashes(&self) -> Result<Vec<ContentHash>, SnapshotStoreError<Self::Error>>;

    /// Delete a blob. Removing an absent blob is not an error.
    async fn remove_blob(&self, hash: &ContentHash) -> Result<(), SnapshotStoreError<Self::Error>>;

    /// Fetch every blob a snapshot references
    async fn load_blobs(
        &self,
        snapshot: &TenantSnapshot,
    ) -> Result<HashMap<ContentHash, Bytes>, SnapshotStoreError<Self::Error>> {
        let mut blobs = HashMap::new();
        for hash in snapshot.referenced_content() {
            let data = self.get_blob(&hash).await?;
            blobs.insert(hash, data);
        }
        Ok(blobs)
    }
}

pub(crate) fn verify_blob<T>(hash: &ContentHash, data: &[u8]) -> Result<(), SnapshotStoreError<T>> {
    let actual = ContentHash::of(data);
    if actual != *hash {
        return Err(SnapshotStoreError::HashMismatch {
            expected: *hash,
            actual,
        });
    }
    Ok(())
}
