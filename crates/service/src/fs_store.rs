//! Filesystem snapshot store
//!
//! Layout under the root directory:
//!
//! ```text
//! blobs/<blake3 hex>
//! snapshots/<hex(tenant)>/<taken_at micros, zero padded>.json
//! ```
//!
//! Every file is written to a temporary name and renamed into place, so a
//! crash mid-write never leaves a truncated blob or snapshot behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use common::content::ContentHash;
use common::snapshot::{SnapshotStore, SnapshotStoreError, TenantSnapshot};

const BLOBS_DIR_NAME: &str = "blobs";
const SNAPSHOTS_DIR_NAME: &str = "snapshots";
const SNAPSHOT_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    root: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum FsSnapshotStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid tenant directory name: {0}")]
    InvalidTenantDir(String),
}

type Result<T> = std::result::Result<T, SnapshotStoreError<FsSnapshotStoreError>>;

fn io(e: std::io::Error) -> SnapshotStoreError<FsSnapshotStoreError> {
    SnapshotStoreError::Provider(FsSnapshotStoreError::Io(e))
}

impl FsSnapshotStore {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn open(root: impl AsRef<Path>) -> std::result::Result<Self, FsSnapshotStoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(BLOBS_DIR_NAME)).await?;
        fs::create_dir_all(root.join(SNAPSHOTS_DIR_NAME)).await?;
        tracing::info!("snapshot store opened at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        self.root.join(BLOBS_DIR_NAME).join(hash.to_hex())
    }

    fn tenant_dir(&self, tenant: &str) -> PathBuf {
        self.root
            .join(SNAPSHOTS_DIR_NAME)
            .join(hex::encode(tenant.as_bytes()))
    }

    async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, data).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e);
        }
        Ok(())
    }

    /// Snapshot file names of a tenant, oldest first
    async fn snapshot_files(&self, tenant: &str) -> Result<Vec<PathBuf>> {
        let dir = self.tenant_dir(tenant);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io(e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io)? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(SNAPSHOT_EXTENSION) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    type Error = FsSnapshotStoreError;

    async fn has_blob(&self, hash: &ContentHash) -> Result<bool> {
        fs::try_exists(self.blob_path(hash)).await.map_err(io)
    }

    async fn put_blob(&self, hash: ContentHash, data: Bytes) -> Result<()> {
        let actual = ContentHash::of(&data);
        if actual != hash {
            return Err(SnapshotStoreError::HashMismatch {
                expected: hash,
                actual,
            });
        }
        let path = self.blob_path(&hash);
        if fs::try_exists(&path).await.map_err(io)? {
            return Ok(());
        }
        Self::write_atomic(&path, &data).await.map_err(io)?;
        tracing::debug!("stored blob {} ({} bytes)", hash, data.len());
        Ok(())
    }

    async fn get_blob(&self, hash: &ContentHash) -> Result<Bytes> {
        let data = match fs::read(self.blob_path(hash)).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SnapshotStoreError::BlobNotFound(*hash))
            }
            Err(e) => return Err(io(e)),
        };
        let actual = ContentHash::of(&data);
        if actual != *hash {
            return Err(SnapshotStoreError::HashMismatch {
                expected: *hash,
                actual,
            });
        }
        Ok(data)
    }

    async fn put_snapshot(&self, snapshot: &TenantSnapshot) -> Result<()> {
        let dir = self.tenant_dir(&snapshot.tenant);
        fs::create_dir_all(&dir).await.map_err(io)?;

        let encoded = serde_json::to_vec(snapshot)
            .map_err(|e| SnapshotStoreError::Provider(FsSnapshotStoreError::Json(e)))?;
        let name = format!(
            "{:020}.{}",
            snapshot.taken_at.timestamp_micros().max(0),
            SNAPSHOT_EXTENSION
        );
        Self::write_atomic(&dir.join(name), &encoded)
            .await
            .map_err(io)?;
        tracing::debug!(
            "stored snapshot of {} ({} nodes)",
            snapshot.tenant,
            snapshot.nodes.len()
        );
        Ok(())
    }

    async fn latest_snapshot(&self, tenant: &str) -> Result<Option<TenantSnapshot>> {
        let Some(path) = self.snapshot_files(tenant).await?.pop() else {
            return Ok(None);
        };
        let raw = fs::read(&path).await.map_err(io)?;
        let snapshot = serde_json::from_slice(&raw)
            .map_err(|e| SnapshotStoreError::Provider(FsSnapshotStoreError::Json(e)))?;
        Ok(Some(snapshot))
    }

    async fn tenants(&self) -> Result<Vec<String>> {
        let mut entries = fs::read_dir(self.root.join(SNAPSHOTS_DIR_NAME))
            .await
            .map_err(io)?;

        let mut tenants = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let tenant = hex::decode(&name)
                .ok()
                .and_then(|raw| String::from_utf8(raw).ok())
                .ok_or_else(|| {
                    SnapshotStoreError::Provider(FsSnapshotStoreError::InvalidTenantDir(
                        name.clone(),
                    ))
                })?;
            tenants.push(tenant);
        }
        tenants.sort();
        Ok(tenants)
    }

    async fn prune_snapshots(&self, tenant: &str, keep: usize) -> Result<usize> {
        let files = self.snapshot_files(tenant).await?;
        let excess = files.len().saturating_sub(keep);
        for path in &files[..excess] {
            match fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io(e)),
            }
        }
        if excess > 0 {
            tracing::debug!("pruned {} old snapshot(s) of {}", excess, tenant);
        }
        Ok(excess)
    }

    async fn blob_hashes(&self) -> Result<Vec<ContentHash>> {
        let mut entries = fs::read_dir(self.root.join(BLOBS_DIR_NAME))
            .await
            .map_err(io)?;

        let mut hashes = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io)? {
            // temporaries of interrupted writes do not parse
            if let Some(hash) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<ContentHash>().ok())
            {
                hashes.push(hash);
            }
        }
        Ok(hashes)
    }

    async fn remove_blob(&self, hash: &ContentHash) -> Result<()> {
        match fs::remove_file(self.blob_path(hash)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io(e)),
        }
    }
}

#[cfg(test)]
mod test {
    use common::auth::AuthContext;
    use common::snapshot::hydrate;
    use common::sync::reconcile;
    use common::tree::Engine;

    use super::*;

    #[tokio::test]
    async fn test_blobs_are_verified() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::open(dir.path()).await.unwrap();

        let data = Bytes::from_static(b"hello");
        let hash = ContentHash::of(&data);
        assert!(!store.has_blob(&hash).await.unwrap());
        store.put_blob(hash, data.clone()).await.unwrap();
        assert!(store.has_blob(&hash).await.unwrap());
        assert_eq!(store.get_blob(&hash).await.unwrap(), data);

        let result = store.put_blob(hash, Bytes::from_static(b"other")).await;
        assert!(matches!(result, Err(SnapshotStoreError::HashMismatch { .. })));

        let missing = ContentHash::of(b"missing");
        let result = store.get_blob(&missing).await;
        assert!(matches!(result, Err(SnapshotStoreError::BlobNotFound(_))));

        // corrupt the stored file
        std::fs::write(dir.path().join(BLOBS_DIR_NAME).join(hash.to_hex()), b"junk").unwrap();
        let result = store.get_blob(&hash).await;
        assert!(matches!(result, Err(SnapshotStoreError::HashMismatch { .. })));
    }

    #[tokio::test]
    async fn test_restart_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let auth = AuthContext::new("root", "team/a");

        let engine = Engine::default();
        let file = engine.touch(None, "notes.txt", &auth).await.unwrap();
        engine
            .put_file(file, Bytes::from_static(b"persisted"), &auth)
            .await
            .unwrap();
        {
            let store = FsSnapshotStore::open(dir.path()).await.unwrap();
            reconcile(&engine, &store, "team/a").await.unwrap();
            engine.touch(None, "later.txt", &auth).await.unwrap();
            reconcile(&engine, &store, "team/a").await.unwrap();
            assert_eq!(store.tenants().await.unwrap(), vec!["team/a".to_string()]);
        }

        let store = FsSnapshotStore::open(dir.path()).await.unwrap();
        let restored = Engine::default();
        hydrate(&restored, &store).await.unwrap();
        assert_eq!(
            restored.get_file(file, None, &auth).await.unwrap(),
            Bytes::from_static(b"persisted")
        );
        assert_eq!(restored.list_directory(None, &auth).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::open(dir.path()).await.unwrap();
        assert!(store.tenants().await.unwrap().is_empty());
        assert!(store.latest_snapshot("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prune_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::open(dir.path()).await.unwrap();

        let mut newest = None;
        for _ in 0..3 {
            let snapshot = TenantSnapshot::empty("acme");
            store.put_snapshot(&snapshot).await.unwrap();
            newest = Some(snapshot.taken_at);
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        assert_eq!(store.prune_snapshots("acme", 1).await.unwrap(), 2);
        assert_eq!(store.prune_snapshots("acme", 1).await.unwrap(), 0);
        let latest = store.latest_snapshot("acme").await.unwrap().unwrap();
        assert_eq!(Some(latest.taken_at), newest);

        let data = Bytes::from_static(b"hello");
        let hash = ContentHash::of(&data);
        store.put_blob(hash, data).await.unwrap();
        std::fs::write(dir.path().join(BLOBS_DIR_NAME).join("x.tmp-1"), b"partial").unwrap();
        assert_eq!(store.blob_hashes().await.unwrap(), vec![hash]);

        store.remove_blob(&hash).await.unwrap();
        assert!(!store.has_blob(&hash).await.unwrap());
        // already gone is fine
        store.remove_blob(&hash).await.unwrap();
        assert!(store.blob_hashes().await.unwrap().is_empty());
    }
}
