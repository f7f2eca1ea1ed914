use common::snapshot::{hydrate, PersistError};
use common::sync::{sweep_blobs, SyncCoordinator, SyncJobs};
use common::tree::Engine;

use super::config::Config;
use super::fs_store::{FsSnapshotStore, FsSnapshotStoreError};

/// Main service state - the engine plus everything that persists it
#[derive(Clone, Debug)]
pub struct State {
    engine: Engine,
    store: FsSnapshotStore,
    sync: SyncCoordinator,
}

impl State {
    /// Build state from config.
    ///
    /// Returns the receiving end of the sync queue alongside; whoever runs the
    /// sync worker takes it.
    pub async fn from_config(config: &Config) -> Result<(Self, SyncJobs), StateSetupError> {
        // 1. Setup snapshot store
        let snapshot_path = config.snapshot_path.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("fileengine-{}", uuid::Uuid::new_v4()))
        });
        let store = FsSnapshotStore::open(&snapshot_path).await?;

        // 2. Load whatever was persisted
        let engine = Engine::new(config.default_quota_bytes);
        let loaded = hydrate(&engine, &store).await?;
        tracing::info!("hydrated {} tenant(s) from {}", loaded.len(), snapshot_path.display());
        let removed = sweep_blobs(&engine, &store)
            .await
            .map_err(StateSetupError::Sweep)?;
        if removed > 0 {
            tracing::info!("removed {} orphaned blob(s)", removed);
        }

        // 3. Configured quotas and policies win over persisted ones
        for tenant in &config.tenants {
            engine.set_policy(&tenant.name, tenant.policy());
            engine.set_quota(
                &tenant.name,
                tenant.quota_bytes.unwrap_or(config.default_quota_bytes),
            );
        }

        // 4. Sync queue
        let (sync, jobs) = SyncCoordinator::new(config.sync_queue_size);

        Ok((Self { engine, store, sync }, jobs))
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn store(&self) -> &FsSnapshotStore {
        &self.store
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }
}

impl AsRef<Engine> for State {
    fn as_ref(&self) -> &Engine {
        &self.engine
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("snapshot store error: {0}")]
    SnapshotStore(#[from] FsSnapshotStoreError),
    #[error("failed to hydrate engine: {0}")]
    Hydrate(#[from] PersistError<FsSnapshotStoreError>),
    #[error("failed to sweep orphaned blobs: {0}")]
    Sweep(PersistError<FsSnapshotStoreError>),
}
