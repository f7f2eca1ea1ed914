use tokio::sync::watch::Receiver as WatchReceiver;

use crate::snapshot::{PersistError, SnapshotStore};
use crate::tree::Engine;

use super::jobs::SyncJobs;

/// Snapshots kept per tenant after a pass
pub const RETAINED_SNAPSHOTS: usize = 1;

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    pub nodes: usize,
    pub blobs_written: usize,
    /// blobs dropped from engine memory
    pub blobs_collected: usize,
    pub snapshots_pruned: usize,
    /// blobs deleted from the store
    pub blobs_removed: usize,
}

/// Persist one tenant and drop content nothing references any more.
///
/// Engine state is read once, synchronously; everything after that works on
/// the exported copy, so no engine lock is held while the store is awaited.
/// Older snapshots of the tenant are pruned once the new one is stored, and
/// whenever the engine collected content the store is swept as well.
pub async fn reconcile<S: SnapshotStore>(
    engine: &Engine,
    store: &S,
    tenant: &str,
) -> Result<SyncReport, PersistError<S::Error>> {
    let export = engine.export_tenant(tenant);

    let mut blobs_written = 0;
    for (hash, data) in export.blobs {
        if store.has_blob(&hash).await? {
            continue;
        }
        store.put_blob(hash, data).await?;
        blobs_written += 1;
    }
    store.put_snapshot(&export.snapshot).await?;
    let snapshots_pruned = store.prune_snapshots(tenant, RETAINED_SNAPSHOTS).await?;

    let blobs_collected = engine.collect_garbage();
    let blobs_removed = if blobs_collected > 0 {
        sweep_blobs(engine, store).await?
    } else {
        0
    };
    Ok(SyncReport {
        nodes: export.snapshot.nodes.len(),
        blobs_written,
        blobs_collected,
        snapshots_pruned,
        blobs_removed,
    })
}

/// Delete stored blobs that neither the engine nor any tenant's latest
/// snapshot references. Returns how many were deleted.
///
/// Blobs of other tenants whose stored snapshot is older than their engine
/// state stay until a later sweep, so a restart never finds one missing.
pub async fn sweep_blobs<S: SnapshotStore>(
    engine: &Engine,
    store: &S,
) -> Result<usize, PersistError<S::Error>> {
    let mut live = engine.held_content();
    for tenant in store.tenants().await? {
        if let Some(snapshot) = store.latest_snapshot(&tenant).await? {
            live.extend(snapshot.referenced_content());
        }
    }

    let mut removed = 0;
    for hash in store.blob_hashes().await? {
        if live.contains(&hash) {
            continue;
        }
        store.remove_blob(&hash).await?;
        removed += 1;
    }
    if removed > 0 {
        tracing::debug!("removed {} unreferenced blobs from the store", removed);
    }
    Ok(removed)
}

/// Drain the sync queue until every coordinator is gone or shutdown fires
pub async fn run_worker<S: SnapshotStore>(
    engine: Engine,
    store: S,
    jobs: SyncJobs,
    mut shutdown_rx: WatchReceiver<()>,
) {
    tracing::info!("Sync worker started");

    loop {
        let job = tokio::select! {
            job = jobs.recv() => job,
            _ = shutdown_rx.changed() => {
                tracing::info!("Sync worker shutting down");
                break;
            }
        };
        let Some(job) = job else {
            break;
        };

        jobs.start(&job.tenant);
        loop {
            match reconcile(&engine, &store, &job.tenant).await {
                Ok(report) => tracing::info!(
                    "synced tenant {}: {} nodes, {} blobs written, {} blobs collected",
                    job.tenant,
                    report.nodes,
                    report.blobs_written,
                    report.blobs_collected
                ),
                Err(e) => tracing::error!("sync of tenant {} failed: {}", job.tenant, e),
            }
            if !jobs.finish(&job.tenant) {
                break;
            }
            tracing::debug!("tenant {} changed during sync, running again", job.tenant);
        }
    }

    tracing::info!("Sync worker stopped");
}

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use super::*;
    use crate::auth::AuthContext;
    use crate::snapshot::{MemorySnapshotStore, SnapshotStore};

    #[tokio::test]
    async fn test_reconcile_writes_blobs_once_and_collects() {
        let engine = Engine::default();
        let store = MemorySnapshotStore::new();
        let auth = AuthContext::new("root", "acme");

        let file = engine.touch(None, "a.txt", &auth).await.unwrap();
        engine.put_file(file, Bytes::from_static(b"one"), &auth).await.unwrap();
        engine.put_file(file, Bytes::from_static(b"two"), &auth).await.unwrap();

        let report = reconcile(&engine, &store, "acme").await.unwrap();
        assert_eq!(report.blobs_written, 2);
        assert_eq!(report.blobs_collected, 0);

        engine.purge_old_versions(file, 1, &auth).await.unwrap();
        let report = reconcile(&engine, &store, "acme").await.unwrap();
        assert_eq!(report.blobs_written, 0);
        assert_eq!(report.blobs_collected, 1);
        assert_eq!(report.blobs_removed, 1);
        assert_eq!(report.snapshots_pruned, 1);
        assert_eq!(engine.blob_count(), 1);
        assert_eq!(store.blob_count(), 1);
        assert_eq!(store.snapshot_count("acme"), 1);
    }

    #[tokio::test]
    async fn test_sweep_keeps_blobs_of_stale_tenants() {
        let engine = Engine::default();
        let store = MemorySnapshotStore::new();
        let acme = AuthContext::new("root", "acme");
        let other = AuthContext::new("root", "other");

        let a = engine.touch(None, "a", &acme).await.unwrap();
        engine.put_file(a, Bytes::from_static(b"shared"), &acme).await.unwrap();
        let b = engine.touch(None, "b", &other).await.unwrap();
        engine.put_file(b, Bytes::from_static(b"shared"), &other).await.unwrap();
        reconcile(&engine, &store, "acme").await.unwrap();
        reconcile(&engine, &store, "other").await.unwrap();

        // both drop the payload, only acme syncs
        engine.put_file(a, Bytes::from_static(b"a2"), &acme).await.unwrap();
        engine.put_file(b, Bytes::from_static(b"b2"), &other).await.unwrap();
        engine.purge_old_versions(a, 1, &acme).await.unwrap();
        engine.purge_old_versions(b, 1, &other).await.unwrap();
        let report = reconcile(&engine, &store, "acme").await.unwrap();
        assert_eq!(report.blobs_collected, 1);
        assert_eq!(report.blobs_removed, 0);

        // once the stale snapshot is replaced the next sweep takes it
        reconcile(&engine, &store, "other").await.unwrap();
        assert_eq!(sweep_blobs(&engine, &store).await.unwrap(), 1);
        let shared = crate::content::ContentHash::of(b"shared");
        assert!(!store.blob_hashes().await.unwrap().contains(&shared));
    }
}
