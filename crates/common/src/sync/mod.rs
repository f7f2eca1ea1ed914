//! Sync coordinator
//!
//! Triggers go through a [`SyncCoordinator`] and return immediately; a single
//! background worker persists the tenant to a [`SnapshotStore`] and then runs
//! content garbage collection.
//!
//! [`SnapshotStore`]: crate::snapshot::SnapshotStore

mod jobs;
mod worker;

pub use jobs::{SyncAck, SyncCoordinator, SyncJob, SyncJobs};
pub use worker::{reconcile, run_worker, sweep_blobs, SyncReport, RETAINED_SNAPSHOTS};
