//! Sync job queue
//!
//! A flume channel carries one [`SyncJob`] per tenant that needs a
//! reconciliation pass. The coordinator tracks which tenants already have a
//! pass queued or running and folds further triggers for them into that pass
//! instead of queueing duplicates.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::acl::Permission;
use crate::auth::AuthContext;
use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJob {
    pub tenant: String,
}

/// What happened to a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAck {
    /// A new pass was queued
    Queued,
    /// Folded into a pass that is already queued or running
    Coalesced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassState {
    Queued,
    Running,
    /// Running, and triggered again since it read engine state
    RunningDirty,
}

type InFlight = Arc<Mutex<HashMap<String, PassState>>>;

/// Cloneable handle for triggering sync passes
#[derive(Debug, Clone)]
pub struct SyncCoordinator {
    tx: flume::Sender<SyncJob>,
    in_flight: InFlight,
}

impl SyncCoordinator {
    /// Create a coordinator and the receiving end for the worker.
    ///
    /// `capacity` bounds the queue; `None` leaves it unbounded.
    pub fn new(capacity: Option<usize>) -> (Self, SyncJobs) {
        let (tx, rx) = match capacity {
            Some(capacity) => flume::bounded(capacity),
            None => flume::unbounded(),
        };
        let in_flight = InFlight::default();
        (
            Self {
                tx,
                in_flight: in_flight.clone(),
            },
            SyncJobs { rx, in_flight },
        )
    }

    /// Ask for a reconciliation pass of `tenant`. Never waits for the pass.
    pub fn trigger_sync(&self, tenant: &str, auth: &AuthContext) -> Result<SyncAck, EngineError> {
        if tenant != auth.tenant {
            return Err(EngineError::PermissionDenied {
                user: auth.user.clone(),
                permission: Permission::Write,
                resource: format!("sync of tenant {tenant}"),
            });
        }

        let mut in_flight = self.in_flight.lock();
        match in_flight.get(tenant).copied() {
            Some(PassState::Running) => {
                in_flight.insert(tenant.to_string(), PassState::RunningDirty);
                tracing::debug!("sync of {} is running, will run again", tenant);
                return Ok(SyncAck::Coalesced);
            }
            Some(_) => {
                tracing::debug!("sync of {} already pending", tenant);
                return Ok(SyncAck::Coalesced);
            }
            None => {}
        }

        let job = SyncJob {
            tenant: tenant.to_string(),
        };
        tracing::info!("SYNC_COORDINATOR: dispatching job: {:?}", job);
        self.tx.try_send(job).map_err(|e| match e {
            flume::TrySendError::Full(_) => {
                EngineError::Internal("sync queue is full".to_string())
            }
            flume::TrySendError::Disconnected(_) => {
                EngineError::Internal("sync worker is not running".to_string())
            }
        })?;
        in_flight.insert(tenant.to_string(), PassState::Queued);
        Ok(SyncAck::Queued)
    }

    /// Whether `tenant` has a pass queued or running
    pub fn is_pending(&self, tenant: &str) -> bool {
        self.in_flight.lock().contains_key(tenant)
    }
}

/// Receiving end of the sync queue, owned by the worker
#[derive(Debug)]
pub struct SyncJobs {
    rx: flume::Receiver<SyncJob>,
    in_flight: InFlight,
}

impl SyncJobs {
    pub async fn recv(&self) -> Option<SyncJob> {
        self.rx.recv_async().await.ok()
    }

    /// Mark a pass as started; engine state read from here on is covered
    pub(crate) fn start(&self, tenant: &str) {
        self.in_flight
            .lock()
            .insert(tenant.to_string(), PassState::Running);
    }

    /// Mark a pass as finished.
    ///
    /// Returns true if it was triggered again while running and should be
    /// repeated; the tenant then stays marked as running.
    pub(crate) fn finish(&self, tenant: &str) -> bool {
        let mut in_flight = self.in_flight.lock();
        match in_flight.get(tenant).copied() {
            Some(PassState::RunningDirty) => {
                in_flight.insert(tenant.to_string(), PassState::Running);
                true
            }
            _ => {
                in_flight.remove(tenant);
                false
            }
        }
    }
}
