//! Per-tenant space accounting
//!
//! `used` counts the current-version bytes of every non-purged file in the
//! tenant. Counters are atomics; growth is checked against `total` inside the
//! same compare-and-swap that applies it, so concurrent writers to different
//! files of one tenant can never jointly overshoot the quota and the final
//! total does not depend on the order deltas arrive in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// 10 GiB
pub const DEFAULT_TOTAL_SPACE: u64 = 10 * 1024 * 1024 * 1024;

#[derive(Debug)]
struct TenantCounter {
    used: AtomicU64,
    total: AtomicU64,
}

/// Usage report for one tenant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub total_space: u64,
    pub used_space: u64,
    pub available_space: u64,
    /// `used / total * 100`, 0 when total is 0
    pub usage_percentage: f64,
}

impl StorageUsage {
    fn derive(used: u64, total: u64) -> Self {
        let usage_percentage = if total == 0 {
            0.0
        } else {
            used as f64 / total as f64 * 100.0
        };
        Self {
            total_space: total,
            used_space: used,
            available_space: total.saturating_sub(used),
            usage_percentage,
        }
    }
}

#[derive(Debug)]
pub struct QuotaAccountant {
    tenants: RwLock<HashMap<String, Arc<TenantCounter>>>,
    default_total: u64,
}

impl Default for QuotaAccountant {
    fn default() -> Self {
        Self::new(DEFAULT_TOTAL_SPACE)
    }
}

impl QuotaAccountant {
    pub fn new(default_total: u64) -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            default_total,
        }
    }

    fn counter(&self, tenant: &str) -> Arc<TenantCounter> {
        if let Some(counter) = self.tenants.read().get(tenant) {
            return counter.clone();
        }
        self.tenants
            .write()
            .entry(tenant.to_string())
            .or_insert_with(|| {
                Arc::new(TenantCounter {
                    used: AtomicU64::new(0),
                    total: AtomicU64::new(self.default_total),
                })
            })
            .clone()
    }

    pub fn set_total(&self, tenant: &str, total: u64) {
        self.counter(tenant).total.store(total, Ordering::SeqCst);
    }

    /// Apply a change in used space.
    ///
    /// Growth that would push `used` above `total` is refused with
    /// `ResourceExhausted` and nothing is applied. Shrinking saturates at 0.
    /// Returns the new used value.
    pub fn record_delta(&self, tenant: &str, delta: i64) -> Result<u64, EngineError> {
        let counter = self.counter(tenant);
        let total = counter.total.load(Ordering::SeqCst);
        let increase = delta.max(0) as u64;
        let decrease = delta.min(0).unsigned_abs();

        let result = counter
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                if increase > 0 {
                    let next = used.checked_add(increase)?;
                    (next <= total).then_some(next)
                } else {
                    Some(used.saturating_sub(decrease))
                }
            });

        match result {
            Ok(previous) => {
                let now = if increase > 0 {
                    previous + increase
                } else {
                    previous.saturating_sub(decrease)
                };
                tracing::trace!("quota {}: {} -> {} ({:+})", tenant, previous, now, delta);
                Ok(now)
            }
            Err(used) => Err(EngineError::ResourceExhausted {
                tenant: tenant.to_string(),
                used,
                increase,
                total,
            }),
        }
    }

    /// Overwrite the used counter, used when hydrating from a snapshot
    pub fn restore_used(&self, tenant: &str, used: u64) {
        self.counter(tenant).used.store(used, Ordering::SeqCst);
    }

    pub fn usage(&self, tenant: &str) -> StorageUsage {
        let counter = self.counter(tenant);
        StorageUsage::derive(
            counter.used.load(Ordering::SeqCst),
            counter.total.load(Ordering::SeqCst),
        )
    }
}
