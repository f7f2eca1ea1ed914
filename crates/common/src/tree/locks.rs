//! Per-node exclusive sections
//!
//! Mutations lock every node whose identity, parent pointer, children set or
//! current version they may change. Multi-node operations lock in ascending
//! [`NodeKey`] order so two concurrent cross-directory moves can never wait
//! on each other. Guards are plain owned mutex guards: dropping the future
//! that holds them (cancellation) releases them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::node::NodeKey;

#[derive(Debug, Default)]
pub struct NodeLocks {
    table: Arc<Mutex<HashMap<NodeKey, Arc<AsyncMutex<()>>>>>,
}

impl NodeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every key in `keys`, in ascending order, deduplicated
    pub async fn acquire(&self, keys: impl IntoIterator<Item = NodeKey>) -> NodeGuard {
        let mut keys: Vec<NodeKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let lock = {
                let mut table = self.table.lock();
                table
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                    .clone()
            };
            guards.push(lock.lock_owned().await);
        }

        NodeGuard {
            keys,
            guards,
            table: self.table.clone(),
        }
    }

    /// Number of keys currently tracked
    pub fn tracked(&self) -> usize {
        self.table.lock().len()
    }
}

/// Held exclusive sections; released on drop
pub struct NodeGuard {
    keys: Vec<NodeKey>,
    guards: Vec<OwnedMutexGuard<()>>,
    table: Arc<Mutex<HashMap<NodeKey, Arc<AsyncMutex<()>>>>>,
}

impl NodeGuard {
    pub fn keys(&self) -> &[NodeKey] {
        &self.keys
    }
}

impl Drop for NodeGuard {
    fn drop(&mut self) {
        self.guards.clear();
        // forget locks nobody else is holding or waiting on
        let mut table = self.table.lock();
        for key in &self.keys {
            if let Some(lock) = table.get(key) {
                if Arc::strong_count(lock) == 1 {
                    table.remove(key);
                }
            }
        }
    }
}
