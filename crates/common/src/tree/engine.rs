//! The engine facade
//!
//! All engine state sits behind one `parking_lot::RwLock`. A mutation first
//! takes the per-node async locks of everything it may touch, then validates
//! and commits inside a single synchronous write section. Nothing awaits
//! while the state lock is held, so dropping a request future either leaves
//! state untouched or fully committed.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::acl::{AclTable, Permission, TenantPolicy};
use crate::auth::AuthContext;
use crate::content::{ContentHash, ContentStore};
use crate::error::EngineError;
use crate::metadata::MetadataStore;
use crate::quota::{QuotaAccountant, StorageUsage, DEFAULT_TOTAL_SPACE};
use crate::uid::{Uid, UidAllocator};
use crate::version::VersionLedger;

use super::index::Tree;
use super::locks::{NodeGuard, NodeLocks};
use super::node::{Node, NodeKey};

#[derive(Debug, Default)]
pub struct EngineState {
    pub(crate) uids: UidAllocator,
    pub(crate) tree: Tree,
    pub(crate) ledger: VersionLedger,
    pub(crate) metadata: MetadataStore,
    pub(crate) acl: AclTable,
    pub(crate) content: ContentStore,
    pub(crate) policies: HashMap<String, TenantPolicy>,
    pub(crate) default_policy: TenantPolicy,
}

impl EngineState {
    pub(crate) fn policy(&self, tenant: &str) -> &TenantPolicy {
        self.policies.get(tenant).unwrap_or(&self.default_policy)
    }

    /// A non-purged node of the caller's tenant
    pub(crate) fn lookup(&self, uid: Uid, auth: &AuthContext) -> Result<&Node, EngineError> {
        match self.tree.get(&uid) {
            Some(node) if !node.is_purged() && node.tenant == auth.tenant => Ok(node),
            _ => Err(EngineError::not_found(format!("node {uid}"))),
        }
    }

    /// A node that is neither soft-deleted nor purged
    pub(crate) fn lookup_live(&self, uid: Uid, auth: &AuthContext) -> Result<&Node, EngineError> {
        let node = self.lookup(uid, auth)?;
        if !node.is_live() {
            return Err(EngineError::not_found(format!("node {uid} is deleted")));
        }
        Ok(node)
    }

    /// A live directory, or `None` for the tenant root
    pub(crate) fn lookup_dir(
        &self,
        uid: Option<Uid>,
        auth: &AuthContext,
    ) -> Result<Option<&Node>, EngineError> {
        let Some(uid) = uid else {
            return Ok(None);
        };
        let node = self.lookup_live(uid, auth)?;
        if !node.is_dir() {
            return Err(EngineError::not_found(format!("directory {uid}")));
        }
        Ok(Some(node))
    }

    /// Require `permission` on `node`, or on the tenant root when `None`
    pub(crate) fn authorize(
        &self,
        node: Option<&Node>,
        permission: Permission,
        auth: &AuthContext,
    ) -> Result<(), EngineError> {
        let decision = self.acl.decide(
            node.map(|n| n.uid),
            node.map(|n| n.owner.as_str()),
            permission,
            auth,
            self.policy(&auth.tenant),
        );
        if decision.allows() {
            tracing::trace!(
                "authorized {} for {} on {}: {:?}",
                permission,
                auth.user,
                resource_name(node),
                decision
            );
            return Ok(());
        }
        Err(EngineError::PermissionDenied {
            user: auth.user.clone(),
            permission,
            resource: resource_name(node),
        })
    }

    /// The resource a node's name is scoped by: its parent, or the root
    pub(crate) fn parent_of(&self, node: &Node) -> Option<&Node> {
        node.parent.and_then(|parent| self.tree.get(&parent))
    }
}

fn resource_name(node: Option<&Node>) -> String {
    match node {
        Some(node) => node.uid.to_string(),
        None => "<tenant root>".to_string(),
    }
}

pub(crate) fn parent_key(parent: Option<Uid>, auth: &AuthContext) -> NodeKey {
    match parent {
        Some(uid) => NodeKey::Node(uid),
        None => NodeKey::TenantRoot(auth.tenant.clone()),
    }
}

struct EngineInner {
    state: RwLock<EngineState>,
    locks: NodeLocks,
    quotas: QuotaAccountant,
}

/// Handle to a shared engine; clones are cheap
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(DEFAULT_TOTAL_SPACE)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("Engine")
            .field("nodes", &state.tree.len())
            .field("blobs", &state.content.len())
            .finish()
    }
}

impl Engine {
    /// New empty engine; tenants without an explicit quota get `default_total`
    pub fn new(default_total: u64) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                state: RwLock::new(EngineState::default()),
                locks: NodeLocks::new(),
                quotas: QuotaAccountant::new(default_total),
            }),
        }
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.inner.state.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.inner.state.write()
    }

    pub fn quotas(&self) -> &QuotaAccountant {
        &self.inner.quotas
    }

    pub(crate) async fn lock(&self, keys: impl IntoIterator<Item = NodeKey>) -> NodeGuard {
        self.inner.locks.acquire(keys).await
    }

    /// Lock `uid`, its current parent and `extra`.
    ///
    /// The parent is read before locking, so the acquisition is retried
    /// until the parent observed under the locks is the one that was locked.
    pub(crate) async fn lock_with_parent(
        &self,
        uid: Uid,
        extra: Option<NodeKey>,
        auth: &AuthContext,
    ) -> Result<NodeGuard, EngineError> {
        loop {
            let parent = self.read().lookup(uid, auth)?.parent_key();
            let keys = [Some(NodeKey::Node(uid)), Some(parent.clone()), extra.clone()];
            let guard = self.lock(keys.into_iter().flatten()).await;
            if self.read().lookup(uid, auth)?.parent_key() == parent {
                return Ok(guard);
            }
            tracing::debug!("parent of {} changed while locking, retrying", uid);
        }
    }

    /// Replace the access policy of a tenant
    pub fn set_policy(&self, tenant: &str, policy: TenantPolicy) {
        tracing::info!("setting access policy for tenant {}", tenant);
        self.write().policies.insert(tenant.to_string(), policy);
    }

    pub fn policy(&self, tenant: &str) -> TenantPolicy {
        self.read().policy(tenant).clone()
    }

    /// Configure the capacity of a tenant
    pub fn set_quota(&self, tenant: &str, total: u64) {
        tracing::info!("setting quota for tenant {} to {} bytes", tenant, total);
        self.inner.quotas.set_total(tenant, total);
    }

    /// Usage report for `tenant`; callers may only look at their own tenant
    pub async fn storage_usage(
        &self,
        tenant: &str,
        auth: &AuthContext,
    ) -> Result<StorageUsage, EngineError> {
        if tenant != auth.tenant {
            return Err(EngineError::PermissionDenied {
                user: auth.user.clone(),
                permission: Permission::Read,
                resource: format!("usage of tenant {tenant}"),
            });
        }
        Ok(self.inner.quotas.usage(tenant))
    }

    /// Drop content blobs nothing references any more.
    ///
    /// Runs at the end of every sync pass; returns how many were dropped.
    pub fn collect_garbage(&self) -> usize {
        let collected = self.write().content.collect();
        if !collected.is_empty() {
            tracing::debug!("collected {} unreferenced blobs", collected.len());
        }
        collected.len()
    }

    /// Hashes of every blob held in memory, referenced or not
    pub fn held_content(&self) -> BTreeSet<ContentHash> {
        self.read().content.hashes().copied().collect()
    }

    /// Tenants that hold nodes
    pub fn tenants(&self) -> Vec<String> {
        self.read().tree.tenants().into_iter().collect()
    }

    /// Number of blobs held, referenced or not
    pub fn blob_count(&self) -> usize {
        self.read().content.len()
    }
}
