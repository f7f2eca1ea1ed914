use chrono::Utc;

use crate::acl::Permission;
use crate::auth::AuthContext;
use crate::error::EngineError;
use crate::uid::Uid;
use crate::version::{now_micros, Version, VersionHistory};

use super::engine::{parent_key, Engine, EngineState};
use super::entry::{DirectoryEntry, FileInfo};
use super::node::{
    validate_name, Node, NodeKey, NodeState, NodeType, DEFAULT_DIRECTORY_MODE, DEFAULT_FILE_MODE,
};

impl EngineState {
    fn touch_modified(&mut self, uid: Option<Uid>) {
        if let Some(node) = uid.and_then(|uid| self.tree.get_mut(&uid)) {
            node.modified_at = Utc::now();
        }
    }

    fn create(
        &mut self,
        parent: Option<Uid>,
        name: &str,
        node_type: NodeType,
        mode: u32,
        auth: &AuthContext,
    ) -> Result<Uid, EngineError> {
        let parent_node = self.lookup_dir(parent, auth)?;
        self.authorize(parent_node, Permission::Write, auth)?;

        let key = parent_key(parent, auth);
        if self.tree.live_child_named(&key, name).is_some() {
            return Err(EngineError::AlreadyExists(format!("{name} in {key}")));
        }

        let now = Utc::now();
        let uid = self.uids.allocate();
        self.tree.insert(Node {
            uid,
            parent,
            name: name.to_string(),
            node_type,
            tenant: auth.tenant.clone(),
            owner: auth.user.clone(),
            mode,
            created_at: now,
            modified_at: now,
            state: NodeState::Live,
        });
        self.touch_modified(parent);
        Ok(uid)
    }

    fn soft_delete(&mut self, uid: Uid, directory: bool, auth: &AuthContext) -> Result<(), EngineError> {
        let node = self.lookup_live(uid, auth)?;
        match (directory, node.is_dir()) {
            (true, false) => {
                return Err(EngineError::InvalidArgument(format!("{uid} is not a directory")))
            }
            (false, true) => return Err(EngineError::InvalidArgument(format!("{uid} is a directory"))),
            _ => {}
        }
        self.authorize(Some(node), Permission::Delete, auth)?;
        if directory && self.tree.has_live_children(&NodeKey::Node(uid)) {
            return Err(EngineError::Conflict(format!("directory {uid} is not empty")));
        }

        let parent = node.parent;
        if let Some(node) = self.tree.get_mut(&uid) {
            node.state = NodeState::Deleted { at: Utc::now() };
        }
        self.touch_modified(parent);
        Ok(())
    }

    fn list(
        &self,
        uid: Option<Uid>,
        with_deleted: bool,
        auth: &AuthContext,
    ) -> Result<Vec<DirectoryEntry>, EngineError> {
        let dir = match uid {
            Some(uid) if with_deleted => {
                let node = self.lookup(uid, auth)?;
                if !node.is_dir() {
                    return Err(EngineError::not_found(format!("directory {uid}")));
                }
                Some(node)
            }
            _ => self.lookup_dir(uid, auth)?,
        };
        let permission = if with_deleted {
            Permission::ListDeleted
        } else {
            Permission::Read
        };
        self.authorize(dir, permission, auth)?;

        let mut entries: Vec<DirectoryEntry> = self
            .tree
            .children(&parent_key(uid, auth))
            .filter(|child| with_deleted || child.is_live())
            .map(|child| DirectoryEntry::describe(child, &self.ledger))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name).then(a.uid.cmp(&b.uid)));
        Ok(entries)
    }

    fn purge_subtree(&mut self, uid: Uid, auth: &AuthContext) -> Result<u64, EngineError> {
        let node = self.lookup(uid, auth)?;
        if node.is_live() {
            return Err(EngineError::Conflict(format!(
                "{uid} is live; remove it before purging"
            )));
        }
        self.authorize(Some(node), Permission::Delete, auth)?;

        let now = Utc::now();
        let mut freed = 0;
        for target in self.tree.subtree(uid) {
            if let Some(history) = self.ledger.remove(&target) {
                freed += history.size();
                for version in history.versions() {
                    self.content.release(&version.content);
                }
            }
            self.metadata.remove_node(&target);
            self.acl.remove_resource(target);
            self.tree.mark_purged(target, now);
        }
        Ok(freed)
    }
}

impl Engine {
    async fn create(
        &self,
        parent: Option<Uid>,
        name: &str,
        node_type: NodeType,
        mode: u32,
        auth: &AuthContext,
    ) -> Result<Uid, EngineError> {
        validate_name(name)?;
        let _guard = self.lock([parent_key(parent, auth)]).await;
        let uid = self.write().create(parent, name, node_type, mode, auth)?;
        tracing::debug!("created {:?} {} as {} for {}", node_type, name, uid, auth.user);
        Ok(uid)
    }

    /// Create a directory under `parent` (`None` for the tenant root)
    pub async fn make_directory(
        &self,
        parent: Option<Uid>,
        name: &str,
        auth: &AuthContext,
        mode: Option<u32>,
    ) -> Result<Uid, EngineError> {
        let mode = mode.unwrap_or(DEFAULT_DIRECTORY_MODE);
        self.create(parent, name, NodeType::Directory, mode, auth)
            .await
    }

    /// Create an empty file with no versions
    pub async fn touch(
        &self,
        parent: Option<Uid>,
        name: &str,
        auth: &AuthContext,
    ) -> Result<Uid, EngineError> {
        self.create(parent, name, NodeType::RegularFile, DEFAULT_FILE_MODE, auth)
            .await
    }

    /// Soft-delete an empty directory
    pub async fn remove_directory(&self, uid: Uid, auth: &AuthContext) -> Result<(), EngineError> {
        let _guard = self.lock_with_parent(uid, None, auth).await?;
        self.write().soft_delete(uid, true, auth)?;
        tracing::debug!("removed directory {}", uid);
        Ok(())
    }

    /// Soft-delete a file
    pub async fn remove_file(&self, uid: Uid, auth: &AuthContext) -> Result<(), EngineError> {
        let _guard = self.lock_with_parent(uid, None, auth).await?;
        self.write().soft_delete(uid, false, auth)?;
        tracing::debug!("removed file {}", uid);
        Ok(())
    }

    /// Bring a soft-deleted node back under its old name
    pub async fn undelete_file(&self, uid: Uid, auth: &AuthContext) -> Result<(), EngineError> {
        let _guard = self.lock_with_parent(uid, None, auth).await?;
        let mut state = self.write();

        let node = state.lookup(uid, auth)?;
        state.authorize(Some(node), Permission::Undelete, auth)?;
        if node.is_live() {
            return Ok(());
        }
        if let Some(parent) = state.parent_of(node) {
            if !parent.is_live() {
                return Err(EngineError::Conflict(format!(
                    "parent {} of {} is deleted",
                    parent.uid, uid
                )));
            }
        }
        if state
            .tree
            .live_child_named(&node.parent_key(), &node.name)
            .is_some()
        {
            return Err(EngineError::Conflict(format!(
                "a live node named {} already exists",
                node.name
            )));
        }

        let parent = node.parent;
        if let Some(node) = state.tree.get_mut(&uid) {
            node.state = NodeState::Live;
        }
        state.touch_modified(parent);
        tracing::debug!("undeleted {}", uid);
        Ok(())
    }

    pub async fn list_directory(
        &self,
        uid: Option<Uid>,
        auth: &AuthContext,
    ) -> Result<Vec<DirectoryEntry>, EngineError> {
        self.read().list(uid, false, auth)
    }

    /// Listing that also shows soft-deleted children
    pub async fn list_directory_with_deleted(
        &self,
        uid: Option<Uid>,
        auth: &AuthContext,
    ) -> Result<Vec<DirectoryEntry>, EngineError> {
        self.read().list(uid, true, auth)
    }

    pub async fn rename(
        &self,
        uid: Uid,
        new_name: &str,
        auth: &AuthContext,
    ) -> Result<(), EngineError> {
        validate_name(new_name)?;
        let _guard = self.lock_with_parent(uid, None, auth).await?;
        let mut state = self.write();

        let node = state.lookup_live(uid, auth)?;
        state.authorize(state.parent_of(node), Permission::Write, auth)?;
        if node.name == new_name {
            return Ok(());
        }
        if state
            .tree
            .live_child_named(&node.parent_key(), new_name)
            .is_some()
        {
            return Err(EngineError::AlreadyExists(new_name.to_string()));
        }

        let parent = node.parent;
        if let Some(node) = state.tree.get_mut(&uid) {
            node.name = new_name.to_string();
            node.modified_at = Utc::now();
        }
        state.touch_modified(parent);
        tracing::debug!("renamed {} to {}", uid, new_name);
        Ok(())
    }

    /// Move `uid` under `destination` (`None` for the tenant root)
    pub async fn mv(
        &self,
        uid: Uid,
        destination: Option<Uid>,
        auth: &AuthContext,
    ) -> Result<(), EngineError> {
        if destination == Some(uid) {
            return Err(EngineError::InvalidArgument(format!(
                "cannot move {uid} into itself"
            )));
        }
        let dest_key = parent_key(destination, auth);
        let _guard = self
            .lock_with_parent(uid, Some(dest_key.clone()), auth)
            .await?;
        let mut state = self.write();

        let node = state.lookup_live(uid, auth)?;
        let dest = state.lookup_dir(destination, auth)?;
        if let Some(dest) = dest {
            if state.tree.is_within(dest.uid, uid) {
                return Err(EngineError::InvalidArgument(format!(
                    "cannot move {} into its own subtree {}",
                    uid, dest.uid
                )));
            }
        }
        state.authorize(state.parent_of(node), Permission::Write, auth)?;
        state.authorize(dest, Permission::Write, auth)?;

        if node.parent == destination {
            return Ok(());
        }
        if state.tree.live_child_named(&dest_key, &node.name).is_some() {
            return Err(EngineError::AlreadyExists(format!(
                "{} in {}",
                node.name, dest_key
            )));
        }

        let old_parent = node.parent;
        state.tree.reparent(uid, destination);
        state.touch_modified(old_parent);
        state.touch_modified(destination);
        tracing::debug!("moved {} from {:?} to {:?}", uid, old_parent, destination);
        Ok(())
    }

    /// Deep-copy the live state of `uid` under `destination`.
    ///
    /// Returns the uid of the new top-level node.
    pub async fn copy(
        &self,
        uid: Uid,
        destination: Option<Uid>,
        auth: &AuthContext,
    ) -> Result<Uid, EngineError> {
        let _guard = self.lock([parent_key(destination, auth)]).await;
        let mut guard = self.write();
        let state = &mut *guard;

        let source = state.lookup_live(uid, auth)?;
        state.authorize(Some(source), Permission::Read, auth)?;
        let dest = state.lookup_dir(destination, auth)?;
        if let Some(dest) = dest {
            if state.tree.is_within(dest.uid, uid) {
                return Err(EngineError::InvalidArgument(format!(
                    "cannot copy {} into its own subtree {}",
                    uid, dest.uid
                )));
            }
        }
        state.authorize(dest, Permission::Write, auth)?;
        let dest_key = parent_key(destination, auth);
        if state.tree.live_child_named(&dest_key, &source.name).is_some() {
            return Err(EngineError::AlreadyExists(format!(
                "{} in {}",
                source.name, dest_key
            )));
        }

        let plan = state.tree.live_subtree(uid);
        let mut bytes = 0;
        for old in &plan {
            if let Some(current) = state.ledger.history(old).and_then(|h| h.current()) {
                if state.content.refs(&current.content) == 0 {
                    return Err(EngineError::Internal(format!(
                        "content {} of {} is missing",
                        current.content, old
                    )));
                }
                bytes += current.size;
            }
        }
        self.quotas().record_delta(&auth.tenant, bytes as i64)?;

        let now = Utc::now();
        let mut mapped = std::collections::HashMap::with_capacity(plan.len());
        for old in &plan {
            let Some(original) = state.tree.get(old).cloned() else {
                continue;
            };
            let new_uid = state.uids.allocate();
            let parent = if *old == uid {
                destination
            } else {
                original.parent.and_then(|p| mapped.get(&p).copied())
            };
            mapped.insert(*old, new_uid);

            state.tree.insert(Node {
                uid: new_uid,
                parent,
                owner: auth.user.clone(),
                created_at: now,
                modified_at: now,
                state: NodeState::Live,
                ..original
            });
            let entries = state.metadata.all(old);
            state.metadata.replace(new_uid, entries);

            let current = state
                .ledger
                .history(old)
                .and_then(|history| history.current())
                .cloned();
            if let Some(current) = current {
                state.content.retain_existing(&current.content);
                let mut history = VersionHistory::new();
                let timestamp = history.next_stamp(now_micros());
                history.append(Version {
                    timestamp,
                    created_by: auth.user.clone(),
                    ..current
                })?;
                state.ledger.insert(new_uid, history);
            }
        }
        state.touch_modified(destination);

        let top = mapped
            .get(&uid)
            .copied()
            .ok_or_else(|| EngineError::Internal(format!("copy of {uid} produced nothing")))?;
        tracing::debug!("copied {} ({} nodes, {} bytes) to {}", uid, plan.len(), bytes, top);
        Ok(top)
    }

    pub async fn stat(&self, uid: Uid, auth: &AuthContext) -> Result<FileInfo, EngineError> {
        let state = self.read();
        let node = state.lookup(uid, auth)?;
        state.authorize(Some(node), Permission::Read, auth)?;
        Ok(FileInfo::describe(node, &state.ledger))
    }

    /// Whether `uid` names a live or soft-deleted node of the caller's tenant
    pub async fn exists(&self, uid: Uid, auth: &AuthContext) -> Result<bool, EngineError> {
        let state = self.read();
        let Ok(node) = state.lookup(uid, auth) else {
            return Ok(false);
        };
        state.authorize(Some(node), Permission::Read, auth)?;
        Ok(true)
    }

    /// Permanently destroy a soft-deleted node and everything below it
    pub async fn purge(&self, uid: Uid, auth: &AuthContext) -> Result<(), EngineError> {
        let _guard = self.lock_with_parent(uid, None, auth).await?;
        let mut state = self.write();
        let freed = state.purge_subtree(uid, auth)?;
        // usage moves inside the write section, like put and copy
        self.quotas().record_delta(&auth.tenant, -(freed as i64))?;
        drop(state);
        tracing::info!("purged {} freeing {} bytes", uid, freed);
        Ok(())
    }
}
