use bytes::Bytes;
use chrono::Utc;

use crate::acl::Permission;
use crate::auth::AuthContext;
use crate::content::ContentHash;
use crate::error::EngineError;
use crate::uid::Uid;
use crate::version::{now_micros, Version, VersionStamp};

use super::engine::{Engine, EngineState};
use super::node::{Node, NodeKey};

impl EngineState {
    fn lookup_file(&self, uid: Uid, auth: &AuthContext) -> Result<&Node, EngineError> {
        let node = self.lookup_live(uid, auth)?;
        if node.is_dir() {
            return Err(EngineError::InvalidArgument(format!("{uid} is a directory")));
        }
        Ok(node)
    }

    /// Append a version whose content reference is already held
    fn append_version(
        &mut self,
        uid: Uid,
        content: ContentHash,
        size: u64,
        metadata: crate::metadata::MetadataMap,
        auth: &AuthContext,
    ) -> Result<VersionStamp, EngineError> {
        let history = self.ledger.history_mut(uid);
        let timestamp = history.next_stamp(now_micros());
        let stamp = history.append(Version {
            timestamp,
            content,
            size,
            metadata,
            created_by: auth.user.clone(),
        })?;
        if let Some(node) = self.tree.get_mut(&uid) {
            node.modified_at = Utc::now();
        }
        Ok(stamp)
    }

    fn read_version(
        &self,
        uid: Uid,
        timestamp: Option<VersionStamp>,
        auth: &AuthContext,
    ) -> Result<Option<&Version>, EngineError> {
        let node = self.lookup_file(uid, auth)?;
        self.authorize(Some(node), Permission::Read, auth)?;

        let history = self.ledger.history(&uid);
        let current = history.and_then(|h| h.current());
        let Some(timestamp) = timestamp else {
            return Ok(current);
        };
        if current.map(|v| v.timestamp) != Some(timestamp) {
            self.authorize(Some(node), Permission::RetrieveBackVersion, auth)?;
        }
        history
            .and_then(|h| h.find(timestamp))
            .map(Some)
            .ok_or_else(|| EngineError::not_found(format!("version {timestamp} of {uid}")))
    }

    fn content_of(&self, version: Option<&Version>) -> Result<Bytes, EngineError> {
        let Some(version) = version else {
            return Ok(Bytes::new());
        };
        self.content.get(&version.content).ok_or_else(|| {
            EngineError::Internal(format!("content {} is missing", version.content))
        })
    }
}

impl Engine {
    /// Store `data` as the new current version of a file
    pub async fn put_file(
        &self,
        uid: Uid,
        data: Bytes,
        auth: &AuthContext,
    ) -> Result<VersionStamp, EngineError> {
        let _guard = self.lock([NodeKey::Node(uid)]).await;
        let mut guard = self.write();
        let state = &mut *guard;

        let node = state.lookup_file(uid, auth)?;
        state.authorize(Some(node), Permission::Write, auth)?;

        let size = data.len() as u64;
        let delta = size as i64 - state.ledger.size(&uid) as i64;
        self.quotas().record_delta(&auth.tenant, delta)?;

        let hash = state.content.retain(data);
        let metadata = state.metadata.all(&uid);
        match state.append_version(uid, hash, size, metadata, auth) {
            Ok(stamp) => {
                tracing::debug!("put {} bytes to {} as version {}", size, uid, stamp);
                Ok(stamp)
            }
            Err(err) => {
                state.content.release(&hash);
                self.refund(&auth.tenant, delta);
                Err(err)
            }
        }
    }

    /// Read the current version, or the one stamped `timestamp`
    pub async fn get_file(
        &self,
        uid: Uid,
        timestamp: Option<VersionStamp>,
        auth: &AuthContext,
    ) -> Result<Bytes, EngineError> {
        let state = self.read();
        let version = state.read_version(uid, timestamp, auth)?;
        state.content_of(version)
    }

    pub async fn get_version(
        &self,
        uid: Uid,
        timestamp: VersionStamp,
        auth: &AuthContext,
    ) -> Result<Bytes, EngineError> {
        self.get_file(uid, Some(timestamp), auth).await
    }

    /// Stamps of every retained version, oldest first
    pub async fn list_versions(
        &self,
        uid: Uid,
        auth: &AuthContext,
    ) -> Result<Vec<VersionStamp>, EngineError> {
        let state = self.read();
        let node = state.lookup_file(uid, auth)?;
        state.authorize(Some(node), Permission::ViewVersions, auth)?;
        Ok(state
            .ledger
            .history(&uid)
            .map(|history| history.timestamps())
            .unwrap_or_default())
    }

    /// Append a new version carrying the content and metadata of an old one
    pub async fn restore_to_version(
        &self,
        uid: Uid,
        timestamp: VersionStamp,
        auth: &AuthContext,
    ) -> Result<VersionStamp, EngineError> {
        let _guard = self.lock([NodeKey::Node(uid)]).await;
        let mut guard = self.write();
        let state = &mut *guard;

        let node = state.lookup_file(uid, auth)?;
        state.authorize(Some(node), Permission::RestoreToVersion, auth)?;
        let target = state
            .ledger
            .history(&uid)
            .and_then(|history| history.find(timestamp))
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("version {timestamp} of {uid}")))?;

        let delta = target.size as i64 - state.ledger.size(&uid) as i64;
        self.quotas().record_delta(&auth.tenant, delta)?;

        if !state.content.retain_existing(&target.content) {
            self.refund(&auth.tenant, delta);
            return Err(EngineError::Internal(format!(
                "content {} is missing",
                target.content
            )));
        }
        match state.append_version(uid, target.content, target.size, target.metadata, auth) {
            Ok(stamp) => {
                tracing::debug!("restored {} to {} as version {}", uid, timestamp, stamp);
                Ok(stamp)
            }
            Err(err) => {
                state.content.release(&target.content);
                self.refund(&auth.tenant, delta);
                Err(err)
            }
        }
    }

    /// Drop all but the `keep` most recent versions of a file.
    ///
    /// The current version always survives, so used space does not change.
    /// Returns how many versions were dropped.
    pub async fn purge_old_versions(
        &self,
        uid: Uid,
        keep: usize,
        auth: &AuthContext,
    ) -> Result<usize, EngineError> {
        let _guard = self.lock([NodeKey::Node(uid)]).await;
        let mut guard = self.write();
        let state = &mut *guard;

        let node = state.lookup_file(uid, auth)?;
        state.authorize(Some(node), Permission::Delete, auth)?;
        if keep == 0 && state.ledger.count(&uid) > 0 {
            return Err(EngineError::InvalidArgument(
                "keep count must be at least 1".to_string(),
            ));
        }

        let dropped = state.ledger.history_mut(uid).retain_latest(keep);
        for version in &dropped {
            state.content.release(&version.content);
        }
        tracing::debug!("purged {} old versions of {}", dropped.len(), uid);
        Ok(dropped.len())
    }

    fn refund(&self, tenant: &str, delta: i64) {
        if let Err(err) = self.quotas().record_delta(tenant, -delta) {
            tracing::warn!("failed to refund {} bytes to {}: {}", delta, tenant, err);
        }
    }
}
