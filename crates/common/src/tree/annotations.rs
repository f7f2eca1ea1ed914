//! Metadata and ACL operations on nodes

use crate::acl::{Permission, PermissionSet};
use crate::auth::AuthContext;
use crate::error::EngineError;
use crate::metadata::{validate_key, MetadataMap};
use crate::uid::Uid;
use crate::version::{Version, VersionStamp};

use super::engine::{Engine, EngineState};
use super::node::NodeKey;

impl EngineState {
    fn version_of(
        &self,
        uid: Uid,
        timestamp: VersionStamp,
        auth: &AuthContext,
    ) -> Result<&Version, EngineError> {
        let node = self.lookup(uid, auth)?;
        self.authorize(Some(node), Permission::Read, auth)?;
        self.ledger
            .history(&uid)
            .and_then(|history| history.find(timestamp))
            .ok_or_else(|| EngineError::not_found(format!("version {timestamp} of {uid}")))
    }
}

fn validate_principal(principal: &str) -> Result<(), EngineError> {
    if principal.is_empty() {
        return Err(EngineError::InvalidArgument(
            "principal must not be empty".to_string(),
        ));
    }
    Ok(())
}

impl Engine {
    pub async fn set_metadata(
        &self,
        uid: Uid,
        key: &str,
        value: &str,
        auth: &AuthContext,
    ) -> Result<(), EngineError> {
        validate_key(key)?;
        let _guard = self.lock([NodeKey::Node(uid)]).await;
        let mut state = self.write();
        let node = state.lookup_live(uid, auth)?;
        state.authorize(Some(node), Permission::Write, auth)?;
        state
            .metadata
            .set(uid, key.to_string(), value.to_string());
        tracing::debug!("set metadata {} on {}", key, uid);
        Ok(())
    }

    pub async fn get_metadata(
        &self,
        uid: Uid,
        key: &str,
        auth: &AuthContext,
    ) -> Result<String, EngineError> {
        validate_key(key)?;
        let state = self.read();
        let node = state.lookup(uid, auth)?;
        state.authorize(Some(node), Permission::Read, auth)?;
        state
            .metadata
            .get(&uid, key)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("metadata key {key} on {uid}")))
    }

    pub async fn get_all_metadata(
        &self,
        uid: Uid,
        auth: &AuthContext,
    ) -> Result<MetadataMap, EngineError> {
        let state = self.read();
        let node = state.lookup(uid, auth)?;
        state.authorize(Some(node), Permission::Read, auth)?;
        Ok(state.metadata.all(&uid))
    }

    pub async fn delete_metadata(
        &self,
        uid: Uid,
        key: &str,
        auth: &AuthContext,
    ) -> Result<(), EngineError> {
        validate_key(key)?;
        let _guard = self.lock([NodeKey::Node(uid)]).await;
        let mut state = self.write();
        let node = state.lookup_live(uid, auth)?;
        state.authorize(Some(node), Permission::Write, auth)?;
        state
            .metadata
            .delete(&uid, key)
            .ok_or_else(|| EngineError::not_found(format!("metadata key {key} on {uid}")))?;
        tracing::debug!("deleted metadata {} on {}", key, uid);
        Ok(())
    }

    /// Read a key from the snapshot taken when a version was appended
    pub async fn get_metadata_for_version(
        &self,
        uid: Uid,
        timestamp: VersionStamp,
        key: &str,
        auth: &AuthContext,
    ) -> Result<String, EngineError> {
        validate_key(key)?;
        let state = self.read();
        let version = state.version_of(uid, timestamp, auth)?;
        version.metadata.get(key).cloned().ok_or_else(|| {
            EngineError::not_found(format!("metadata key {key} on version {timestamp}"))
        })
    }

    pub async fn get_all_metadata_for_version(
        &self,
        uid: Uid,
        timestamp: VersionStamp,
        auth: &AuthContext,
    ) -> Result<MetadataMap, EngineError> {
        let state = self.read();
        Ok(state.version_of(uid, timestamp, auth)?.metadata.clone())
    }

    /// Add `permission` to what `principal` holds on `resource`.
    ///
    /// Granting something already held is a no-op.
    pub async fn grant_permission(
        &self,
        resource: Uid,
        principal: &str,
        permission: Permission,
        auth: &AuthContext,
    ) -> Result<(), EngineError> {
        validate_principal(principal)?;
        let _guard = self.lock([NodeKey::Node(resource)]).await;
        let mut state = self.write();
        let node = state.lookup(resource, auth)?;
        state.authorize(Some(node), Permission::Write, auth)?;
        if state.acl.grant(resource, principal, permission) {
            tracing::debug!("granted {} on {} to {}", permission, resource, principal);
        }
        Ok(())
    }

    pub async fn revoke_permission(
        &self,
        resource: Uid,
        principal: &str,
        permission: Permission,
        auth: &AuthContext,
    ) -> Result<(), EngineError> {
        validate_principal(principal)?;
        let _guard = self.lock([NodeKey::Node(resource)]).await;
        let mut state = self.write();
        let node = state.lookup(resource, auth)?;
        state.authorize(Some(node), Permission::Write, auth)?;
        if state.acl.revoke(resource, principal, permission) {
            tracing::debug!("revoked {} on {} from {}", permission, resource, principal);
        }
        Ok(())
    }

    /// Whether `auth` holds `required` on `resource` (`None` for the tenant root)
    pub async fn check_permission(
        &self,
        resource: Option<Uid>,
        required: Permission,
        auth: &AuthContext,
    ) -> Result<bool, EngineError> {
        let state = self.read();
        let node = match resource {
            Some(uid) => Some(state.lookup(uid, auth)?),
            None => None,
        };
        Ok(state.authorize(node, required, auth).is_ok())
    }

    /// Explicit grants held by `principal` on `resource`
    pub async fn explicit_permissions(
        &self,
        resource: Uid,
        principal: &str,
        auth: &AuthContext,
    ) -> Result<PermissionSet, EngineError> {
        let state = self.read();
        let node = state.lookup(resource, auth)?;
        state.authorize(Some(node), Permission::Read, auth)?;
        Ok(state.acl.get(resource, principal))
    }
}
