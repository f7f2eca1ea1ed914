//! # Access control
//!
//! Permissions are granted per `(resource, principal)` pair, where a
//! principal is either a user name or a role name. Grants and revokes are
//! plain set union / set difference over a [`PermissionSet`] bitmask, so both
//! are idempotent.
//!
//! ## Check order
//!
//! [`AclTable::decide`] walks the sources below and stops at the first one
//! holding the required permission:
//!
//! 1. an explicit grant to `auth.user` on the exact resource
//! 2. an explicit grant to any of `auth.roles` on the exact resource
//! 3. the tenant-wide [`TenantPolicy`] (administrators, owner, default set)
//!
//! Anything else is denied. Checks never mutate state.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::auth::AuthContext;
use crate::uid::Uid;

/// The nine kinds of permission a principal may hold.
///
/// Discriminants match the numbering used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Permission {
    Read = 0,
    Write = 1,
    Delete = 2,
    ListDeleted = 3,
    Undelete = 4,
    ViewVersions = 5,
    RetrieveBackVersion = 6,
    RestoreToVersion = 7,
    Execute = 8,
}

impl Permission {
    pub const ALL: [Permission; 9] = [
        Permission::Read,
        Permission::Write,
        Permission::Delete,
        Permission::ListDeleted,
        Permission::Undelete,
        Permission::ViewVersions,
        Permission::RetrieveBackVersion,
        Permission::RestoreToVersion,
        Permission::Execute,
    ];

    fn bit(self) -> u16 {
        1 << (self as u8)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Permission::Read => "READ",
            Permission::Write => "WRITE",
            Permission::Delete => "DELETE",
            Permission::ListDeleted => "LIST_DELETED",
            Permission::Undelete => "UNDELETE",
            Permission::ViewVersions => "VIEW_VERSIONS",
            Permission::RetrieveBackVersion => "RETRIEVE_BACK_VERSION",
            Permission::RestoreToVersion => "RESTORE_TO_VERSION",
            Permission::Execute => "EXECUTE",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown permission: {0}")]
pub struct UnknownPermission(pub i64);

impl TryFrom<i64> for Permission {
    type Error = UnknownPermission;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| *p as i64 == value)
            .ok_or(UnknownPermission(value))
    }
}

/// Bitmask over [`Permission`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(u16);

impl PermissionSet {
    pub const fn empty() -> Self {
        PermissionSet(0)
    }

    pub fn all() -> Self {
        Permission::ALL.iter().copied().collect()
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0 & permission.bit() != 0
    }

    /// Returns true if the bit was not already set
    pub fn insert(&mut self, permission: Permission) -> bool {
        let before = self.0;
        self.0 |= permission.bit();
        before != self.0
    }

    /// Returns true if the bit was set
    pub fn remove(&mut self, permission: Permission) -> bool {
        let before = self.0;
        self.0 &= !permission.bit();
        before != self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u16 {
        self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        Permission::ALL
            .iter()
            .copied()
            .filter(move |p| self.contains(*p))
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        let mut set = PermissionSet::empty();
        for permission in iter {
            set.insert(permission);
        }
        set
    }
}

/// Tenant-wide fallback consulted after explicit grants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantPolicy {
    /// Users holding every permission on every resource of the tenant
    #[serde(default)]
    pub admins: BTreeSet<String>,
    /// Roles holding every permission on every resource of the tenant
    #[serde(default)]
    pub admin_roles: BTreeSet<String>,
    /// What a resource's owner holds on it
    pub owner: PermissionSet,
    /// What everybody else in the tenant holds
    pub default: PermissionSet,
    /// What tenant members hold on the (virtual) tenant root
    pub root: PermissionSet,
}

impl Default for TenantPolicy {
    fn default() -> Self {
        Self {
            admins: BTreeSet::new(),
            admin_roles: BTreeSet::new(),
            owner: PermissionSet::all(),
            default: PermissionSet::empty(),
            root: [Permission::Read, Permission::Write].into_iter().collect(),
        }
    }
}

impl TenantPolicy {
    pub fn is_admin(&self, auth: &AuthContext) -> bool {
        self.admins.contains(&auth.user) || auth.roles.iter().any(|r| self.admin_roles.contains(r))
    }
}

/// Where an allow decision came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    UserGrant,
    RoleGrant(String),
    Admin,
    Owner,
    TenantDefault,
    Denied,
}

impl Decision {
    pub fn allows(&self) -> bool {
        !matches!(self, Decision::Denied)
    }
}

/// A single row of the ACL table, used for snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    pub resource: Uid,
    pub principal: String,
    pub permissions: PermissionSet,
}

/// Explicit grants keyed by `(resource, principal)`
#[derive(Debug, Clone, Default)]
pub struct AclTable {
    entries: BTreeMap<(Uid, String), PermissionSet>,
}

impl AclTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, resource: Uid, principal: &str, permission: Permission) -> bool {
        self.entries
            .entry((resource, principal.to_string()))
            .or_default()
            .insert(permission)
    }

    pub fn revoke(&mut self, resource: Uid, principal: &str, permission: Permission) -> bool {
        let key = (resource, principal.to_string());
        let Some(set) = self.entries.get_mut(&key) else {
            return false;
        };
        let changed = set.remove(permission);
        if set.is_empty() {
            self.entries.remove(&key);
        }
        changed
    }

    pub fn get(&self, resource: Uid, principal: &str) -> PermissionSet {
        self.entries
            .get(&(resource, principal.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Drop every grant on a resource (used when it is purged)
    pub fn remove_resource(&mut self, resource: Uid) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(uid, _), _| *uid != resource);
        before - self.entries.len()
    }

    pub fn entries_for(&self, resource: Uid) -> Vec<AclEntry> {
        self.entries
            .iter()
            .filter(|((uid, _), _)| *uid == resource)
            .map(|((uid, principal), permissions)| AclEntry {
                resource: *uid,
                principal: principal.clone(),
                permissions: *permissions,
            })
            .collect()
    }

    pub fn insert_entry(&mut self, entry: AclEntry) {
        if entry.permissions.is_empty() {
            return;
        }
        self.entries
            .insert((entry.resource, entry.principal), entry.permissions);
    }

    /// Evaluate whether `auth` holds `required` on `resource`.
    ///
    /// `resource` is `None` for the tenant root, which carries no explicit
    /// grants. `owner` is the resource owner, if any.
    pub fn decide(
        &self,
        resource: Option<Uid>,
        owner: Option<&str>,
        required: Permission,
        auth: &AuthContext,
        policy: &TenantPolicy,
    ) -> Decision {
        if let Some(uid) = resource {
            if self.get(uid, &auth.user).contains(required) {
                return Decision::UserGrant;
            }
            if let Some(role) = auth
                .roles
                .iter()
                .find(|role| self.get(uid, role).contains(required))
            {
                return Decision::RoleGrant(role.clone());
            }
        }

        if policy.is_admin(auth) {
            return Decision::Admin;
        }

        match resource {
            None if policy.root.contains(required) => Decision::TenantDefault,
            None => Decision::Denied,
            Some(_) if owner == Some(auth.user.as_str()) && policy.owner.contains(required) => {
                Decision::Owner
            }
            Some(_) if policy.default.contains(required) => Decision::TenantDefault,
            Some(_) => Decision::Denied,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
