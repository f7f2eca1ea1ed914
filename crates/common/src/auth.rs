use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Authorization context carried by every engine call.
///
/// Passed explicitly as a parameter; the engine never stores it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// The calling user
    pub user: String,
    /// Roles the caller holds, matched against role grants
    #[serde(default)]
    pub roles: Vec<String>,
    /// Tenant the request is scoped to
    pub tenant: String,
    /// Free-form claims forwarded by the transport
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
}

impl AuthContext {
    pub fn new(user: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            roles: Vec::new(),
            tenant: tenant.into(),
            claims: BTreeMap::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(key.into(), value.into());
        self
    }
}
