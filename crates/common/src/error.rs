//! Engine error taxonomy
//!
//! Every public engine operation returns `Result<T, EngineError>`. Each
//! variant maps onto exactly one [`ErrorKind`], which is what callers on the
//! far side of the service boundary get to see alongside the message.

use serde::{Deserialize, Serialize};

use crate::acl::Permission;

/// Coarse classification of an engine failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    PermissionDenied,
    InvalidArgument,
    Conflict,
    ResourceExhausted,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorKind::Internal => "INTERNAL",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Resource, version or metadata key is absent
    #[error("not found: {0}")]
    NotFound(String),
    /// A live sibling already holds the name
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("permission denied: {user} lacks {permission} on {resource}")]
    PermissionDenied {
        user: String,
        permission: Permission,
        resource: String,
    },
    /// Cyclic move, self-move, malformed names or retention counts
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Non-empty directory removal, undelete name collision
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("quota exceeded for tenant {tenant}: used={used}, increase={increase}, total={total}")]
    ResourceExhausted {
        tenant: String,
        used: u64,
        increase: u64,
        total: u64,
    },
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            EngineError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            EngineError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        EngineError::NotFound(what.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = EngineError::not_found("node 1234");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "not found: node 1234");

        let err = EngineError::PermissionDenied {
            user: "bob".to_string(),
            permission: Permission::Write,
            resource: "abc".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);
        assert_eq!(err.to_string(), "permission denied: bob lacks WRITE on abc");
    }
}
