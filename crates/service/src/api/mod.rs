//! Request surface of the file service.
//!
//! Every call takes a request record carrying the caller's [`AuthContext`]
//! and answers with a [`Response`]: `success`, and either an `error` message
//! with its [`ErrorKind`] or the call's payload. Failures never escape as
//! `Err`; the transport in front of this only has to serialize the record.
//!
//! [`AuthContext`]: common::auth::AuthContext

mod access;
mod files;
pub mod messages;
mod namespace;
mod uploads;
pub mod wire;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use common::acl::{Permission, UnknownPermission};
use common::error::{EngineError, ErrorKind};
use common::tree::Engine;
use common::uid::Uid;

use crate::ServiceState;

pub use uploads::{UploadError, Uploads, DEFAULT_UPLOAD_TIMEOUT};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
}

impl<T> Response<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            success: true,
            error: None,
            kind: None,
            payload: Some(payload),
        }
    }

    pub fn failed(error: &ApiError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            kind: Some(error.kind()),
            payload: None,
        }
    }
}

impl Response<()> {
    pub fn done() -> Self {
        Self::ok(())
    }
}

impl<T> From<Result<T, ApiError>> for Response<T> {
    fn from(result: Result<T, ApiError>) -> Self {
        match result {
            Ok(payload) => Response::ok(payload),
            Err(e) => {
                match e.kind() {
                    ErrorKind::Internal => tracing::error!("request failed: {}", e),
                    _ => tracing::debug!("request failed: {}", e),
                }
                Response::failed(&e)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Engine(#[from] EngineError),
    #[error("invalid uid: {0:?}")]
    InvalidUid(String),
    #[error("{0}")]
    Permission(#[from] UnknownPermission),
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Engine(e) => e.kind(),
            ApiError::Upload(UploadError::TooLarge { .. }) => ErrorKind::ResourceExhausted,
            _ => ErrorKind::InvalidArgument,
        }
    }
}

/// Parse a uid that must name a node
pub(crate) fn parse_uid(raw: &str) -> Result<Uid, ApiError> {
    Uid::from_str(raw.trim()).map_err(|_| ApiError::InvalidUid(raw.to_string()))
}

/// Parse a uid where `""` stands for the tenant root
pub(crate) fn parse_parent(raw: &str) -> Result<Option<Uid>, ApiError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    parse_uid(raw).map(Some)
}

pub(crate) fn parse_permission(raw: i64) -> Result<Permission, ApiError> {
    Ok(Permission::try_from(raw)?)
}

/// The engine behind a request surface, plus in-flight chunked uploads
#[derive(Debug, Clone)]
pub struct FileService {
    state: ServiceState,
    uploads: Arc<Uploads>,
}

impl FileService {
    pub fn new(state: ServiceState) -> Self {
        Self::with_upload_timeout(state, DEFAULT_UPLOAD_TIMEOUT)
    }

    /// Unfinished chunked uploads idle for longer than `timeout` are dropped
    pub fn with_upload_timeout(state: ServiceState, timeout: Duration) -> Self {
        Self {
            state,
            uploads: Arc::new(Uploads::with_timeout(timeout)),
        }
    }

    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    fn engine(&self) -> &Engine {
        self.state.engine()
    }
}
