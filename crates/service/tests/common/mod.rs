//! Shared test utilities for service integration tests
#![allow(dead_code)]

use std::path::Path;

use bytes::Bytes;
use common::auth::AuthContext;
use common::sync::SyncJobs;
use service::api::messages::{PutFileRequest, TouchRequest};
use service::{Config, FileService, ServiceState};

pub const TENANT: &str = "default";

/// Config persisting under `dir`, otherwise defaults
pub fn test_config(dir: &Path) -> Config {
    Config {
        snapshot_path: Some(dir.to_path_buf()),
        ..Config::default()
    }
}

/// Build a service over a fresh snapshot directory.
///
/// The sync queue is handed back undrained; tests that want passes to run
/// spawn a worker on it themselves.
pub async fn setup_test_service(dir: &Path) -> (FileService, SyncJobs) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let (state, jobs) = ServiceState::from_config(&test_config(dir))
        .await
        .unwrap();
    (FileService::new(state), jobs)
}

pub fn user(name: &str) -> AuthContext {
    AuthContext::new(name, TENANT)
}

/// Touch a file under `parent` and store `data` as its only version
pub async fn write_file(
    service: &FileService,
    parent: &str,
    name: &str,
    data: &'static [u8],
    auth: &AuthContext,
) -> String {
    let touched = service
        .touch(TouchRequest {
            parent_uid: parent.to_string(),
            name: name.to_string(),
            auth: auth.clone(),
        })
        .await;
    let uid = touched.payload.unwrap().uid;

    let put = service
        .put_file(PutFileRequest {
            uid: uid.clone(),
            auth: auth.clone(),
            data: Bytes::from_static(data),
            chunk_index: None,
            total_chunks: None,
        })
        .await;
    assert!(put.success, "{:?}", put.error);
    uid
}
