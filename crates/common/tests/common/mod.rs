//! Shared test utilities for engine integration tests
#![allow(dead_code)]

use bytes::Bytes;
use common::auth::AuthContext;
use common::tree::Engine;
use common::uid::Uid;

pub const TENANT: &str = "default";
pub const ADMIN: &str = "root";

/// Set up an engine with default quotas and the caller everything is created as
pub fn setup_test_env() -> (Engine, AuthContext) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    (Engine::default(), AuthContext::new(ADMIN, TENANT))
}

/// Another caller in the same tenant
pub fn user(name: &str) -> AuthContext {
    AuthContext::new(name, TENANT)
}

/// Touch a file and give it one version
pub async fn write_file(
    engine: &Engine,
    parent: Option<Uid>,
    name: &str,
    data: &'static [u8],
    auth: &AuthContext,
) -> Uid {
    let uid = engine.touch(parent, name, auth).await.unwrap();
    engine
        .put_file(uid, Bytes::from_static(data), auth)
        .await
        .unwrap();
    uid
}

pub async fn names(engine: &Engine, dir: Option<Uid>, auth: &AuthContext) -> Vec<String> {
    engine
        .list_directory(dir, auth)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect()
}
