//! Integration tests for live and per-version metadata

mod common;

use bytes::Bytes;

use ::common::acl::Permission;
use ::common::error::EngineError;

#[tokio::test]
async fn test_live_metadata() {
    let (engine, auth) = common::setup_test_env();

    let file = engine.touch(None, "f", &auth).await.unwrap();
    engine.set_metadata(file, "author", "test_user", &auth).await.unwrap();
    engine.set_metadata(file, "tag", "a", &auth).await.unwrap();
    engine.set_metadata(file, "tag", "b", &auth).await.unwrap();

    assert_eq!(engine.get_metadata(file, "tag", &auth).await.unwrap(), "b");
    let all = engine.get_all_metadata(file, &auth).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all["author"], "test_user");

    engine.delete_metadata(file, "tag", &auth).await.unwrap();
    let result = engine.get_metadata(file, "tag", &auth).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
    let result = engine.delete_metadata(file, "tag", &auth).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));

    let result = engine.set_metadata(file, "", "x", &auth).await;
    assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_version_metadata_is_a_snapshot() {
    let (engine, auth) = common::setup_test_env();

    let file = engine.touch(None, "f", &auth).await.unwrap();
    engine.set_metadata(file, "status", "draft", &auth).await.unwrap();
    let v1 = engine.put_file(file, Bytes::from_static(b"1"), &auth).await.unwrap();
    engine.set_metadata(file, "status", "final", &auth).await.unwrap();
    let v2 = engine.put_file(file, Bytes::from_static(b"2"), &auth).await.unwrap();
    engine.delete_metadata(file, "status", &auth).await.unwrap();

    assert_eq!(
        engine
            .get_metadata_for_version(file, v1, "status", &auth)
            .await
            .unwrap(),
        "draft"
    );
    assert_eq!(
        engine
            .get_metadata_for_version(file, v2, "status", &auth)
            .await
            .unwrap(),
        "final"
    );
    assert!(engine.get_all_metadata(file, &auth).await.unwrap().is_empty());

    let result = engine.get_metadata_for_version(file, v1, "missing", &auth).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
    let result = engine.get_all_metadata_for_version(file, 7, &auth).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn test_metadata_on_directories() {
    let (engine, auth) = common::setup_test_env();

    let dir = engine.make_directory(None, "d", &auth, None).await.unwrap();
    engine.set_metadata(dir, "color", "blue", &auth).await.unwrap();
    assert_eq!(engine.get_metadata(dir, "color", &auth).await.unwrap(), "blue");
}

#[tokio::test]
async fn test_deleted_node_metadata_is_read_only() {
    let (engine, auth) = common::setup_test_env();

    let file = engine.touch(None, "f", &auth).await.unwrap();
    engine.set_metadata(file, "k", "v", &auth).await.unwrap();
    engine.remove_file(file, &auth).await.unwrap();

    assert_eq!(engine.get_metadata(file, "k", &auth).await.unwrap(), "v");
    let result = engine.set_metadata(file, "k", "w", &auth).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));

    engine.purge(file, &auth).await.unwrap();
    let result = engine.get_metadata(file, "k", &auth).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn test_metadata_permissions() {
    let (engine, auth) = common::setup_test_env();
    let bob = common::user("bob");

    let file = engine.touch(None, "f", &auth).await.unwrap();
    engine.set_metadata(file, "k", "v", &auth).await.unwrap();

    let result = engine.get_metadata(file, "k", &bob).await;
    assert!(matches!(result, Err(EngineError::PermissionDenied { .. })));

    engine
        .grant_permission(file, "bob", Permission::Read, &auth)
        .await
        .unwrap();
    assert_eq!(engine.get_metadata(file, "k", &bob).await.unwrap(), "v");
    let result = engine.set_metadata(file, "k", "w", &bob).await;
    assert!(matches!(result, Err(EngineError::PermissionDenied { .. })));
}
