//! Integration tests for soft delete, undelete and purge

mod common;

use bytes::Bytes;

use ::common::error::EngineError;

#[tokio::test]
async fn test_rm_file_hides_from_listing() {
    let (engine, auth) = common::setup_test_env();

    let f1 = common::write_file(&engine, None, "file1.txt", b"data1", &auth).await;
    common::write_file(&engine, None, "file2.txt", b"data2", &auth).await;

    engine.remove_file(f1, &auth).await.unwrap();
    assert_eq!(common::names(&engine, None, &auth).await, vec!["file2.txt"]);

    // soft-deleted content can't be read
    let result = engine.get_file(f1, None, &auth).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));

    // but the node still stats, with its deletion visible
    let info = engine.stat(f1, &auth).await.unwrap();
    assert!(info.deleted_at.is_some());
}

#[tokio::test]
async fn test_rm_wrong_kind() {
    let (engine, auth) = common::setup_test_env();

    let dir = engine.make_directory(None, "d", &auth, None).await.unwrap();
    let file = engine.touch(None, "f", &auth).await.unwrap();

    assert!(matches!(
        engine.remove_file(dir, &auth).await,
        Err(EngineError::InvalidArgument(_))
    ));
    assert!(matches!(
        engine.remove_directory(file, &auth).await,
        Err(EngineError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_rmdir_non_empty_conflicts() {
    let (engine, auth) = common::setup_test_env();

    let dir = engine.make_directory(None, "d", &auth, None).await.unwrap();
    let file = engine.touch(Some(dir), "f", &auth).await.unwrap();

    let result = engine.remove_directory(dir, &auth).await;
    assert!(matches!(result, Err(EngineError::Conflict(_))));

    // soft-deleted children don't count
    engine.remove_file(file, &auth).await.unwrap();
    engine.remove_directory(dir, &auth).await.unwrap();
    assert!(common::names(&engine, None, &auth).await.is_empty());
}

#[tokio::test]
async fn test_rm_twice_is_not_found() {
    let (engine, auth) = common::setup_test_env();
    let file = engine.touch(None, "f", &auth).await.unwrap();

    engine.remove_file(file, &auth).await.unwrap();
    let result = engine.remove_file(file, &auth).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn test_undelete_restores_content() {
    let (engine, auth) = common::setup_test_env();
    let file = common::write_file(&engine, None, "f.txt", b"keep me", &auth).await;

    engine.remove_file(file, &auth).await.unwrap();
    engine.undelete_file(file, &auth).await.unwrap();

    assert_eq!(common::names(&engine, None, &auth).await, vec!["f.txt"]);
    assert_eq!(
        engine.get_file(file, None, &auth).await.unwrap(),
        Bytes::from_static(b"keep me")
    );

    // undeleting a live node changes nothing
    engine.undelete_file(file, &auth).await.unwrap();
}

#[tokio::test]
async fn test_undelete_name_taken_conflicts() {
    let (engine, auth) = common::setup_test_env();

    let old = engine.touch(None, "report", &auth).await.unwrap();
    engine.remove_file(old, &auth).await.unwrap();
    engine.touch(None, "report", &auth).await.unwrap();

    let result = engine.undelete_file(old, &auth).await;
    assert!(matches!(result, Err(EngineError::Conflict(_))));
}

#[tokio::test]
async fn test_undelete_under_deleted_parent_conflicts() {
    let (engine, auth) = common::setup_test_env();

    let dir = engine.make_directory(None, "d", &auth, None).await.unwrap();
    let file = engine.touch(Some(dir), "f", &auth).await.unwrap();
    engine.remove_file(file, &auth).await.unwrap();
    engine.remove_directory(dir, &auth).await.unwrap();

    let result = engine.undelete_file(file, &auth).await;
    assert!(matches!(result, Err(EngineError::Conflict(_))));

    engine.undelete_file(dir, &auth).await.unwrap();
    engine.undelete_file(file, &auth).await.unwrap();
    assert_eq!(common::names(&engine, Some(dir), &auth).await, vec!["f"]);
}

#[tokio::test]
async fn test_purge_frees_space_and_is_final() {
    let (engine, auth) = common::setup_test_env();

    let file = common::write_file(&engine, None, "f", b"0123456789", &auth).await;
    engine
        .put_file(file, Bytes::from_static(b"01234"), &auth)
        .await
        .unwrap();
    engine.set_metadata(file, "k", "v", &auth).await.unwrap();
    assert_eq!(
        engine.storage_usage("default", &auth).await.unwrap().used_space,
        5
    );

    // live nodes must be removed first
    let result = engine.purge(file, &auth).await;
    assert!(matches!(result, Err(EngineError::Conflict(_))));

    engine.remove_file(file, &auth).await.unwrap();
    // soft-deleted files still count
    assert_eq!(
        engine.storage_usage("default", &auth).await.unwrap().used_space,
        5
    );

    engine.purge(file, &auth).await.unwrap();
    assert_eq!(
        engine.storage_usage("default", &auth).await.unwrap().used_space,
        0
    );
    assert!(matches!(
        engine.undelete_file(file, &auth).await,
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        engine.stat(file, &auth).await,
        Err(EngineError::NotFound(_))
    ));

    // both blobs are unreferenced now
    assert_eq!(engine.collect_garbage(), 2);
}

#[tokio::test]
async fn test_purge_directory_subtree() {
    let (engine, auth) = common::setup_test_env();

    let dir = engine.make_directory(None, "d", &auth, None).await.unwrap();
    let sub = engine.make_directory(Some(dir), "s", &auth, None).await.unwrap();
    let file = common::write_file(&engine, Some(sub), "f", b"abc", &auth).await;

    engine.remove_file(file, &auth).await.unwrap();
    engine.remove_directory(sub, &auth).await.unwrap();
    engine.remove_directory(dir, &auth).await.unwrap();
    engine.purge(dir, &auth).await.unwrap();

    for uid in [dir, sub, file] {
        assert!(!engine.exists(uid, &auth).await.unwrap());
    }
    assert_eq!(
        engine.storage_usage("default", &auth).await.unwrap().used_space,
        0
    );
}
