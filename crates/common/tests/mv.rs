//! Integration tests for rename and move

mod common;

use ::common::acl::Permission;
use ::common::error::EngineError;

#[tokio::test]
async fn test_rename() {
    let (engine, auth) = common::setup_test_env();

    let file = engine.touch(None, "test_file.txt", &auth).await.unwrap();
    engine
        .rename(file, "renamed_test_file.txt", &auth)
        .await
        .unwrap();

    assert_eq!(engine.stat(file, &auth).await.unwrap().name, "renamed_test_file.txt");
    assert_eq!(
        common::names(&engine, None, &auth).await,
        vec!["renamed_test_file.txt"]
    );

    // renaming to the current name is a no-op
    engine
        .rename(file, "renamed_test_file.txt", &auth)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_rename_collision() {
    let (engine, auth) = common::setup_test_env();

    let a = engine.touch(None, "a", &auth).await.unwrap();
    engine.touch(None, "b", &auth).await.unwrap();
    let result = engine.rename(a, "b", &auth).await;
    assert!(matches!(result, Err(EngineError::AlreadyExists(_))));

    let result = engine.rename(a, "x/y", &auth).await;
    assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_rename_needs_write_on_parent() {
    let (engine, auth) = common::setup_test_env();
    let bob = common::user("bob");

    let dir = engine.make_directory(None, "d", &auth, None).await.unwrap();
    let file = engine.touch(Some(dir), "f", &auth).await.unwrap();

    // WRITE on the file itself does not help
    engine
        .grant_permission(file, "bob", Permission::Write, &auth)
        .await
        .unwrap();
    let result = engine.rename(file, "g", &bob).await;
    assert!(matches!(result, Err(EngineError::PermissionDenied { .. })));

    engine
        .grant_permission(dir, "bob", Permission::Write, &auth)
        .await
        .unwrap();
    engine.rename(file, "g", &bob).await.unwrap();
}

#[tokio::test]
async fn test_mv() {
    let (engine, auth) = common::setup_test_env();

    let root = engine.make_directory(None, "root", &auth, None).await.unwrap();
    let sub = engine.make_directory(Some(root), "sub", &auth, None).await.unwrap();
    let file = common::write_file(&engine, Some(root), "f.txt", b"data", &auth).await;

    engine.mv(file, Some(sub), &auth).await.unwrap();

    assert_eq!(common::names(&engine, Some(sub), &auth).await, vec!["f.txt"]);
    assert_eq!(common::names(&engine, Some(root), &auth).await, vec!["sub"]);
    assert_eq!(engine.stat(file, &auth).await.unwrap().parent, Some(sub));

    // content travels with the node
    assert_eq!(&engine.get_file(file, None, &auth).await.unwrap()[..], b"data");
}

#[tokio::test]
async fn test_mv_to_tenant_root() {
    let (engine, auth) = common::setup_test_env();

    let dir = engine.make_directory(None, "d", &auth, None).await.unwrap();
    let file = engine.touch(Some(dir), "f", &auth).await.unwrap();
    engine.mv(file, None, &auth).await.unwrap();

    assert_eq!(common::names(&engine, None, &auth).await, vec!["d", "f"]);
    assert_eq!(engine.stat(file, &auth).await.unwrap().parent, None);
}

#[tokio::test]
async fn test_mv_into_self_or_descendant() {
    let (engine, auth) = common::setup_test_env();

    let a = engine.make_directory(None, "a", &auth, None).await.unwrap();
    let b = engine.make_directory(Some(a), "b", &auth, None).await.unwrap();
    let c = engine.make_directory(Some(b), "c", &auth, None).await.unwrap();

    for dest in [a, b, c] {
        let result = engine.mv(a, Some(dest), &auth).await;
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
    }
    // nothing moved
    assert_eq!(engine.stat(a, &auth).await.unwrap().parent, None);
}

#[tokio::test]
async fn test_mv_collision() {
    let (engine, auth) = common::setup_test_env();

    let d = engine.make_directory(None, "d", &auth, None).await.unwrap();
    engine.touch(Some(d), "f", &auth).await.unwrap();
    let other = engine.touch(None, "f", &auth).await.unwrap();

    let result = engine.mv(other, Some(d), &auth).await;
    assert!(matches!(result, Err(EngineError::AlreadyExists(_))));
}

#[tokio::test]
async fn test_mv_needs_write_on_both_parents() {
    let (engine, auth) = common::setup_test_env();
    let bob = common::user("bob");

    let src = engine.make_directory(None, "src", &auth, None).await.unwrap();
    let dst = engine.make_directory(None, "dst", &auth, None).await.unwrap();
    let file = engine.touch(Some(src), "f", &auth).await.unwrap();

    engine
        .grant_permission(src, "bob", Permission::Write, &auth)
        .await
        .unwrap();
    let result = engine.mv(file, Some(dst), &bob).await;
    assert!(matches!(result, Err(EngineError::PermissionDenied { .. })));

    engine
        .grant_permission(dst, "bob", Permission::Write, &auth)
        .await
        .unwrap();
    engine.mv(file, Some(dst), &bob).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_cross_moves_keep_tree_acyclic() {
    let (engine, auth) = common::setup_test_env();

    for _ in 0..20 {
        let a = engine.make_directory(None, "a", &auth, None).await.unwrap();
        let b = engine.make_directory(None, "b", &auth, None).await.unwrap();

        let (ra, rb) = tokio::join!(
            {
                let engine = engine.clone();
                let auth = auth.clone();
                tokio::spawn(async move { engine.mv(a, Some(b), &auth).await })
            },
            {
                let engine = engine.clone();
                let auth = auth.clone();
                tokio::spawn(async move { engine.mv(b, Some(a), &auth).await })
            }
        );
        let (ra, rb) = (ra.unwrap(), rb.unwrap());

        // exactly one of them wins
        assert!(ra.is_ok() != rb.is_ok());
        let loser = if ra.is_ok() { rb } else { ra };
        assert!(matches!(loser, Err(EngineError::InvalidArgument(_))));

        // clean up so the names are free again
        let top = if engine.stat(a, &auth).await.unwrap().parent.is_none() { a } else { b };
        let inner = if top == a { b } else { a };
        engine.remove_directory(inner, &auth).await.unwrap();
        engine.remove_directory(top, &auth).await.unwrap();
    }
}
