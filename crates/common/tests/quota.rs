//! Integration tests for per-tenant space accounting

mod common;

use bytes::Bytes;

use ::common::error::EngineError;
use ::common::quota::DEFAULT_TOTAL_SPACE;

#[tokio::test]
async fn test_usage_tracks_current_versions() {
    let (engine, auth) = common::setup_test_env();

    let usage = engine.storage_usage(common::TENANT, &auth).await.unwrap();
    assert_eq!(usage.total_space, DEFAULT_TOTAL_SPACE);
    assert_eq!(usage.used_space, 0);

    let a = common::write_file(&engine, None, "a", b"0123456789", &auth).await;
    common::write_file(&engine, None, "b", b"01234", &auth).await;
    assert_eq!(
        engine.storage_usage(common::TENANT, &auth).await.unwrap().used_space,
        15
    );

    // a new version replaces the old size
    engine.put_file(a, Bytes::from_static(b"012"), &auth).await.unwrap();
    assert_eq!(
        engine.storage_usage(common::TENANT, &auth).await.unwrap().used_space,
        8
    );

    // soft deletion keeps the space allocated
    engine.remove_file(a, &auth).await.unwrap();
    assert_eq!(
        engine.storage_usage(common::TENANT, &auth).await.unwrap().used_space,
        8
    );
}

#[tokio::test]
async fn test_usage_report_fields() {
    let (engine, auth) = common::setup_test_env();
    engine.set_quota(common::TENANT, 200);

    common::write_file(&engine, None, "a", b"0123456789", &auth).await;
    let usage = engine.storage_usage(common::TENANT, &auth).await.unwrap();
    assert_eq!(usage.total_space, 200);
    assert_eq!(usage.used_space, 10);
    assert_eq!(usage.available_space, 190);
    assert!((usage.usage_percentage - 5.0).abs() < 1e-9);

    engine.set_quota(common::TENANT, 0);
    let usage = engine.storage_usage(common::TENANT, &auth).await.unwrap();
    assert_eq!(usage.available_space, 0);
    assert_eq!(usage.usage_percentage, 0.0);
}

#[tokio::test]
async fn test_exhaustion_appends_nothing() {
    let (engine, auth) = common::setup_test_env();
    engine.set_quota(common::TENANT, 10);

    let file = common::write_file(&engine, None, "f", b"12345678", &auth).await;
    let result = engine
        .put_file(file, Bytes::from_static(b"12345678901"), &auth)
        .await;
    match result {
        Err(EngineError::ResourceExhausted { used, increase, total, .. }) => {
            assert_eq!((used, increase, total), (8, 3, 10));
        }
        other => panic!("expected ResourceExhausted, got {:?}", other),
    }
    assert_eq!(engine.list_versions(file, &auth).await.unwrap().len(), 1);
    assert_eq!(&engine.get_file(file, None, &auth).await.unwrap()[..], b"12345678");

    // shrinking always works
    engine.put_file(file, Bytes::from_static(b"1"), &auth).await.unwrap();
    assert_eq!(
        engine.storage_usage(common::TENANT, &auth).await.unwrap().used_space,
        1
    );
}

#[tokio::test]
async fn test_usage_of_other_tenant_is_denied() {
    let (engine, auth) = common::setup_test_env();
    let result = engine.storage_usage("acme", &auth).await;
    assert!(matches!(result, Err(EngineError::PermissionDenied { .. })));
}

#[tokio::test]
async fn test_concurrent_puts_never_overshoot() {
    let (engine, auth) = common::setup_test_env();
    engine.set_quota(common::TENANT, 1000);

    let mut files = Vec::new();
    for i in 0..32 {
        files.push(engine.touch(None, &format!("f{i}"), &auth).await.unwrap());
    }

    let handles: Vec<_> = files
        .into_iter()
        .map(|file| {
            let engine = engine.clone();
            let auth = auth.clone();
            tokio::spawn(async move {
                engine
                    .put_file(file, Bytes::from(vec![7u8; 100]), &auth)
                    .await
            })
        })
        .collect();

    let mut stored = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => stored += 1,
            Err(EngineError::ResourceExhausted { .. }) => {}
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    assert_eq!(stored, 10);
    assert_eq!(
        engine.storage_usage(common::TENANT, &auth).await.unwrap().used_space,
        1000
    );
}

#[tokio::test]
async fn test_tenants_are_accounted_separately() {
    let (engine, auth) = common::setup_test_env();
    let acme = ::common::auth::AuthContext::new("root", "acme");
    engine.set_quota("acme", 5);

    common::write_file(&engine, None, "f", b"0123456789", &auth).await;
    let file = engine.touch(None, "f", &acme).await.unwrap();
    let result = engine
        .put_file(file, Bytes::from_static(b"0123456789"), &acme)
        .await;
    assert!(matches!(result, Err(EngineError::ResourceExhausted { .. })));
    assert_eq!(engine.storage_usage("acme", &acme).await.unwrap().used_space, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exports_never_see_usage_ahead_of_purges() {
    const FILES: usize = 64;
    let (engine, auth) = common::setup_test_env();

    let mut files = Vec::with_capacity(FILES);
    for i in 0..FILES {
        let name = format!("f{i}");
        let uid = common::write_file(&engine, None, &name, b"0123456789", &auth).await;
        engine.remove_file(uid, &auth).await.unwrap();
        files.push(uid);
    }

    let purger = {
        let engine = engine.clone();
        let auth = auth.clone();
        tokio::spawn(async move {
            for uid in files {
                engine.purge(uid, &auth).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let mut exports = 0;
    loop {
        let done = purger.is_finished();
        let snapshot = engine.export_tenant(common::TENANT).snapshot;
        let held: u64 = snapshot
            .histories
            .iter()
            .filter_map(|record| record.versions.last())
            .map(|version| version.size)
            .sum();
        assert_eq!(snapshot.used_space, held, "export {exports}");
        exports += 1;
        if done {
            break;
        }
        tokio::task::yield_now().await;
    }
    purger.await.unwrap();

    let usage = engine.storage_usage(common::TENANT, &auth).await.unwrap();
    assert_eq!(usage.used_space, 0);
}
