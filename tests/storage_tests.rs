//! StorageEngine contract tests
//!
//! Every backend runs the same scenarios: memory, append-only file and
//! SQLite through the relational backend.

use std::sync::Arc;

use shorter::config::DatabaseConfig;
use shorter::errors::ShorterError;
use shorter::storage::{
    BatchItem, DeleteRequest, LogStore, OpContext, RelationalStore, StorageEngine, VolatileStore,
};
use shorter::utils::derive_key;
use tempfile::TempDir;

/// 持有存储实例和它依赖的临时目录
struct Harness {
    engine: Arc<dyn StorageEngine>,
    _dir: Option<TempDir>,
}

async fn memory_engine() -> Harness {
    Harness {
        engine: Arc::new(VolatileStore::new()),
        _dir: None,
    }
}

async fn file_engine() -> Harness {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let store = LogStore::open(dir.path().join("links.jsonl")).expect("Failed to open log store");
    Harness {
        engine: Arc::new(store),
        _dir: Some(dir),
    }
}

async fn sqlite_engine() -> Harness {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("links.db");
    let config = DatabaseConfig {
        dsn: format!("sqlite://{}?mode=rwc", db_path.display()),
        max_connections: 4,
        min_connections: 1,
        ..DatabaseConfig::default()
    };
    let store = RelationalStore::new(&config)
        .await
        .expect("Failed to create relational store");
    Harness {
        engine: Arc::new(store),
        _dir: Some(dir),
    }
}

fn ctx() -> OpContext {
    OpContext::background()
}

// =============================================================================
// 各后端共用的场景
// =============================================================================

async fn check_round_trip(engine: &dyn StorageEngine) {
    let key = engine
        .set(&ctx(), "https://practicum.yandex.ru/", "u1")
        .await
        .unwrap();
    assert_eq!(key, derive_key("https://practicum.yandex.ru/"));
    assert_eq!(
        engine.get(&ctx(), &key).await.unwrap(),
        "https://practicum.yandex.ru/"
    );

    // 存储的是规范化后的 URL
    let key = engine
        .set(&ctx(), "  HTTP://WWW.Test.COM/ ", "u1")
        .await
        .unwrap();
    assert_eq!(key, "4b23");
    assert_eq!(engine.get(&ctx(), "4b23").await.unwrap(), "http://www.test.com/");

    // 查询 key 同样会被规范化
    assert_eq!(
        engine.get(&ctx(), " 4B23 ").await.unwrap(),
        "http://www.test.com/"
    );
}

async fn check_already_exists(engine: &dyn StorageEngine) {
    let first = engine
        .set(&ctx(), "https://example.com/alpha", "u1")
        .await
        .unwrap();

    let second = engine
        .set(&ctx(), " HTTPS://EXAMPLE.COM/ALPHA", "u2")
        .await
        .unwrap_err();
    assert_eq!(second.existing_key(), Some(first.as_str()));
    assert!(matches!(second, ShorterError::AlreadyExists { .. }));

    // 第二次写入不会改变 owner
    let links = engine.get_user_urls(&ctx(), "u2").await.unwrap();
    assert!(links.is_empty());
}

async fn check_invalid_input(engine: &dyn StorageEngine) {
    for url in ["", "   ", "not a url", "/relative/path"] {
        let err = engine.set(&ctx(), url, "u1").await.unwrap_err();
        assert!(
            matches!(err, ShorterError::InvalidInput(_)),
            "{:?} -> {:?}",
            url,
            err
        );
    }
    assert!(engine.get_user_urls(&ctx(), "u1").await.unwrap().is_empty());
    assert!(matches!(
        engine.get(&ctx(), &derive_key("not a url")).await,
        Err(ShorterError::NotFound(_))
    ));
}

async fn check_not_found(engine: &dyn StorageEngine) {
    assert!(matches!(
        engine.get(&ctx(), "ffff").await,
        Err(ShorterError::NotFound(_))
    ));
    assert!(matches!(
        engine.get(&ctx(), "").await,
        Err(ShorterError::NotFound(_))
    ));
}

async fn check_collision(engine: &dyn StorageEngine) {
    assert_eq!(derive_key("http://a.com/za"), derive_key("http://a.com/ko"));

    let first = engine.set(&ctx(), "http://a.com/za", "u1").await.unwrap();
    let err = engine
        .set(&ctx(), "http://a.com/ko", "u1")
        .await
        .unwrap_err();
    assert_eq!(err.existing_key(), Some(first.as_str()));

    // 第一条记录没有被覆盖
    assert_eq!(engine.get(&ctx(), &first).await.unwrap(), "http://a.com/za");
    let links = engine.get_user_urls(&ctx(), "u1").await.unwrap();
    assert_eq!(links.len(), 1);
}

async fn check_idempotent_delete(engine: &dyn StorageEngine) {
    let key = engine
        .set(&ctx(), "https://delete.example.com/x", "u1")
        .await
        .unwrap();

    // owner 不匹配时不生效
    let changed = engine
        .delete_batch(&ctx(), &[DeleteRequest::new("u2", vec![key.clone()])])
        .await
        .unwrap();
    assert!(!changed);
    assert!(engine.get(&ctx(), &key).await.is_ok());

    let changed = engine
        .delete_batch(&ctx(), &[DeleteRequest::new("u1", vec![key.clone()])])
        .await
        .unwrap();
    assert!(changed);
    assert!(matches!(
        engine.get(&ctx(), &key).await,
        Err(ShorterError::Deleted(_))
    ));

    let changed = engine
        .delete_batch(&ctx(), &[DeleteRequest::new("u1", vec![key.clone()])])
        .await
        .unwrap();
    assert!(!changed);
    assert!(matches!(
        engine.get(&ctx(), &key).await,
        Err(ShorterError::Deleted(_))
    ));

    // 已删除的 URL 仍然占用唯一约束
    let err = engine
        .set(&ctx(), "https://delete.example.com/x", "u1")
        .await
        .unwrap_err();
    assert_eq!(err.existing_key(), Some(key.as_str()));
}

async fn check_delete_multiple_owners(engine: &dyn StorageEngine) {
    let x = engine
        .set(&ctx(), "https://delete.example.com/x", "u1")
        .await
        .unwrap();
    let y = engine
        .set(&ctx(), "https://delete.example.com/y", "u2")
        .await
        .unwrap();

    let changed = engine
        .delete_batch(
            &ctx(),
            &[
                DeleteRequest::new("u1", vec![x.clone(), "ffff".to_string()]),
                DeleteRequest::new("u2", vec![y.to_uppercase()]),
            ],
        )
        .await
        .unwrap();
    assert!(changed);
    assert!(matches!(
        engine.get(&ctx(), &x).await,
        Err(ShorterError::Deleted(_))
    ));
    assert!(matches!(
        engine.get(&ctx(), &y).await,
        Err(ShorterError::Deleted(_))
    ));
}

async fn check_delete_rejects_empty(engine: &dyn StorageEngine) {
    assert!(matches!(
        engine.delete_batch(&ctx(), &[]).await,
        Err(ShorterError::InvalidInput(_))
    ));
}

async fn check_user_urls(engine: &dyn StorageEngine) {
    let urls = [
        "https://example.com/gamma",
        "https://example.com/alpha",
        "https://example.com/beta",
    ];
    for url in urls {
        engine.set(&ctx(), url, "u1").await.unwrap();
    }
    engine
        .set(&ctx(), "https://example.org/owned-by-u2", "u2")
        .await
        .unwrap();

    engine
        .delete_batch(
            &ctx(),
            &[DeleteRequest::new(
                "u1",
                vec![derive_key("https://example.com/beta")],
            )],
        )
        .await
        .unwrap();

    let mut got: Vec<String> = engine
        .get_user_urls(&ctx(), "u1")
        .await
        .unwrap()
        .into_iter()
        .map(|link| {
            assert_eq!(link.short_key, derive_key(&link.original_url));
            link.original_url
        })
        .collect();
    got.sort();
    assert_eq!(
        got,
        vec!["https://example.com/alpha", "https://example.com/gamma"]
    );

    assert!(engine.get_user_urls(&ctx(), "nobody").await.unwrap().is_empty());
}

async fn check_anonymous_owner(engine: &dyn StorageEngine) {
    let key = engine
        .set(&ctx(), "https://anon.example.com/", "")
        .await
        .unwrap();
    assert!(engine.get_user_urls(&ctx(), "").await.unwrap().is_empty());

    let changed = engine
        .delete_batch(&ctx(), &[DeleteRequest::new("", vec![key.clone()])])
        .await
        .unwrap();
    assert!(!changed);
    assert_eq!(
        engine.get(&ctx(), &key).await.unwrap(),
        "https://anon.example.com/"
    );
}

async fn check_batch_reports_existing(engine: &dyn StorageEngine) {
    let existing = engine
        .set(&ctx(), "https://batch.example.com/two", "u1")
        .await
        .unwrap();

    let items = vec![
        BatchItem::new("c1", "https://batch.example.com/one"),
        BatchItem::new("c2", "https://batch.example.com/two"),
        BatchItem::new("c3", "https://batch.example.com/three"),
    ];
    let results = engine.set_batch(&ctx(), &items, "u1").await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].correlation_id, "c1");
    assert!(!results[0].already_existed);
    assert_eq!(results[1].short_key, existing);
    assert!(results[1].already_existed);
    assert_eq!(results[2].correlation_id, "c3");
    assert_eq!(
        results[2].short_key,
        derive_key("https://batch.example.com/three")
    );

    assert_eq!(engine.get_user_urls(&ctx(), "u1").await.unwrap().len(), 3);
}

fn invalid_batch() -> Vec<BatchItem> {
    vec![
        BatchItem::new("c1", "https://batch.example.com/one"),
        BatchItem::new("c2", "https://batch.example.com/two"),
        BatchItem::new("c3", "not a url"),
        BatchItem::new("c4", "https://batch.example.com/three"),
    ]
}

/// 无事务的后端保留失败点之前已写入的条目
async fn check_batch_partial_effect(engine: &dyn StorageEngine) {
    let err = engine
        .set_batch(&ctx(), &invalid_batch(), "u1")
        .await
        .unwrap_err();
    assert!(matches!(err, ShorterError::InvalidInput(_)));

    assert!(
        engine
            .get(&ctx(), &derive_key("https://batch.example.com/one"))
            .await
            .is_ok()
    );
    assert!(
        engine
            .get(&ctx(), &derive_key("https://batch.example.com/two"))
            .await
            .is_ok()
    );
    assert!(matches!(
        engine
            .get(&ctx(), &derive_key("https://batch.example.com/three"))
            .await,
        Err(ShorterError::NotFound(_))
    ));
}

/// 关系数据库整批回滚
async fn check_batch_rolls_back(engine: &dyn StorageEngine) {
    let err = engine
        .set_batch(&ctx(), &invalid_batch(), "u1")
        .await
        .unwrap_err();
    assert!(matches!(err, ShorterError::InvalidInput(_)));

    for url in [
        "https://batch.example.com/one",
        "https://batch.example.com/two",
        "https://batch.example.com/three",
    ] {
        assert!(matches!(
            engine.get(&ctx(), &derive_key(url)).await,
            Err(ShorterError::NotFound(_))
        ));
    }
    assert!(engine.get_user_urls(&ctx(), "u1").await.unwrap().is_empty());
}

async fn check_cancelled(engine: &dyn StorageEngine) {
    let cancelled = OpContext::background();
    cancelled.cancel();

    let err = engine
        .set(&cancelled, "https://rust-lang.org/", "u1")
        .await
        .unwrap_err();
    assert!(matches!(err, ShorterError::Cancelled(_)));
    assert!(matches!(
        engine
            .delete_batch(&cancelled, &[DeleteRequest::new("u1", vec!["ab".into()])])
            .await,
        Err(ShorterError::Cancelled(_))
    ));

    // 没有写入任何记录
    assert!(matches!(
        engine.get(&ctx(), &derive_key("https://rust-lang.org/")).await,
        Err(ShorterError::NotFound(_))
    ));
}

async fn check_close(engine: &dyn StorageEngine) {
    let key = engine.set(&ctx(), "https://docs.rs/", "u1").await.unwrap();
    assert!(engine.is_available().await);

    engine.close().await.unwrap();
    engine.close().await.unwrap();

    assert!(!engine.is_available().await);
    assert!(matches!(
        engine.get(&ctx(), &key).await,
        Err(ShorterError::BackendUnavailable(_))
    ));
    assert!(matches!(
        engine.set(&ctx(), "https://crates.io/", "u1").await,
        Err(ShorterError::BackendUnavailable(_))
    ));
}

macro_rules! contract_tests {
    ($module:ident, $factory:ident, $batch_check:ident) => {
        #[cfg(test)]
        mod $module {
            use super::*;

            #[tokio::test]
            async fn test_round_trip() {
                let h = $factory().await;
                check_round_trip(h.engine.as_ref()).await;
            }

            #[tokio::test]
            async fn test_already_exists() {
                let h = $factory().await;
                check_already_exists(h.engine.as_ref()).await;
            }

            #[tokio::test]
            async fn test_invalid_input() {
                let h = $factory().await;
                check_invalid_input(h.engine.as_ref()).await;
            }

            #[tokio::test]
            async fn test_not_found() {
                let h = $factory().await;
                check_not_found(h.engine.as_ref()).await;
            }

            #[tokio::test]
            async fn test_collision() {
                let h = $factory().await;
                check_collision(h.engine.as_ref()).await;
            }

            #[tokio::test]
            async fn test_idempotent_delete() {
                let h = $factory().await;
                check_idempotent_delete(h.engine.as_ref()).await;
            }

            #[tokio::test]
            async fn test_delete_multiple_owners() {
                let h = $factory().await;
                check_delete_multiple_owners(h.engine.as_ref()).await;
            }

            #[tokio::test]
            async fn test_delete_rejects_empty() {
                let h = $factory().await;
                check_delete_rejects_empty(h.engine.as_ref()).await;
            }

            #[tokio::test]
            async fn test_user_urls() {
                let h = $factory().await;
                check_user_urls(h.engine.as_ref()).await;
            }

            #[tokio::test]
            async fn test_anonymous_owner() {
                let h = $factory().await;
                check_anonymous_owner(h.engine.as_ref()).await;
            }

            #[tokio::test]
            async fn test_batch_reports_existing() {
                let h = $factory().await;
                check_batch_reports_existing(h.engine.as_ref()).await;
            }

            #[tokio::test]
            async fn test_batch_atomicity() {
                let h = $factory().await;
                $batch_check(h.engine.as_ref()).await;
            }

            #[tokio::test]
            async fn test_cancelled() {
                let h = $factory().await;
                check_cancelled(h.engine.as_ref()).await;
            }

            #[tokio::test]
            async fn test_close() {
                let h = $factory().await;
                check_close(h.engine.as_ref()).await;
            }
        }
    };
}

// =============================================================================
// 各后端
// =============================================================================

contract_tests!(memory_contract_tests, memory_engine, check_batch_partial_effect);
contract_tests!(file_contract_tests, file_engine, check_batch_partial_effect);
contract_tests!(sqlite_contract_tests, sqlite_engine, check_batch_rolls_back);

#[tokio::test]
async fn test_backend_names() {
    assert_eq!(memory_engine().await.engine.backend_name(), "memory");
    assert_eq!(file_engine().await.engine.backend_name(), "file");
    assert_eq!(sqlite_engine().await.engine.backend_name(), "sqlite");
}

// =============================================================================
// 并发调用互斥
// =============================================================================

#[cfg(test)]
mod concurrency_tests {
    use super::*;

    const CALLERS: usize = 32;

    /// 并发写入同一 URL，只有一次成功，其余都拿到同一个已存在的 key
    async fn check_concurrent_set_same_url(engine: Arc<dyn StorageEngine>) {
        let mut handles = Vec::with_capacity(CALLERS);
        for i in 0..CALLERS {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine
                    .set(&ctx(), "http://same.example/", &format!("u{}", i))
                    .await
            }));
        }

        let mut stored = 0;
        let mut existing = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(key) => {
                    assert_eq!(key, "53dc");
                    stored += 1;
                }
                Err(ShorterError::AlreadyExists { key, .. }) => {
                    assert_eq!(key, "53dc");
                    existing += 1;
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!((stored, existing), (1, CALLERS - 1));
    }

    /// 写入与删除交错执行，每条记录恰好被一次删除调用翻转
    async fn check_concurrent_set_and_delete(engine: Arc<dyn StorageEngine>) {
        let mut doomed = Vec::new();
        for i in 0..10 {
            let key = engine
                .set(&ctx(), &format!("https://delete.example/{}", i), "u1")
                .await
                .unwrap();
            doomed.push(key);
        }

        let mut deleters = Vec::new();
        for key in doomed.iter().chain(doomed.iter()) {
            let engine = Arc::clone(&engine);
            let request = DeleteRequest::new("u1", vec![key.clone()]);
            deleters.push(tokio::spawn(async move {
                engine.delete_batch(&ctx(), &[request]).await
            }));
        }
        let mut writers = Vec::new();
        for i in 0..10 {
            let engine = Arc::clone(&engine);
            writers.push(tokio::spawn(async move {
                engine
                    .set(&ctx(), &format!("https://fresh.example/{}", i), "u1")
                    .await
            }));
        }

        let mut changed = 0;
        for handle in deleters {
            if handle.await.unwrap().unwrap() {
                changed += 1;
            }
        }
        for handle in writers {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(changed, doomed.len());
        for key in &doomed {
            assert!(matches!(
                engine.get(&ctx(), key).await,
                Err(ShorterError::Deleted(_))
            ));
        }
        let live = engine.get_user_urls(&ctx(), "u1").await.unwrap();
        assert_eq!(live.len(), 10);
        assert!(live.iter().all(|l| l.original_url.starts_with("https://fresh.example/")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_memory_concurrent_set_same_url() {
        let h = memory_engine().await;
        check_concurrent_set_same_url(Arc::clone(&h.engine)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_concurrent_set_same_url() {
        let h = file_engine().await;
        check_concurrent_set_same_url(Arc::clone(&h.engine)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_memory_concurrent_set_and_delete() {
        let h = memory_engine().await;
        check_concurrent_set_and_delete(Arc::clone(&h.engine)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_concurrent_set_and_delete() {
        let h = file_engine().await;
        check_concurrent_set_and_delete(Arc::clone(&h.engine)).await;
    }
}
