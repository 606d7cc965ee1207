use super::cache_able::CacheAble;
use super::service::CacheService;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug)]
struct NoticeWindow {
    ids: Vec<i64>,
    size: usize,
}

impl CacheAble for NoticeWindow {
    fn field() -> impl AsRef<str> {
        "notice_window".to_string()
    }
}

fn local_service() -> CacheService {
    CacheService::new(None, "lawhook-test".to_string(), Some(Duration::from_secs(60)))
}

#[tokio::test]
async fn cacheable_send_and_sync_roundtrip() {
    let cache = local_service();

    let window = NoticeWindow {
        ids: vec![101, 100, 99],
        size: 3,
    };

    window.send("main", &cache).await.expect("send should succeed");

    match NoticeWindow::sync("main", &cache).await {
        Ok(Some(fetched)) => {
            assert_eq!(fetched.ids, vec![101, 100, 99]);
            assert_eq!(fetched.size, 3);
        }
        Ok(None) => panic!("expected cached data but got None"),
        Err(e) => panic!("sync failed: {e}"),
    }
}

#[tokio::test]
async fn cacheable_keys_are_namespaced() {
    let cache = local_service();
    assert_eq!(
        NoticeWindow::cache_id("main", &cache),
        "lawhook-test:notice_window:main"
    );
}

#[tokio::test]
async fn cacheable_delete_removes_entry() {
    let cache = local_service();
    let window = NoticeWindow { ids: vec![1], size: 1 };
    window.send("gone", &cache).await.unwrap();

    NoticeWindow::delete("gone", &cache).await.unwrap();
    let fetched = NoticeWindow::sync("gone", &cache).await.unwrap();
    assert!(fetched.is_none());
}

#[tokio::test]
async fn local_backend_kv_ttl_and_nx_work() {
    let cache = local_service();

    cache
        .set("k1", b"v1", Some(Duration::from_millis(30)))
        .await
        .expect("set should succeed");
    let immediate = cache.get("k1").await.expect("get should succeed");
    assert_eq!(immediate, Some(b"v1".to_vec()));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let expired = cache.get("k1").await.expect("get should succeed after ttl");
    assert_eq!(expired, None);

    let first = cache
        .set_nx("nx-key", b"one", Some(Duration::from_secs(1)))
        .await
        .expect("set_nx should succeed");
    let second = cache
        .set_nx("nx-key", b"two", Some(Duration::from_secs(1)))
        .await
        .expect("set_nx should succeed");
    assert!(first);
    assert!(!second);
}

#[tokio::test]
async fn local_backend_del_batch_counts_removed_keys() {
    let cache = local_service();
    cache.set("a", b"1", None).await.unwrap();
    cache.set("b", b"2", None).await.unwrap();

    let removed = cache.del_batch(&["a", "b", "missing"]).await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(cache.get("a").await.unwrap(), None);
}

#[tokio::test]
async fn local_backend_incr_and_keys_prefix_scan() {
    let cache = local_service();
    assert_eq!(cache.incr("counter", 2).await.unwrap(), 2);
    assert_eq!(cache.incr("counter", 3).await.unwrap(), 5);

    cache.set("rate_limit:global", b"0", None).await.unwrap();
    cache.set("rate_limit:webhook:1", b"0", None).await.unwrap();
    cache.set("other", b"0", None).await.unwrap();

    let mut keys = cache.keys("rate_limit:*").await.unwrap();
    keys.sort();
    assert_eq!(keys, vec!["rate_limit:global", "rate_limit:webhook:1"]);
}
