//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 协调器读写路径集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{build_node, build_node_with_l1, test_config, wait_until, WAIT};
use distcache::backend::{L1Cache, L2Store, MemoryStore, MokaL1};
use distcache::{CacheError, CancellationToken, DistributedCacheCoordinator};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_set_then_get() {
    let store = MemoryStore::new();
    let node = build_node(&store, test_config("a")).await;

    node.set("user:1", "alice").await.unwrap();
    assert_eq!(node.get("user:1").await.unwrap(), "alice");
    assert!(store.contains("user:1"));
    assert_eq!(node.get_stats().primary_hits, 1);
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() {
    let store = MemoryStore::new();
    let node = build_node(&store, test_config("a")).await;

    node.set("user:1", "alice").await.unwrap();
    node.delete("user:1").await.unwrap();

    assert_eq!(
        node.get("user:1").await,
        Err(CacheError::NotFound("user:1".to_string()))
    );
    assert!(!store.contains("user:1"));
}

#[tokio::test]
async fn test_get_backfills_l1_from_l2() {
    let store = MemoryStore::new();
    let (node, l1) = build_node_with_l1(&store, test_config("a")).await;
    store.set("k", "from-l2", Duration::ZERO).await.unwrap();

    assert_eq!(node.get("k").await.unwrap(), "from-l2");
    assert_eq!(l1.get("k").await, Some("from-l2".to_string()));

    let stats = node.get_stats();
    assert_eq!(stats.secondary_hits, 1);
    assert_eq!(stats.secondary_misses, 0);
}

#[tokio::test]
async fn test_unavailable_l2_propagates_transport_errors() {
    let store = MemoryStore::new();
    let (node, l1) = build_node_with_l1(&store, test_config("a")).await;
    store.set_unavailable(true);

    assert!(matches!(
        node.set("k", "v").await,
        Err(CacheError::Transport(_))
    ));
    assert_eq!(l1.get("k").await, None);
    assert_eq!(store.publish_count(), 0);

    assert!(matches!(node.get("k").await, Err(CacheError::Transport(_))));
    assert!(matches!(node.delete("k").await, Err(CacheError::Transport(_))));
}

#[tokio::test]
async fn test_operations_after_close_fail() {
    let store = MemoryStore::new();
    let (node, l1) = build_node_with_l1(&store, test_config("a")).await;
    node.set("k", "v").await.unwrap();

    node.close().await;
    node.close().await;

    assert_eq!(node.get("k").await, Err(CacheError::Closed));
    assert_eq!(node.set("k", "v2").await, Err(CacheError::Closed));
    assert_eq!(l1.get("k").await, None);
}

#[tokio::test]
async fn test_cancelling_scope_stops_coordinator() {
    let store = MemoryStore::new();
    let config = test_config("a");
    let l1 = MokaL1::new(&config.l1);
    let scope = CancellationToken::new();
    let node = DistributedCacheCoordinator::new(
        config,
        Arc::new(l1.clone()),
        Arc::new(store.clone()),
        &scope,
    )
    .await
    .unwrap();
    node.set("k", "v").await.unwrap();

    scope.cancel();
    assert_eq!(node.get("k").await, Err(CacheError::Cancelled));

    // 监听任务已退出，远端消息不再被应用
    let other = build_node(&store, test_config("b")).await;
    other.delete("k").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(l1.get("k").await, Some("v".to_string()));
}

#[tokio::test]
async fn test_stale_entry_refreshes_from_l2() {
    let store = MemoryStore::new();
    let mut config = test_config("a");
    config.l1.refresh_after_secs = 1;
    let node = build_node(&store, config).await;

    node.set("k", "v1").await.unwrap();
    // 绕过协调器直接修改L2，不产生任何消息
    store.set("k", "v2", Duration::ZERO).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(node.get("k").await.unwrap(), "v1");
    let node = &node;
    assert!(
        wait_until(WAIT, move || async move {
            node.get("k").await.ok().as_deref() == Some("v2")
        })
        .await
    );
    assert!(node.get_stats().refreshes >= 1);
}

#[tokio::test]
async fn test_refresh_invalidates_key_removed_from_l2() {
    let store = MemoryStore::new();
    let mut config = test_config("a");
    config.l1.refresh_after_secs = 1;
    let (node, l1) = build_node_with_l1(&store, config).await;

    node.set("k", "v1").await.unwrap();
    store.delete("k").await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(node.get("k").await.unwrap(), "v1");
    let l1 = &l1;
    assert!(wait_until(WAIT, move || async move { l1.get("k").await.is_none() }).await);
    assert!(matches!(node.get("k").await, Err(CacheError::NotFound(_))));
}

#[tokio::test]
async fn test_scope_cancel_interrupts_in_flight_get() {
    let store = MemoryStore::new();
    store.set("k", "v", Duration::ZERO).await.unwrap();
    store.set_read_delay(Duration::from_secs(5));

    let config = test_config("a");
    let scope = CancellationToken::new();
    let node = Arc::new(
        DistributedCacheCoordinator::new(
            config.clone(),
            Arc::new(MokaL1::new(&config.l1)),
            Arc::new(store.clone()),
            &scope,
        )
        .await
        .unwrap(),
    );

    let pending = {
        let node = node.clone();
        tokio::spawn(async move { node.get("k").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    scope.cancel();

    let result = tokio::time::timeout(Duration::from_millis(500), pending)
        .await
        .expect("in-flight get should return promptly after cancellation")
        .unwrap();
    assert_eq!(result, Err(CacheError::Cancelled));
}

#[tokio::test]
async fn test_refresh_does_not_undo_concurrent_local_set() {
    let store = MemoryStore::new();
    let mut config = test_config("a");
    config.l1.refresh_after_secs = 1;
    let (node, l1) = build_node_with_l1(&store, config).await;

    node.set("k", "v0").await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    // 刷新读到 v0 后，响应被延迟返回
    store.set_read_delay(Duration::from_millis(300));
    assert_eq!(node.get("k").await.unwrap(), "v0");
    tokio::time::sleep(Duration::from_millis(50)).await;

    node.set("k", "v1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(l1.get("k").await, Some("v1".to_string()));
    assert_eq!(node.get("k").await.unwrap(), "v1");
    assert!(node.get_stats().refreshes >= 1);
}

#[tokio::test]
async fn test_backfill_does_not_overwrite_concurrent_local_set() {
    let store = MemoryStore::new();
    let node = Arc::new(build_node(&store, test_config("a")).await);
    store.set("k", "v0", Duration::ZERO).await.unwrap();
    store.set_read_delay(Duration::from_millis(200));

    let reader = {
        let node = node.clone();
        tokio::spawn(async move { node.get("k").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    node.set("k", "v1").await.unwrap();

    assert_eq!(reader.await.unwrap().unwrap(), "v0");
    store.set_read_delay(Duration::ZERO);
    assert_eq!(node.get("k").await.unwrap(), "v1");
}
