//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! L1容量淘汰集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{build_node_with_l1, test_config};
use distcache::backend::{L1Cache, L2Store, MemoryStore};
use distcache::config::EvictionKind;
use distcache::CacheError;

#[tokio::test]
async fn test_capacity_for_two_entries_evicts_oldest() {
    let store = MemoryStore::new();
    let mut config = test_config("a");
    // 每个条目权重为 2（键1字节 + 值1字节）
    config.l1.max_capacity = 4;
    config.l1.eviction = EvictionKind::Lru;
    let (node, l1) = build_node_with_l1(&store, config).await;

    node.set("a", "1").await.unwrap();
    node.set("b", "2").await.unwrap();
    node.set("c", "3").await.unwrap();
    l1.run_pending_tasks().await;

    assert_eq!(l1.get("a").await, None);
    assert!(l1.weighted_size() <= 4);

    // 被淘汰的键从L2回填
    assert_eq!(node.get("a").await.unwrap(), "1");
    assert_eq!(node.get_stats().secondary_hits, 1);
}

#[tokio::test]
async fn test_evicted_key_absent_everywhere_is_not_found() {
    let store = MemoryStore::new();
    let mut config = test_config("a");
    config.l1.max_capacity = 4;
    config.l1.eviction = EvictionKind::Lru;
    let (node, l1) = build_node_with_l1(&store, config).await;

    node.set("a", "1").await.unwrap();
    node.set("b", "2").await.unwrap();
    node.set("c", "3").await.unwrap();
    l1.run_pending_tasks().await;
    // 直接从L2删除，不产生消息
    store.delete("a").await.unwrap();

    assert_eq!(node.get("a").await, Err(CacheError::NotFound("a".to_string())));
}
