//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 统计收集集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{build_node, test_config};
use distcache::backend::MemoryStore;
use distcache::{CacheStats, SyncMessage};

fn assert_not_decreasing(before: &CacheStats, after: &CacheStats) {
    assert!(after.primary_hits >= before.primary_hits);
    assert!(after.primary_misses >= before.primary_misses);
    assert!(after.secondary_hits >= before.secondary_hits);
    assert!(after.secondary_misses >= before.secondary_misses);
    assert!(after.messages_sent >= before.messages_sent);
    assert!(after.messages_received >= before.messages_received);
    assert!(after.self_echo_skipped >= before.self_echo_skipped);
    assert!(after.messages_dropped >= before.messages_dropped);
    assert!(after.loader_calls >= before.loader_calls);
}

#[tokio::test]
async fn test_counters_are_monotonic() {
    let store = MemoryStore::new();
    let node = build_node(&store, test_config("a")).await;
    let mut previous = node.get_stats();

    for i in 0..10 {
        let key = format!("k{}", i % 3);
        match i % 4 {
            0 => node.set(&key, "v").await.unwrap(),
            1 => {
                let _ = node.get(&key).await;
            }
            2 => node.delete(&key).await.unwrap(),
            _ => {
                let _ = node.get("never-written").await;
            }
        }
        let current = node.get_stats();
        assert_not_decreasing(&previous, &current);
        previous = current;
    }
}

#[tokio::test]
async fn test_hit_and_miss_counts() {
    let store = MemoryStore::new();
    let node = build_node(&store, test_config("a")).await;

    node.set("k", "v").await.unwrap();
    node.get("k").await.unwrap();
    node.get("k").await.unwrap();
    assert!(node.get("missing").await.is_err());

    let stats = node.get_stats();
    assert_eq!(stats.primary_hits, 2);
    assert_eq!(stats.primary_misses, 1);
    assert_eq!(stats.secondary_hits, 0);
    assert_eq!(stats.secondary_misses, 1);
    assert_eq!(stats.messages_sent, 1);
}

#[tokio::test]
async fn test_received_counts_are_exact_under_replay() {
    let store = MemoryStore::new();
    let node = build_node(&store, test_config("a")).await;

    for i in 0..5 {
        let payload = SyncMessage::delete(format!("remote{}", i), "b").encode().unwrap();
        node.apply_remote(&payload).await.unwrap();
    }
    for _ in 0..2 {
        let payload = SyncMessage::delete("own", "a").encode().unwrap();
        node.apply_remote(&payload).await.unwrap();
    }
    assert!(node.apply_remote(b"garbage").await.is_err());

    let stats = node.get_stats();
    assert_eq!(stats.messages_received, 7);
    assert_eq!(stats.self_echo_skipped, 2);
    assert_eq!(stats.messages_dropped, 1);
    assert_eq!(stats.messages_sent, 0);
}

#[tokio::test]
async fn test_snapshot_serializes_with_wire_names() {
    let store = MemoryStore::new();
    let node = build_node(&store, test_config("a")).await;
    node.set("k", "v").await.unwrap();

    let json = serde_json::to_value(node.get_stats()).unwrap();
    assert_eq!(json["syncMessagesSent"], 1);
    assert!(json.get("primaryHits").is_some());
    assert!(json.get("syncMessagesReceived").is_some());
}
