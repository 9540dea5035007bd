//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 批量加载集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{build_node, test_config};
use distcache::backend::{L2Store, MemoryStore};
use distcache::CacheError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|k| k.to_string()).collect()
}

#[tokio::test]
async fn test_bulk_get_partitions_l1_l2_and_loader() {
    let store = MemoryStore::new();
    let node = build_node(&store, test_config("a")).await;

    node.set("a", "1").await.unwrap();
    store.set("b", "2", Duration::ZERO).await.unwrap();

    let requested = Arc::new(Mutex::new(Vec::new()));
    let seen = requested.clone();
    let result = node
        .bulk_get_with_loader(&keys(&["a", "b", "c", "d"]), move |misses| async move {
            seen.lock().unwrap().extend(misses);
            Ok(HashMap::from([("c".to_string(), "3".to_string())]))
        })
        .await
        .unwrap();

    assert_eq!(*requested.lock().unwrap(), keys(&["c", "d"]));
    assert_eq!(result.len(), 3);
    assert_eq!(result["a"], "1");
    assert_eq!(result["b"], "2");
    assert_eq!(result["c"], "3");
    assert!(!result.contains_key("d"));

    // 加载结果走完整的写路径
    assert!(store.contains("c"));
    assert_eq!(node.get("c").await.unwrap(), "3");

    let stats = node.get_stats();
    assert_eq!(stats.loader_calls, 1);
    assert_eq!(stats.secondary_hits, 1);
}

#[tokio::test]
async fn test_duplicate_keys_collapse() {
    let store = MemoryStore::new();
    let node = build_node(&store, test_config("a")).await;

    let result = node
        .bulk_get_with_loader(&keys(&["x", "x", "y", "x"]), |misses| async move {
            assert_eq!(misses, keys(&["x", "y"]));
            Ok(misses.into_iter().map(|k| (k.clone(), k)).collect::<HashMap<_, _>>())
        })
        .await
        .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result["x"], "x");
}

#[tokio::test]
async fn test_all_hits_skip_loader() {
    let store = MemoryStore::new();
    let node = build_node(&store, test_config("a")).await;
    node.set("a", "1").await.unwrap();
    node.set("b", "2").await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let result = node
        .bulk_get_with_loader(&keys(&["a", "b"]), move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(HashMap::new())
        })
        .await
        .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(node.get_stats().loader_calls, 0);
}

#[tokio::test]
async fn test_unrequested_key_is_rejected() {
    let store = MemoryStore::new();
    let node = build_node(&store, test_config("a")).await;

    let result = node
        .bulk_get_with_loader(&keys(&["x"]), |_| async move {
            Ok(HashMap::from([
                ("x".to_string(), "1".to_string()),
                ("intruder".to_string(), "2".to_string()),
            ]))
        })
        .await;

    assert!(matches!(result, Err(CacheError::LoaderMismatch(_))));
    assert!(!store.contains("x"));
    assert!(!store.contains("intruder"));
    assert_eq!(store.publish_count(), 0);
}

#[tokio::test]
async fn test_loader_failure_surfaces() {
    let store = MemoryStore::new();
    let node = build_node(&store, test_config("a")).await;

    let result = node
        .bulk_get_with_loader(&keys(&["x"]), |_| async move {
            Err(CacheError::Transport("db down".to_string()))
        })
        .await;

    assert!(matches!(result, Err(CacheError::Loader(msg)) if msg.contains("db down")));
}

#[tokio::test]
async fn test_empty_request() {
    let store = MemoryStore::new();
    let node = build_node(&store, test_config("a")).await;
    let result = node
        .bulk_get_with_loader(&[], |_| async move { Ok(HashMap::new()) })
        .await
        .unwrap();
    assert!(result.is_empty());
}
