//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 跨实例失效集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{build_node, build_node_with_l1, test_config, wait_until, WAIT};
use distcache::backend::{L1Cache, L2Store, MemoryStore};
use distcache::config::DEFAULT_CHANNEL;
use distcache::{MessageOutcome, SyncMessage};
use std::time::Duration;

#[tokio::test]
async fn test_write_on_one_instance_invalidates_the_other() {
    let store = MemoryStore::new();
    let a = build_node(&store, test_config("a")).await;
    let (b, b_l1) = build_node_with_l1(&store, test_config("b")).await;

    a.set("k", "v1").await.unwrap();
    assert_eq!(b.get("k").await.unwrap(), "v1");
    assert_eq!(b_l1.get("k").await, Some("v1".to_string()));

    a.set("k", "v2").await.unwrap();
    let b = &b;
    assert!(
        wait_until(WAIT, move || async move {
            b.get("k").await.ok().as_deref() == Some("v2")
        })
        .await
    );

    a.delete("k").await.unwrap();
    assert!(
        wait_until(WAIT, move || async move { b.get("k").await.is_err() }).await
    );
}

#[tokio::test]
async fn test_self_echo_is_a_no_op() {
    let store = MemoryStore::new();
    let (a, l1) = build_node_with_l1(&store, test_config("a")).await;

    a.set("k", "v").await.unwrap();
    let a = &a;
    assert!(
        wait_until(WAIT, move || async move {
            a.get_stats().self_echo_skipped == 1
        })
        .await
    );

    // 自己发出的Delete消息不会删除刚写入的本地值
    assert_eq!(l1.get("k").await, Some("v".to_string()));
    let stats = a.get_stats();
    assert_eq!(stats.messages_sent, 1);
    assert_eq!(stats.messages_received, 1);
}

#[tokio::test]
async fn test_applying_remote_message_never_publishes() {
    let store = MemoryStore::new();
    let a = build_node(&store, test_config("a")).await;
    let b = build_node(&store, test_config("b")).await;

    a.set("k", "v").await.unwrap();
    assert_eq!(store.publish_count(), 1);

    let b = &b;
    assert!(
        wait_until(WAIT, move || async move {
            b.get_stats().messages_received == 1
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(store.publish_count(), 1);
    assert_eq!(b.get_stats().messages_sent, 0);
}

#[tokio::test]
async fn test_malformed_payload_does_not_stop_listener() {
    let store = MemoryStore::new();
    let a = build_node(&store, test_config("a")).await;
    let b = build_node(&store, test_config("b")).await;

    store.publish(DEFAULT_CHANNEL, b"{not json").await.unwrap();
    let a = &a;
    assert!(
        wait_until(WAIT, move || async move {
            a.get_stats().messages_dropped == 1
        })
        .await
    );

    b.set("k", "v").await.unwrap();
    assert!(
        wait_until(WAIT, move || async move {
            a.get_stats().messages_received == 1
        })
        .await
    );
}

#[tokio::test]
async fn test_apply_remote_touches_l1_only() {
    let store = MemoryStore::new();
    let (a, l1) = build_node_with_l1(&store, test_config("a")).await;

    let payload = SyncMessage::set("k", "remote", "b").encode().unwrap();
    assert_eq!(a.apply_remote(&payload).await.unwrap(), MessageOutcome::Applied);

    assert_eq!(l1.get("k").await, Some("remote".to_string()));
    assert!(!store.contains("k"));
    assert_eq!(store.publish_count(), 0);

    let own = SyncMessage::delete("k", "a").encode().unwrap();
    assert_eq!(a.apply_remote(&own).await.unwrap(), MessageOutcome::SelfEcho);
    assert_eq!(l1.get("k").await, Some("remote".to_string()));
}

#[tokio::test]
async fn test_instances_on_other_channels_are_isolated() {
    let store = MemoryStore::new();
    let mut config = test_config("b");
    config.sync.channel = "other:sync".to_string();

    let a = build_node(&store, test_config("a")).await;
    let b = build_node(&store, config).await;
    assert_eq!(b.channel(), "other:sync");

    a.set("k", "v").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(b.get_stats().messages_received, 0);
}
