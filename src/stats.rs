//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的统计收集器：命中/未命中与同步消息流量。

use crate::backend::L1Stats;
use serde::Serialize;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// 统计收集器
///
/// 所有计数器单调递增，可被任意数量的任务并发更新
#[derive(Debug, Default)]
pub struct StatsCollector {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    self_echo_skipped: AtomicU64,
    messages_dropped: AtomicU64,
    publish_failures: AtomicU64,
    l2_hits: AtomicU64,
    l2_misses: AtomicU64,
    loader_calls: AtomicU64,
    refreshes: AtomicU64,
}

macro_rules! counter {
    ($record:ident, $field:ident) => {
        pub fn $record(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_sent, messages_sent);
    counter!(record_received, messages_received);
    counter!(record_self_echo, self_echo_skipped);
    counter!(record_dropped, messages_dropped);
    counter!(record_publish_failure, publish_failures);
    counter!(record_l2_hit, l2_hits);
    counter!(record_l2_miss, l2_misses);
    counter!(record_loader_call, loader_calls);
    counter!(record_refresh, refreshes);

    /// 生成快照
    ///
    /// 每个字段单独准确，但整体不是原子快照
    pub fn snapshot(&self, l1: L1Stats) -> CacheStats {
        CacheStats {
            primary_hits: l1.hits,
            primary_misses: l1.misses,
            secondary_hits: self.l2_hits.load(Ordering::Relaxed),
            secondary_misses: self.l2_misses.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            self_echo_skipped: self.self_echo_skipped.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            loader_calls: self.loader_calls.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
        }
    }
}

/// 缓存统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub primary_hits: u64,
    pub primary_misses: u64,
    pub secondary_hits: u64,
    pub secondary_misses: u64,
    #[serde(rename = "syncMessagesSent")]
    pub messages_sent: u64,
    #[serde(rename = "syncMessagesReceived")]
    pub messages_received: u64,
    #[serde(rename = "syncSelfEchoSkipped")]
    pub self_echo_skipped: u64,
    #[serde(rename = "syncMessagesDropped")]
    pub messages_dropped: u64,
    #[serde(rename = "syncPublishFailures")]
    pub publish_failures: u64,
    pub loader_calls: u64,
    pub refreshes: u64,
}

impl CacheStats {
    /// 以Prometheus文本格式输出
    pub fn to_prometheus(&self, instance_id: &str) -> String {
        let rows: [(&str, &str, u64); 11] = [
            ("cache_requests_total", "layer=\"l1\",result=\"hit\"", self.primary_hits),
            ("cache_requests_total", "layer=\"l1\",result=\"miss\"", self.primary_misses),
            ("cache_requests_total", "layer=\"l2\",result=\"hit\"", self.secondary_hits),
            ("cache_requests_total", "layer=\"l2\",result=\"miss\"", self.secondary_misses),
            ("cache_sync_messages_total", "direction=\"sent\"", self.messages_sent),
            ("cache_sync_messages_total", "direction=\"received\"", self.messages_received),
            ("cache_sync_messages_total", "direction=\"self_echo\"", self.self_echo_skipped),
            ("cache_sync_messages_total", "direction=\"dropped\"", self.messages_dropped),
            ("cache_sync_publish_failures_total", "", self.publish_failures),
            ("cache_loader_calls_total", "", self.loader_calls),
            ("cache_refreshes_total", "", self.refreshes),
        ];

        let mut output = String::new();
        for (name, labels, value) in rows {
            let sep = if labels.is_empty() { "" } else { "," };
            let _ = writeln!(
                output,
                "{}{{instance=\"{}\"{}{}}} {}",
                name, instance_id, sep, labels, value
            );
        }
        output
    }
}
