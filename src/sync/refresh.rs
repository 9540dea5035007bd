//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了写入后刷新机制：L1命中较旧的条目时，在后台从L2重新读取。

use crate::backend::{CacheEntry, L1Cache, L2Store};
use crate::stats::StatsCollector;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 刷新管理器
///
/// 同一个键同时最多只有一个刷新任务；刷新结果只写本地L1，不发布消息
#[derive(Clone)]
pub struct RefreshManager {
    refresh_after: Option<Duration>,
    in_flight: Arc<DashMap<String, ()>>,
    l1: Arc<dyn L1Cache>,
    l2: Arc<dyn L2Store>,
    stats: Arc<StatsCollector>,
    cancel: CancellationToken,
}

impl RefreshManager {
    /// 创建刷新管理器
    ///
    /// # 参数
    ///
    /// * `refresh_after` - 条目写入后多久开始刷新；`None` 表示禁用
    /// * `l1` - 被刷新的本地缓存
    /// * `l2` - 刷新时读取的共享存储
    /// * `stats` - 统计收集器
    /// * `cancel` - 协调器的取消范围，取消后不再安排新的刷新
    pub fn new(
        refresh_after: Option<Duration>,
        l1: Arc<dyn L1Cache>,
        l2: Arc<dyn L2Store>,
        stats: Arc<StatsCollector>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            refresh_after,
            in_flight: Arc::new(DashMap::new()),
            l1,
            l2,
            stats,
            cancel,
        }
    }

    /// 正在进行的刷新任务数
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// 条目到期时安排一次后台刷新，返回是否新安排了任务
    ///
    /// 刷新结果只在L1中的条目仍是 `entry` 时生效，
    /// 期间发生的本地写入或远端失效不会被刷新结果覆盖。
    pub fn maybe_refresh(&self, entry: &Arc<CacheEntry>) -> bool {
        let Some(refresh_after) = self.refresh_after else {
            return false;
        };
        if entry.age() < refresh_after || self.cancel.is_cancelled() {
            return false;
        }
        if self.in_flight.insert(entry.key.clone(), ()).is_some() {
            return false;
        }

        let manager = self.clone();
        let entry = entry.clone();
        tokio::spawn(async move {
            manager.refresh(&entry).await;
            manager.in_flight.remove(&entry.key);
        });
        true
    }

    async fn refresh(&self, entry: &Arc<CacheEntry>) {
        let key = entry.key.as_str();
        let result = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = self.l2.get(key) => result,
        };
        self.stats.record_refresh();
        match result {
            Ok(Some(value)) => {
                if self.l1.replace_if_current(entry, Some(value)).await {
                    debug!("Refreshed L1 entry from L2, key={}", key);
                } else {
                    debug!("L1 entry changed during refresh, discarding result, key={}", key);
                }
            }
            Ok(None) => {
                if self.l1.replace_if_current(entry, None).await {
                    debug!("Refresh found key gone from L2, invalidated, key={}", key);
                }
            }
            Err(e) => warn!("Background refresh failed for key {}: {}", key, e),
        }
    }
}
