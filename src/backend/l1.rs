//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了L1缓存后端的实现，基于内存的高速缓存。

use super::{BatchLoader, CacheEntry, L1Cache, L1Stats};
use crate::config::{EvictionKind, L1Config};
use crate::error::Result;
use crate::sync::single_flight::SingleFlight;
use async_trait::async_trait;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use moka::policy::EvictionPolicy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument};

/// L1缓存后端实现
///
/// 使用Moka作为底层缓存库，按键值字节长度计算权重，
/// 以最后一次访问时间计算过期。
#[derive(Clone)]
pub struct MokaL1 {
    cache: Cache<String, Arc<CacheEntry>>,
    loads: SingleFlight,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl MokaL1 {
    /// 创建新的L1缓存后端实例
    ///
    /// # 参数
    ///
    /// * `config` - L1缓存配置
    pub fn new(config: &L1Config) -> Self {
        let mut builder = Cache::builder()
            .max_capacity(config.max_capacity)
            .weigher(|_key: &String, entry: &Arc<CacheEntry>| entry.weight());
        if config.ttl_secs > 0 {
            builder = builder.time_to_idle(config.ttl());
        }
        let builder = match config.eviction {
            EvictionKind::TinyLfu => builder.eviction_policy(EvictionPolicy::tiny_lfu()),
            EvictionKind::Lru => builder.eviction_policy(EvictionPolicy::lru()),
        };

        Self {
            cache: builder.build(),
            loads: SingleFlight::new(),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 执行挂起的维护任务（淘汰、过期清理）
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// 当前条目数（近似值）
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// 当前总权重（近似值）
    pub fn weighted_size(&self) -> u64 {
        self.cache.weighted_size()
    }

    async fn lookup(&self, key: &str) -> Option<Arc<CacheEntry>> {
        match self.cache.get(key).await {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }
}

#[async_trait]
impl L1Cache for MokaL1 {
    #[instrument(skip(self), level = "debug")]
    async fn get_entry(&self, key: &str) -> Option<Arc<CacheEntry>> {
        let entry = self.lookup(key).await;
        debug!("L1 get: key={}, found={}", key, entry.is_some());
        entry
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set(&self, key: &str, value: String) {
        self.cache
            .insert(key.to_string(), Arc::new(CacheEntry::new(key, value)))
            .await;
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn insert_if_absent(&self, key: &str, value: String) -> bool {
        let entry = self
            .cache
            .entry_by_ref(key)
            .or_insert_with(async { Arc::new(CacheEntry::new(key, value)) })
            .await;
        debug!("L1 insert_if_absent: key={}, inserted={}", key, entry.is_fresh());
        entry.is_fresh()
    }

    #[instrument(skip(self, expected, value), level = "debug", fields(key = %expected.key))]
    async fn replace_if_current(&self, expected: &Arc<CacheEntry>, value: Option<String>) -> bool {
        let key = expected.key.as_str();
        let result = self
            .cache
            .entry_by_ref(key)
            .and_compute_with(|current| {
                let op = match current {
                    Some(current) if Arc::ptr_eq(current.value(), expected) => match value {
                        Some(value) => Op::Put(Arc::new(CacheEntry::new(key, value))),
                        None => Op::Remove,
                    },
                    _ => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;
        let replaced = !matches!(result, CompResult::Unchanged(_) | CompResult::StillNone(_));
        debug!("L1 replace_if_current: key={}, replaced={}", key, replaced);
        replaced
    }

    #[instrument(skip(self), level = "debug")]
    async fn invalidate(&self, key: &str) -> Option<String> {
        let removed = self.cache.remove(key).await;
        debug!("L1 invalidate: key={}, was_present={}", key, removed.is_some());
        removed.map(|entry| entry.value.clone())
    }

    #[instrument(skip(self, loader), level = "debug", fields(key_count = keys.len()))]
    async fn bulk_get(
        &self,
        keys: &[String],
        loader: BatchLoader,
    ) -> Result<HashMap<String, String>> {
        let mut found = HashMap::with_capacity(keys.len());
        let mut misses: Vec<String> = Vec::new();
        for key in keys {
            if found.contains_key(key) || misses.contains(key) {
                continue;
            }
            match self.lookup(key).await {
                Some(entry) => {
                    found.insert(key.clone(), entry.value.clone());
                }
                None => misses.push(key.clone()),
            }
        }

        if misses.is_empty() {
            return Ok(found);
        }
        debug!("L1 bulk_get: {} hits, {} misses", found.len(), misses.len());

        let cache = self.cache.clone();
        let loaded = self
            .loads
            .run_batch(&misses, move |owned| async move {
                let mut values = loader(owned.clone()).await?;
                values.retain(|key, _| owned.contains(key));
                // 并发的本地写入优先，回填不覆盖已有条目
                for (key, value) in &values {
                    cache
                        .entry_by_ref(key.as_str())
                        .or_insert_with(async {
                            Arc::new(CacheEntry::new(key.as_str(), value.as_str()))
                        })
                        .await;
                }
                Ok(values)
            })
            .await?;

        found.extend(loaded);
        Ok(found)
    }

    fn stats(&self) -> L1Stats {
        L1Stats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn clear(&self) {
        debug!("L1 clear: invalidating all entries");
        self.cache.invalidate_all();
    }
}
