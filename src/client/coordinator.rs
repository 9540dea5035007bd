//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分布式缓存协调器，串联L1、L2、失效频道和加载器。

use super::negative::NegativeCache;
use super::write_through::WriteThrough;
use crate::backend::{BatchLoader, L1Cache, L2Store, MokaL1, RedisStore};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::stats::{CacheStats, StatsCollector};
use crate::sync::invalidation::{
    InvalidationListener, InvalidationPublisher, LocalApplier, MessageOutcome,
};
use crate::sync::refresh::RefreshManager;
use crate::sync::single_flight::SingleFlight;
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// 分布式缓存协调器
///
/// 所有操作都可以被任意数量的调用方并发执行，通过 `Arc` 共享。
/// 构造时订阅失效频道并启动唯一的后台监听任务。
pub struct DistributedCacheCoordinator {
    instance_id: String,
    channel: String,
    l1: Arc<dyn L1Cache>,
    l2: Arc<dyn L2Store>,
    /// 本地发起的写路径（会广播）
    writer: WriteThrough,
    /// 远端消息的静默应用路径（不会广播）
    applier: Arc<LocalApplier>,
    refresh: RefreshManager,
    negative: NegativeCache,
    stats: Arc<StatsCollector>,
    loads: SingleFlight,
    cancel: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

fn loader_error(err: CacheError) -> CacheError {
    match err {
        CacheError::Loader(_) | CacheError::Cancelled => err,
        other => CacheError::Loader(other.to_string()),
    }
}

impl DistributedCacheCoordinator {
    /// 使用给定的L1/L2构造协调器
    ///
    /// `scope` 是调用方的取消范围；协调器使用它的子令牌，
    /// 取消 `scope` 会停止监听任务并使进行中的L2调用返回 `Cancelled`。
    ///
    /// # 参数
    ///
    /// * `config` - 协调器配置，构造时验证
    /// * `l1` - 本地缓存
    /// * `l2` - 共享存储，同时提供失效频道
    /// * `scope` - 调用方的取消范围
    ///
    /// # 返回值
    ///
    /// 订阅生效、监听任务启动后的协调器；配置无效返回 `Config`，订阅失败返回 `Transport`
    #[instrument(skip_all, level = "info", fields(instance_id = %config.sync.instance_id))]
    pub async fn new(
        config: Config,
        l1: Arc<dyn L1Cache>,
        l2: Arc<dyn L2Store>,
        scope: &CancellationToken,
    ) -> Result<Self> {
        config.validate().map_err(CacheError::Config)?;

        let Config { l1: l1_config, l2: l2_config, sync } = config;
        let cancel = scope.child_token();
        let stats = Arc::new(StatsCollector::new());
        let negative = NegativeCache::new(l1_config.null_ttl());

        let publisher = InvalidationPublisher::new(
            l2.clone(),
            sync.channel.clone(),
            sync.instance_id.clone(),
            stats.clone(),
        );
        let writer = WriteThrough::new(
            l1.clone(),
            l2.clone(),
            l2_config.default_ttl(),
            negative.clone(),
            publisher,
        );
        let applier = Arc::new(LocalApplier::new(
            sync.instance_id.clone(),
            l1.clone(),
            negative.clone(),
            stats.clone(),
        ));
        let refresh = RefreshManager::new(
            l1_config.refresh_after(),
            l1.clone(),
            l2.clone(),
            stats.clone(),
            cancel.clone(),
        );

        let stream = l2.subscribe(&sync.channel).await?;
        let handle = InvalidationListener::new(stream, applier.clone(), cancel.clone()).spawn();
        info!("Coordinator started, channel={}", sync.channel);

        Ok(Self {
            instance_id: sync.instance_id,
            channel: sync.channel,
            l1,
            l2,
            writer,
            applier,
            refresh,
            negative,
            stats,
            loads: SingleFlight::new(),
            cancel,
            listener: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
        })
    }

    /// 以Moka作为L1、Redis作为L2构造协调器
    ///
    /// # 参数
    ///
    /// * `config` - 协调器配置，L2部分决定Redis的部署模式
    /// * `scope` - 调用方的取消范围
    pub async fn connect(config: Config, scope: &CancellationToken) -> Result<Self> {
        let l1 = Arc::new(MokaL1::new(&config.l1));
        let l2 = Arc::new(RedisStore::connect(&config.l2).await?);
        Self::new(config, l1, l2, scope).await
    }

    /// 本实例的唯一标识
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// 失效频道名称
    pub fn channel(&self) -> &str {
        &self.channel
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed);
        }
        if self.cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }
        Ok(())
    }

    /// 在取消范围内执行，取消时立即返回 `Cancelled`
    async fn scoped<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(CacheError::Cancelled),
            result = fut => result,
        }
    }

    /// 获取缓存值
    ///
    /// L1命中直接返回（条目过旧时安排后台刷新）；未命中时读取L2并静默回填L1。
    #[instrument(skip(self), level = "debug")]
    pub async fn get(&self, key: &str) -> Result<String> {
        self.ensure_open()?;

        if let Some(entry) = self.l1.get_entry(key).await {
            if self.refresh.maybe_refresh(&entry) {
                debug!("Scheduled refresh, key={}", key);
            }
            return Ok(entry.value.clone());
        }

        match self.scoped(self.l2.get(key)).await? {
            Some(value) => {
                self.stats.record_l2_hit();
                // 读取L2期间可能已有本地写入，回填不能覆盖它
                if !self.l1.insert_if_absent(key, value.clone()).await {
                    debug!("L1 already populated during backfill, key={}", key);
                }
                Ok(value)
            }
            None => {
                self.stats.record_l2_miss();
                Err(CacheError::NotFound(key.to_string()))
            }
        }
    }

    /// 写入缓存值
    ///
    /// 先写L2，失败时直接返回错误，L1和频道均不变；
    /// 成功后更新L1并广播Delete消息。广播失败不影响返回值。
    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_open()?;
        self.scoped(self.writer.set(key, value)).await
    }

    /// 删除缓存值：L2 -> L1 -> 广播
    #[instrument(skip(self), level = "debug")]
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.ensure_open()?;
        self.scoped(self.writer.delete(key)).await
    }

    /// 获取缓存值，未命中时调用加载器
    ///
    /// 同一个键的并发调用共享一次加载器调用。加载器返回 `Ok(None)` 表示不存在。
    #[instrument(skip(self, loader), level = "debug")]
    pub async fn get_with_loader<F, Fut>(&self, key: &str, loader: F) -> Result<String>
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Option<String>>> + Send + 'static,
    {
        match self.get(key).await {
            Err(CacheError::NotFound(_)) => {}
            other => return other,
        }

        if self.negative.contains(key).await {
            debug!("Negative marker hit, skipping loader, key={}", key);
            return Err(CacheError::NotFound(key.to_string()));
        }

        let writer = self.writer.clone();
        let negative = self.negative.clone();
        let stats = self.stats.clone();
        let cancel = self.cancel.clone();
        let owned = key.to_string();
        // 加载在独立任务中运行，调用方超时后仍会完成并写入；只有取消范围能中止它
        let loaded = self
            .scoped(self.loads.run(key, move || async move {
                let load = async {
                    stats.record_loader_call();
                    match loader(owned.clone()).await.map_err(loader_error)? {
                        Some(value) => {
                            writer.set(&owned, &value).await?;
                            Ok::<_, CacheError>(Some(value))
                        }
                        None => {
                            negative.mark(&owned).await;
                            Ok(None)
                        }
                    }
                };
                tokio::select! {
                    _ = cancel.cancelled() => Err(CacheError::Cancelled),
                    result = load => result,
                }
            }))
            .await?;

        loaded.ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    /// 批量获取，未命中的键交给加载器一次性加载
    ///
    /// 重复的键会被合并；加载器只会收到L1和L2都未命中的键，
    /// 返回未请求的键时整批拒绝（`LoaderMismatch`），不写入任何值。
    /// 无法解析的键不出现在结果中。
    #[instrument(skip(self, keys, loader), level = "debug", fields(key_count = keys.len()))]
    pub async fn bulk_get_with_loader<F, Fut>(
        &self,
        keys: &[String],
        loader: F,
    ) -> Result<HashMap<String, String>>
    where
        F: FnOnce(Vec<String>) -> Fut,
        Fut: Future<Output = Result<HashMap<String, String>>>,
    {
        self.ensure_open()?;

        let mut seen = HashSet::with_capacity(keys.len());
        let unique: Vec<String> = keys
            .iter()
            .filter(|key| seen.insert(key.as_str()))
            .cloned()
            .collect();
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let l2 = self.l2.clone();
        let stats = self.stats.clone();
        let from_l2: BatchLoader = Box::new(move |misses: Vec<String>| {
            async move {
                let values = l2.mget(&misses).await?;
                if values.len() != misses.len() {
                    return Err(CacheError::Transport(format!(
                        "MGET returned {} values for {} keys",
                        values.len(),
                        misses.len()
                    )));
                }
                let mut found = HashMap::with_capacity(misses.len());
                for (key, value) in misses.into_iter().zip(values) {
                    match value {
                        Some(value) => {
                            stats.record_l2_hit();
                            found.insert(key, value);
                        }
                        None => stats.record_l2_miss(),
                    }
                }
                Ok(found)
            }
            .boxed()
        });
        let mut result = self.scoped(self.l1.bulk_get(&unique, from_l2)).await?;

        let mut remaining = Vec::new();
        for key in unique {
            if result.contains_key(&key) || self.negative.contains(&key).await {
                continue;
            }
            remaining.push(key);
        }
        if remaining.is_empty() {
            return Ok(result);
        }

        debug!("Bulk loader invoked for {} keys", remaining.len());
        self.stats.record_loader_call();
        let loaded = self
            .scoped(async { loader(remaining.clone()).await.map_err(loader_error) })
            .await?;

        if let Some(extra) = loaded.keys().find(|key| !remaining.contains(key)) {
            warn!("Bulk loader returned unrequested key {}", extra);
            return Err(CacheError::LoaderMismatch(format!(
                "loader returned unrequested key '{}'",
                extra
            )));
        }

        for (key, value) in loaded {
            self.scoped(self.writer.set(&key, &value)).await?;
            result.insert(key, value);
        }
        for key in remaining.iter().filter(|key| !result.contains_key(*key)) {
            self.negative.mark(key).await;
        }
        Ok(result)
    }

    /// 应用一条收到的原始消息（只影响本地L1，不会广播）
    ///
    /// 后台监听任务走同一条路径。
    pub async fn apply_remote(&self, payload: &[u8]) -> Result<MessageOutcome> {
        self.applier.apply(payload).await
    }

    /// 统计快照
    pub fn get_stats(&self) -> CacheStats {
        self.stats.snapshot(self.l1.stats())
    }

    /// 关闭协调器
    ///
    /// 停止监听任务、关闭订阅并清空L1；之后的操作返回 `Closed`。重复调用无副作用。
    #[instrument(skip(self), level = "info", fields(instance_id = %self.instance_id))]
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Closing coordinator");
        self.cancel.cancel();

        if let Some(handle) = self.listener.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Invalidation listener terminated abnormally: {}", e);
            }
        }

        self.l1.clear();
        self.negative.clear_all();
        info!("Coordinator closed");
    }
}

impl Drop for DistributedCacheCoordinator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
