//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 进程内的L2存储实现，多个协调器可以共享同一个实例，
//! 用于测试、基准测试和单进程部署。

use super::{L2Store, MessageStream};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 1024;

fn is_expired(expire_at: &Option<Instant>) -> bool {
    matches!(expire_at, Some(at) if Instant::now() >= *at)
}

#[derive(Default)]
struct Inner {
    data: DashMap<String, (String, Option<Instant>)>,
    channels: DashMap<String, broadcast::Sender<Vec<u8>>>,
    unavailable: AtomicBool,
    read_delay_ms: AtomicU64,
    publishes: AtomicU64,
}

/// 内存L2存储
///
/// 克隆得到的实例共享同一份数据和频道
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// 创建空的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟读取延迟
    ///
    /// `get` 与 `mget` 先读取当前值，再等待 `delay` 后返回，
    /// 相当于响应在网络上被延迟；传入零表示取消延迟。
    pub fn set_read_delay(&self, delay: Duration) {
        let millis = delay.as_millis().try_into().unwrap_or(u64::MAX);
        self.inner.read_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// 模拟L2不可用：之后的所有操作都返回传输错误
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// 成功发布的消息数
    pub fn publish_count(&self) -> u64 {
        self.inner.publishes.load(Ordering::SeqCst)
    }

    /// 直接检查键是否存在（不经过可用性检查）
    pub fn contains(&self, key: &str) -> bool {
        self.read(key).is_some()
    }

    fn check(&self) -> Result<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Transport(
                "memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn read(&self, key: &str) -> Option<String> {
        if let Some(entry) = self.inner.data.get(key) {
            let (value, expire_at) = entry.value();
            if !is_expired(expire_at) {
                return Some(value.clone());
            }
        }
        // 只删除仍然过期的条目，期间被重新写入的值保留
        self.inner
            .data
            .remove_if(key, |_, (_, expire_at)| is_expired(expire_at));
        None
    }

    async fn delay_read(&self) {
        let millis = self.inner.read_delay_ms.load(Ordering::SeqCst);
        if millis > 0 {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Vec<u8>> {
        self.inner
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl L2Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        let value = self.read(key);
        self.delay_read().await;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check()?;
        let expire_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.inner
            .data
            .insert(key.to_string(), (value.to_string(), expire_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        self.inner.data.remove(key);
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.check()?;
        let values = keys.iter().map(|key| self.read(key)).collect();
        self.delay_read().await;
        Ok(values)
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<()> {
        self.check()?;
        let receivers = self.sender(channel).send(payload.to_vec()).unwrap_or(0);
        self.inner.publishes.fetch_add(1, Ordering::SeqCst);
        debug!("MemoryStore publish: channel={}, receivers={}", channel, receivers);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<MessageStream> {
        self.check()?;
        let rx = self.sender(channel).subscribe();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((payload, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("MemoryStore subscriber lagged, {} messages lost", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}
