//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的后端能力接口，包括L1本地缓存和L2共享存储。

pub mod l1;
pub mod l2;
pub mod memory;
pub mod redis_provider;

use crate::error::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use l1::MokaL1;
pub use l2::RedisStore;
pub use memory::MemoryStore;

/// 订阅得到的原始消息流，连接断开或被丢弃时结束
pub type MessageStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// 批量加载函数：只接收未命中的键，返回解析到的键值对
pub type BatchLoader =
    Box<dyn FnOnce(Vec<String>) -> BoxFuture<'static, Result<HashMap<String, String>>> + Send>;

/// L1缓存条目
///
/// 由L1缓存持有；在写入或回填时创建，被淘汰策略或显式失效移除
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    /// 最后一次写入时间，用于写入后刷新
    pub written_at: Instant,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            written_at: Instant::now(),
        }
    }

    /// 条目权重：键与值的字节长度之和
    pub fn weight(&self) -> u32 {
        (self.key.len() + self.value.len())
            .try_into()
            .unwrap_or(u32::MAX)
    }

    /// 自最后一次写入以来经过的时间
    pub fn age(&self) -> Duration {
        self.written_at.elapsed()
    }
}

/// L1命中统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct L1Stats {
    pub hits: u64,
    pub misses: u64,
}

/// L1本地缓存能力
///
/// 所有操作都在内存中完成，除短临界区外不阻塞；
/// 加载器只会阻塞其负责的键。
#[async_trait]
pub trait L1Cache: Send + Sync {
    /// 获取缓存值
    async fn get(&self, key: &str) -> Option<String> {
        self.get_entry(key).await.map(|entry| entry.value.clone())
    }

    /// 获取完整的缓存条目（包含写入时间）
    async fn get_entry(&self, key: &str) -> Option<Arc<CacheEntry>>;

    /// 写入缓存值
    async fn set(&self, key: &str, value: String);

    /// 仅当键不存在时写入
    ///
    /// # 返回值
    ///
    /// 本次调用写入了条目时返回 `true`；键已存在（例如被并发的本地写入抢先）时返回 `false`
    async fn insert_if_absent(&self, key: &str, value: String) -> bool;

    /// 仅当键的当前条目仍是 `expected` 时替换
    ///
    /// # 参数
    ///
    /// * `expected` - 之前读到的条目，按指针比较
    /// * `value` - 新值；`None` 表示删除该键
    ///
    /// # 返回值
    ///
    /// 条目被替换或删除时返回 `true`
    async fn replace_if_current(&self, expected: &Arc<CacheEntry>, value: Option<String>) -> bool;

    /// 使键失效，返回被移除的值
    async fn invalidate(&self, key: &str) -> Option<String>;

    /// 批量获取
    ///
    /// 只对未命中的键调用 `loader`，加载结果写入L1；
    /// 同一个键的并发未命中只会触发一次加载。
    async fn bulk_get(&self, keys: &[String], loader: BatchLoader)
        -> Result<HashMap<String, String>>;

    /// 命中统计
    fn stats(&self) -> L1Stats;

    /// 清空所有条目
    fn clear(&self);
}

/// L2共享存储能力
///
/// `get` 返回 `None` 表示键不存在（NotFound），错误表示传输失败。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait L2Store: Send + Sync {
    /// 获取值
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 写入值，`ttl` 为零表示不过期
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// 删除键
    async fn delete(&self, key: &str) -> Result<()>;

    /// 批量获取，返回结果与输入顺序一一对应
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// 向频道发布消息
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<()>;

    /// 订阅频道；返回时订阅已经生效
    async fn subscribe(&self, channel: &str) -> Result<MessageStream>;

    /// 检查连接是否正常
    async fn ping(&self) -> Result<()>;
}
