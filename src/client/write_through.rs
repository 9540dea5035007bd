//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了本地发起的写路径：先写L2，再更新L1，最后广播失效。

use super::negative::NegativeCache;
use crate::backend::{L1Cache, L2Store};
use crate::error::Result;
use crate::sync::invalidation::InvalidationPublisher;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// 写穿透路径
///
/// 每次成功写入都会发布一条Delete消息；L2失败时L1与频道均不受影响
#[derive(Clone)]
pub struct WriteThrough {
    l1: Arc<dyn L1Cache>,
    l2: Arc<dyn L2Store>,
    l2_ttl: Duration,
    negative: NegativeCache,
    publisher: InvalidationPublisher,
}

impl WriteThrough {
    /// 创建写穿透路径
    ///
    /// # 参数
    ///
    /// * `l1` - 本地缓存
    /// * `l2` - 共享存储
    /// * `l2_ttl` - 写入L2时使用的TTL，零表示不过期
    /// * `negative` - 写入成功后需要清除的不存在标记
    /// * `publisher` - 广播失效消息的发布者
    pub fn new(
        l1: Arc<dyn L1Cache>,
        l2: Arc<dyn L2Store>,
        l2_ttl: Duration,
        negative: NegativeCache,
        publisher: InvalidationPublisher,
    ) -> Self {
        Self {
            l1,
            l2,
            l2_ttl,
            negative,
            publisher,
        }
    }

    /// 写入：L2 -> L1 -> 清除标记 -> 广播Delete
    ///
    /// # 返回值
    ///
    /// L2写入失败时返回其错误，此时不会修改L1或广播
    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.l2.set(key, value, self.l2_ttl).await?;
        self.l1.set(key, value.to_string()).await;
        self.negative.clear(key).await;
        // 其他实例收到后只删除本地L1，下一次读取从L2回填
        self.publisher.publish_delete(key).await;
        debug!("Write-through set complete, key={}", key);
        Ok(())
    }

    /// 删除：L2 -> L1 -> 广播Delete
    #[instrument(skip(self), level = "debug")]
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.l2.delete(key).await?;
        self.l1.invalidate(key).await;
        self.publisher.publish_delete(key).await;
        debug!("Write-through delete complete, key={}", key);
        Ok(())
    }
}
