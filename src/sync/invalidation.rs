//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存失效机制：发布者、本地静默应用路径和后台监听任务。

use crate::backend::{L1Cache, L2Store, MessageStream};
use crate::client::negative::NegativeCache;
use crate::error::{CacheError, Result};
use crate::stats::StatsCollector;
use crate::sync::message::{Operation, SyncMessage};
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// 缓存失效发布者
///
/// 负责向失效频道发布同步消息。发布失败只记录日志和计数，不影响触发它的写操作。
#[derive(Clone)]
pub struct InvalidationPublisher {
    l2: Arc<dyn L2Store>,
    channel: String,
    instance_id: String,
    stats: Arc<StatsCollector>,
}

impl InvalidationPublisher {
    /// 创建发布者
    ///
    /// # 参数
    ///
    /// * `l2` - 提供发布能力的共享存储
    /// * `channel` - 失效频道名称
    /// * `instance_id` - 写入每条消息的来源标识
    /// * `stats` - 记录发送成功与失败次数
    pub fn new(
        l2: Arc<dyn L2Store>,
        channel: String,
        instance_id: String,
        stats: Arc<StatsCollector>,
    ) -> Self {
        Self {
            l2,
            channel,
            instance_id,
            stats,
        }
    }

    /// 消息中携带的来源标识
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// 发布某个键的Delete消息
    #[instrument(skip(self), level = "debug")]
    pub async fn publish_delete(&self, key: &str) {
        self.publish(SyncMessage::delete(key, self.instance_id.as_str()))
            .await
    }

    /// 编码并发布一条消息，失败只记录日志和计数
    pub async fn publish(&self, message: SyncMessage) {
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode sync message for key {}: {}", message.key, e);
                self.stats.record_publish_failure();
                return;
            }
        };

        match self.l2.publish(&self.channel, &payload).await {
            Ok(()) => {
                self.stats.record_sent();
                debug!("InvalidationPublisher: published, key={}", message.key);
            }
            Err(e) => {
                self.stats.record_publish_failure();
                let err = CacheError::Publish(format!("channel {}: {}", self.channel, e));
                warn!("Invalidation for key {} not delivered: {}", message.key, err);
            }
        }
    }
}

/// 消息处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// 远端消息已应用到本地L1
    Applied,
    /// 本实例自己发出的消息，已忽略
    SelfEcho,
}

/// 本地静默应用路径
///
/// 只持有L1和不存在标记，无法访问L2或发布者，因此应用远端消息永远不会再次广播
pub struct LocalApplier {
    instance_id: String,
    l1: Arc<dyn L1Cache>,
    negative: NegativeCache,
    stats: Arc<StatsCollector>,
}

impl LocalApplier {
    /// 创建静默应用路径
    ///
    /// # 参数
    ///
    /// * `instance_id` - 本实例标识，来源相同的消息被忽略
    /// * `l1` - 被更新的本地缓存
    /// * `negative` - 应用消息时一并清除的不存在标记
    /// * `stats` - 记录接收、自身回环和丢弃次数
    pub fn new(
        instance_id: String,
        l1: Arc<dyn L1Cache>,
        negative: NegativeCache,
        stats: Arc<StatsCollector>,
    ) -> Self {
        Self {
            instance_id,
            l1,
            negative,
            stats,
        }
    }

    /// 解码并应用一条原始消息
    pub async fn apply(&self, payload: &[u8]) -> Result<MessageOutcome> {
        let message = match SyncMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                self.stats.record_dropped();
                return Err(e);
            }
        };
        self.stats.record_received();

        if message.is_from(&self.instance_id) {
            self.stats.record_self_echo();
            debug!("Skipping self-originated message, key={}", message.key);
            return Ok(MessageOutcome::SelfEcho);
        }

        match (message.operation, message.value) {
            (Operation::Set, Some(value)) => {
                debug!("Applying remote set, key={}", message.key);
                self.l1.set(&message.key, value).await;
            }
            _ => {
                debug!("Applying remote delete, key={}", message.key);
                self.l1.invalidate(&message.key).await;
            }
        }
        self.negative.clear(&message.key).await;
        Ok(MessageOutcome::Applied)
    }
}

/// 失效消息监听任务
///
/// 每个协调器只有一个；取消或消息流结束时退出
pub struct InvalidationListener {
    stream: MessageStream,
    applier: Arc<LocalApplier>,
    cancel: CancellationToken,
}

impl InvalidationListener {
    /// 基于已生效的订阅创建监听任务
    pub fn new(stream: MessageStream, applier: Arc<LocalApplier>, cancel: CancellationToken) -> Self {
        Self {
            stream,
            applier,
            cancel,
        }
    }

    /// 启动后台任务
    ///
    /// # 返回值
    ///
    /// 任务句柄；关闭协调器时等待它退出
    pub fn spawn(self) -> JoinHandle<()> {
        let Self {
            mut stream,
            applier,
            cancel,
        } = self;
        tokio::spawn(async move {
            debug!("InvalidationListener: started");
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("InvalidationListener: cancelled");
                        break;
                    }
                    next = stream.next() => match next {
                        Some(payload) => {
                            if let Err(e) = applier.apply(&payload).await {
                                warn!("Dropping malformed sync message: {}", e);
                            }
                        }
                        None => {
                            warn!("InvalidationListener: subscription stream ended");
                            break;
                        }
                    }
                }
            }
        })
    }
}
