//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了L2共享存储的Redis实现，同时承载发布/订阅失效频道。

use super::redis_provider::{DefaultRedisProvider, RedisProvider};
use super::{L2Store, MessageStream};
use crate::config::L2Config;
use crate::error::Result;
use async_trait::async_trait;
use futures::StreamExt;
use redis::{aio::ConnectionManager, Client};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Redis L2存储
///
/// 命令走自动重连的 `ConnectionManager`；每次订阅使用独立的发布/订阅连接
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    manager: ConnectionManager,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RedisStore")
    }
}

impl RedisStore {
    /// 连接Redis并确认连接可用
    #[instrument(skip(config), level = "info", name = "init_l2_store", fields(mode = ?config.mode))]
    pub async fn connect(config: &L2Config) -> Result<Self> {
        Self::connect_with_provider(config, Arc::new(DefaultRedisProvider)).await
    }

    /// 使用指定的Redis提供者连接
    pub async fn connect_with_provider(
        config: &L2Config,
        provider: Arc<dyn RedisProvider>,
    ) -> Result<Self> {
        let (client, manager) = provider.connect(config).await?;
        let store = Self { client, manager };
        store.ping().await?;
        debug!("RedisStore connected");
        Ok(store)
    }
}

#[async_trait]
impl L2Store for RedisStore {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if !ttl.is_zero() {
            cmd.arg("EX").arg(ttl.as_secs().max(1));
        }
        cmd.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(key_count = keys.len()))]
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.manager.clone();
        let values: Vec<Option<String>> =
            redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;
        Ok(values)
    }

    #[instrument(skip(self, payload), level = "debug")]
    async fn publish(&self, channel: &str, payload: &[u8]) -> Result<()> {
        let mut conn = self.manager.clone();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        debug!("RedisStore publish: channel={}, receivers={}", channel, receivers);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn subscribe(&self, channel: &str) -> Result<MessageStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        debug!("RedisStore subscribed: channel={}", channel);
        let stream = pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec());
        Ok(Box::pin(stream))
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
