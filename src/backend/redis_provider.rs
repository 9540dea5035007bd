//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了Redis提供者接口和默认实现，负责按部署模式建立连接。

use crate::{
    config::{L2Config, RedisMode},
    error::{CacheError, Result},
};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client, ConnectionInfo, IntoConnectionInfo};
use secrecy::ExposeSecret;
use tokio::time::{timeout, Duration};
use tracing::info;

#[async_trait]
pub trait RedisProvider: Send + Sync {
    async fn get_standalone_client(&self, config: &L2Config)
        -> Result<(Client, ConnectionManager)>;
    async fn get_sentinel_client(&self, config: &L2Config) -> Result<(Client, ConnectionManager)>;

    /// 按配置的模式建立连接
    async fn connect(&self, config: &L2Config) -> Result<(Client, ConnectionManager)> {
        match config.mode {
            RedisMode::Standalone => self.get_standalone_client(config).await,
            RedisMode::Sentinel => self.get_sentinel_client(config).await,
        }
    }
}

pub struct DefaultRedisProvider;

/// 在连接超时内创建连接管理器，超时只作用于建立连接，不作用于后续命令
async fn open_manager(client: &Client, config: &L2Config, target: &str) -> Result<ConnectionManager> {
    match timeout(
        Duration::from_millis(config.connection_timeout_ms),
        client.get_connection_manager(),
    )
    .await
    {
        Ok(res) => Ok(res?),
        Err(_) => Err(CacheError::Transport(format!(
            "Connection timed out after {}ms. Target: {}",
            config.connection_timeout_ms, target
        ))),
    }
}

/// 构造单机模式的连接信息
///
/// 启用TLS时把 `redis://` 升级为 `rediss://`；配置中的密码和数据库编号
/// 覆盖连接字符串中的对应部分。
fn standalone_info(config: &L2Config) -> Result<ConnectionInfo> {
    let raw = config.connection_string.expose_secret();
    let connection_string = if config.enable_tls && !raw.starts_with("rediss://") {
        raw.replace("redis://", "rediss://")
    } else {
        raw.to_string()
    };

    let mut info = connection_string.as_str().into_connection_info()?;
    if let Some(password) = &config.password {
        info.redis.password = Some(password.expose_secret().to_string());
    }
    if config.db != 0 {
        info.redis.db = config.db;
    }
    Ok(info)
}

/// 构造哨兵URL：redis+sentinel://[:password@]host:port[,host:port]/service_name
fn sentinel_url(config: &L2Config) -> Result<String> {
    let sentinel_config = config.sentinel.as_ref().ok_or_else(|| {
        CacheError::Config("Sentinel configuration is missing".to_string())
    })?;

    let nodes: Vec<&str> = sentinel_config
        .nodes
        .iter()
        .map(|n| {
            n.trim_start_matches("redis://")
                .trim_start_matches("redis+sentinel://")
        })
        .collect();
    if nodes.is_empty() {
        return Err(CacheError::Config("No sentinel nodes provided".to_string()));
    }

    let mut url = "redis+sentinel://".to_string();
    if let Some(password) = &config.password {
        url.push_str(&format!(":{}@", password.expose_secret()));
    }
    url.push_str(&nodes.join(","));
    url.push('/');
    url.push_str(&sentinel_config.master_name);
    Ok(url)
}

#[async_trait]
impl RedisProvider for DefaultRedisProvider {
    async fn get_standalone_client(
        &self,
        config: &L2Config,
    ) -> Result<(Client, ConnectionManager)> {
        let client = Client::open(standalone_info(config)?)?;
        let manager = open_manager(&client, config, "standalone").await?;
        Ok((client, manager))
    }

    async fn get_sentinel_client(&self, config: &L2Config) -> Result<(Client, ConnectionManager)> {
        info!("Initializing Sentinel client with automatic failover support");
        let url = sentinel_url(config)?;
        let client = Client::open(url)?;
        let manager = open_manager(&client, config, "sentinel").await?;
        Ok((client, manager))
    }
}
