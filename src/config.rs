//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分布式缓存的配置结构和解析逻辑。

use crate::error::{CacheError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 默认的失效频道名称
pub const DEFAULT_CHANNEL: &str = "cache:sync";

/// 分布式缓存配置
///
/// 在构造协调器时加载一次，此后在协调器生命周期内不可变
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// L1缓存配置
    pub l1: L1Config,
    /// L2缓存配置
    pub l2: L2Config,
    /// 跨实例同步配置
    pub sync: SyncConfig,
}

/// L1淘汰策略
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvictionKind {
    /// Moka 默认的 TinyLFU（带准入策略）
    #[default]
    TinyLfu,
    /// 严格的 LRU，超出容量时总是淘汰最久未使用的条目
    Lru,
}

/// L1缓存配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct L1Config {
    /// 最大容量（权重单位：键与值的字节长度之和）
    pub max_capacity: u64,
    /// 空闲过期时间（秒），以最后一次访问为准
    pub ttl_secs: u64,
    /// 写入后刷新间隔（秒），0表示禁用主动刷新
    pub refresh_after_secs: u64,
    /// 淘汰策略
    pub eviction: EvictionKind,
    /// 不存在标记的存活时间（秒），0表示禁用
    pub null_ttl_secs: u64,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            max_capacity: 64 * 1024 * 1024,
            ttl_secs: 300,
            refresh_after_secs: 60,
            eviction: EvictionKind::TinyLfu,
            null_ttl_secs: 0,
        }
    }
}

impl L1Config {
    /// 空闲过期时间
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// 写入后刷新间隔，禁用时为 `None`
    pub fn refresh_after(&self) -> Option<Duration> {
        (self.refresh_after_secs > 0).then(|| Duration::from_secs(self.refresh_after_secs))
    }

    pub fn null_ttl(&self) -> Option<Duration> {
        (self.null_ttl_secs > 0).then(|| Duration::from_secs(self.null_ttl_secs))
    }
}

/// Redis模式枚举
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RedisMode {
    /// 单机模式
    #[default]
    Standalone,
    /// 哨兵模式
    Sentinel,
}

/// 哨兵配置
#[derive(Deserialize, Clone, Debug)]
pub struct SentinelConfig {
    /// 主节点名称
    pub master_name: String,
    /// 哨兵节点列表
    pub nodes: Vec<String>,
}

/// L2缓存配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct L2Config {
    /// Redis模式
    pub mode: RedisMode,
    /// 连接字符串
    pub connection_string: SecretString,
    /// Redis 密码（可选），优先于连接字符串中携带的密码
    pub password: Option<SecretString>,
    /// 单机模式下选择的数据库编号
    pub db: i64,
    /// 是否启用 TLS
    pub enable_tls: bool,
    /// 哨兵配置
    pub sentinel: Option<SentinelConfig>,
    /// 连接超时时间（毫秒），只用于建立连接
    pub connection_timeout_ms: u64,
    /// 写入L2时使用的TTL（秒），0表示永不过期
    pub default_ttl_secs: u64,
}

impl Default for L2Config {
    fn default() -> Self {
        Self {
            mode: RedisMode::Standalone,
            connection_string: SecretString::new("redis://127.0.0.1:6379".into()),
            password: None,
            db: 0,
            enable_tls: false,
            sentinel: None,
            connection_timeout_ms: 5000,
            default_ttl_secs: 3600,
        }
    }
}

impl L2Config {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

/// 跨实例同步配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SyncConfig {
    /// 失效频道名称
    pub channel: String,
    /// 进程唯一的实例标识，用于过滤自身发出的消息
    pub instance_id: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            instance_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl Config {
    /// 从TOML字符串解析配置并验证
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| CacheError::Config(e.to_string()))?;
        config.validate().map_err(CacheError::Config)?;
        Ok(config)
    }

    /// 从TOML文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CacheError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有必需的字段都已设置，并且值在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        let l1 = &self.l1;
        if l1.max_capacity == 0 {
            return Err("L1 max_capacity cannot be zero".to_string());
        }

        // L1 条目必须有过期时间，跨实例的一致性依赖于它
        if l1.ttl_secs == 0 {
            return Err("L1 ttl_secs cannot be zero".to_string());
        }

        if l1.ttl_secs > 86400 * 30 {
            return Err("L1 ttl_secs cannot exceed 30 days (2592000 seconds)".to_string());
        }

        if l1.null_ttl_secs > l1.ttl_secs {
            return Err(format!(
                "L1 null_ttl_secs ({}) must be <= ttl_secs ({})",
                l1.null_ttl_secs, l1.ttl_secs
            ));
        }

        let l2 = &self.l2;
        if l2.default_ttl_secs > 0 && l1.ttl_secs > l2.default_ttl_secs {
            return Err(format!(
                "L1 TTL ({}) must be <= L2 TTL ({})",
                l1.ttl_secs, l2.default_ttl_secs
            ));
        }

        if !(100..=30000).contains(&l2.connection_timeout_ms) {
            return Err("L2 connection_timeout_ms must be between 100 and 30000 ms".to_string());
        }

        if l2.db < 0 {
            return Err(format!("L2 db ({}) cannot be negative", l2.db));
        }

        if l2.mode == RedisMode::Sentinel {
            if l2.db != 0 {
                return Err("L2 db is only supported in standalone mode".to_string());
            }
            match &l2.sentinel {
                Some(sentinel) if sentinel.nodes.is_empty() => {
                    return Err("Sentinel mode requires at least one node".to_string());
                }
                None => return Err("Sentinel mode requires a [l2.sentinel] section".to_string()),
                _ => {}
            }
        }

        if self.sync.channel.trim().is_empty() {
            return Err("Sync channel cannot be empty".to_string());
        }

        if self.sync.instance_id.trim().is_empty() {
            return Err("Sync instance_id cannot be empty".to_string());
        }

        Ok(())
    }
}
