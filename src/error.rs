//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分布式缓存的错误类型和处理机制。

use thiserror::Error;

/// 缓存系统错误类型枚举
///
/// 所有变体只携带字符串信息，因此错误可以被 `Clone`，
/// 以便在合并的加载任务之间共享同一个结果。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// 键在所有层级中都不存在，或加载器明确表示不存在
    #[error("Key not found: {0}")]
    NotFound(String),

    /// L2 不可达、连接断开或命令失败
    #[error("L2 transport error: {0}")]
    Transport(String),

    /// 失效消息解析失败
    #[error("Malformed sync message: {0}")]
    MessageDecode(String),

    /// 失效消息发布失败
    #[error("Publish failed: {0}")]
    Publish(String),

    /// 调用方提供的加载器失败
    #[error("Loader failed: {0}")]
    Loader(String),

    /// 批量加载器返回了未请求的键
    #[error("Loader result mismatch: {0}")]
    LoaderMismatch(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 所属的取消作用域已被取消
    #[error("Operation cancelled")]
    Cancelled,

    /// 协调器已关闭
    #[error("Cache is closed")]
    Closed,
}

impl CacheError {
    /// 是否为 NotFound
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Transport(err.to_string())
    }
}

/// 缓存操作结果类型别名
pub type Result<T> = std::result::Result<T, CacheError>;
