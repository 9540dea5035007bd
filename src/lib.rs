//! distcache - 分布式两级缓存库
//!
//! 提供L1内存缓存和L2共享存储（Redis）的两级缓存，
//! 多个实例之间通过发布/订阅失效消息保持近似一致。

#![doc(html_root_url = "https://docs.rs/distcache/0.1.0")]

pub use tokio;
pub use tokio_util::sync::CancellationToken;

pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod stats;
pub mod sync;
pub mod telemetry;

// Re-export commonly used items
pub use backend::{L1Cache, L2Store, MemoryStore, MokaL1, RedisStore};
pub use client::DistributedCacheCoordinator;
pub use config::Config;
pub use error::{CacheError, Result};
pub use stats::CacheStats;
pub use sync::invalidation::MessageOutcome;
pub use sync::message::{Operation, SyncMessage};

/// distcache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
