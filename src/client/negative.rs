//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了本地的"已知不存在"标记，用于防止缓存穿透。

use moka::future::Cache;
use std::time::Duration;
use tracing::debug;

/// 不存在标记缓存
///
/// 未配置TTL时禁用，所有查询返回未标记
#[derive(Clone)]
pub struct NegativeCache {
    markers: Option<Cache<String, ()>>,
}

impl NegativeCache {
    /// 创建不存在标记缓存
    ///
    /// # 参数
    ///
    /// * `ttl` - 标记的存活时间；`None` 表示禁用，此时所有操作均为空操作
    pub fn new(ttl: Option<Duration>) -> Self {
        let markers = ttl.map(|ttl| {
            Cache::builder()
                .max_capacity(100_000)
                .time_to_live(ttl)
                .build()
        });
        Self { markers }
    }

    pub fn disabled() -> Self {
        Self { markers: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.markers.is_some()
    }

    /// 键是否带有仍然有效的标记
    pub async fn contains(&self, key: &str) -> bool {
        match &self.markers {
            Some(markers) => markers.get(key).await.is_some(),
            None => false,
        }
    }

    pub async fn mark(&self, key: &str) {
        if let Some(markers) = &self.markers {
            debug!("Negative marker recorded: key={}", key);
            markers.insert(key.to_string(), ()).await;
        }
    }

    pub async fn clear(&self, key: &str) {
        if let Some(markers) = &self.markers {
            markers.invalidate(key).await;
        }
    }

    pub fn clear_all(&self) {
        if let Some(markers) = &self.markers {
            markers.invalidate_all();
        }
    }
}
