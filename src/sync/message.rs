//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了跨实例同步消息及其JSON线上格式。

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};

/// 同步操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Set,
    Delete,
}

/// 同步消息
///
/// 由本地发起的写操作产生，每个接收实例只消费一次，不持久化。
/// 字段顺序即线上格式的字段顺序。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub operation: Operation,
    pub key: String,
    /// 只在 `set` 消息中出现
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub instance_id: String,
    /// 产生时间，Unix纳秒
    pub timestamp: i64,
}

fn now_nanos() -> i64 {
    let now = chrono::Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1000))
}

impl SyncMessage {
    pub fn set(key: impl Into<String>, value: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            operation: Operation::Set,
            key: key.into(),
            value: Some(value.into()),
            instance_id: instance_id.into(),
            timestamp: now_nanos(),
        }
    }

    pub fn delete(key: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            operation: Operation::Delete,
            key: key.into(),
            value: None,
            instance_id: instance_id.into(),
            timestamp: now_nanos(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| CacheError::MessageDecode(e.to_string()))
    }

    /// 消息是否由指定实例发出
    pub fn is_from(&self, instance_id: &str) -> bool {
        self.instance_id == instance_id
    }
}
