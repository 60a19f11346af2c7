//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了失效消息的线上格式。

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};

/// 失效消息
///
/// 在失效频道上广播的变更通知，JSON序列化。
/// `key` 为None时表示整个缓存被清空
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvalidationMessage {
    /// 缓存名称
    pub cache_name: String,
    /// 失效的键，None表示清空整个缓存
    pub key: Option<String>,
    /// 发起变更的实例标识
    ///
    /// 监听器据此跳过自己发出的消息（优化项，重复失效是幂等的）
    pub origin_instance_id: String,
    /// 消息发出时间（Unix毫秒时间戳）
    pub issued_at: i64,
}

impl InvalidationMessage {
    /// 构建单键失效消息
    pub fn evict(cache_name: &str, key: &str, origin_instance_id: &str) -> Self {
        Self {
            cache_name: cache_name.to_string(),
            key: Some(key.to_string()),
            origin_instance_id: origin_instance_id.to_string(),
            issued_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// 构建清空整个缓存的失效消息
    pub fn clear(cache_name: &str, origin_instance_id: &str) -> Self {
        Self {
            cache_name: cache_name.to_string(),
            key: None,
            origin_instance_id: origin_instance_id.to_string(),
            issued_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// 序列化为JSON字节
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CacheError::Serialization(e.to_string()))
    }

    /// 从JSON字节反序列化
    pub fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| CacheError::Serialization(e.to_string()))
    }
}

/// 计算缓存名称对应的失效频道名
pub fn channel_name(topic_prefix: &str, cache_name: &str) -> String {
    format!("{}:{}", topic_prefix, cache_name)
}
