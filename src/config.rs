//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的配置结构和解析逻辑。

use crate::error::{CacheError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

pub const CONFIG_VERSION: u32 = 1;

/// 缓存系统顶层配置
///
/// 由调用方在启动时提供（通常解析自TOML文件），`CacheRegistry`
/// 据此一次性构建所有命名缓存
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    /// 共享存储连接配置
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// 失效同步配置
    #[serde(default)]
    pub sync: SyncConfig,
    /// 命名缓存配置，键为缓存名称
    #[serde(default)]
    pub caches: HashMap<String, CacheConfig>,
}

/// 共享存储连接配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ConnectionConfig {
    /// 连接字符串
    pub url: SecretString,
    /// 连接建立超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 单条命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// 是否启用 TLS
    pub enable_tls: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: SecretString::new("redis://localhost:6379".to_string().into()),
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
            enable_tls: false,
        }
    }
}

/// 失效同步配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SyncConfig {
    /// 失效频道前缀，完整频道名为 `{topic_prefix}:{cache_name}`
    pub topic_prefix: String,
    /// 未声明缓存名称的处理策略
    pub unknown_cache_policy: UnknownCachePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            topic_prefix: "cache-sync".to_string(),
            unknown_cache_policy: UnknownCachePolicy::Default,
        }
    }
}

/// 未声明缓存名称的处理策略
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnknownCachePolicy {
    /// 回退到默认的 `CacheConfig` 并按需创建
    #[default]
    Default,
    /// 返回 `UnknownCache` 错误
    Reject,
}

/// 单个命名缓存的配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CacheConfig {
    /// 近端缓存条目过期时间（秒）
    pub local_ttl_secs: u64,
    /// 近端缓存最大条目数，超出时按LRU淘汰
    pub local_max_entries: usize,
    /// 近端缓存初始容量（建议值）
    pub local_initial_capacity: usize,
    /// 共享存储条目过期时间（秒）
    pub remote_ttl_secs: u64,
    /// 负缓存（确认缺失标记）过期时间（秒）
    pub negative_ttl_secs: u64,
    /// 是否对该缓存广播失效消息
    pub sync_enabled: bool,
    /// 共享存储键前缀，完整键为 `{remote_key_prefix}{cache_name}:{key}`
    pub remote_key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            local_ttl_secs: 60,
            local_max_entries: 10_000,
            local_initial_capacity: 256,
            remote_ttl_secs: 300,
            negative_ttl_secs: 30,
            sync_enabled: true,
            remote_key_prefix: String::new(),
        }
    }
}

impl Config {
    /// 从TOML字符串解析配置
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| CacheError::ConfigError(e.to_string()))?;
        Ok(config)
    }

    /// 从TOML文件解析配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有必需的字段都已设置，并且值在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        let timeout = self.connection.connection_timeout_ms;
        if !(100..=30000).contains(&timeout) {
            return Err("connection_timeout_ms must be between 100 and 30000 ms".to_string());
        }

        let timeout = self.connection.command_timeout_ms;
        if !(100..=60000).contains(&timeout) {
            return Err("command_timeout_ms must be between 100 and 60000 ms".to_string());
        }

        if self.sync.topic_prefix.is_empty() {
            return Err("sync.topic_prefix cannot be empty".to_string());
        }

        for (name, cache) in &self.caches {
            if name.is_empty() {
                return Err("Cache name cannot be empty".to_string());
            }

            if name.len() > 64 {
                return Err(format!(
                    "Cache name '{}' exceeds maximum length of 64 characters",
                    name
                ));
            }

            cache.validate(name)?;
        }

        Ok(())
    }
}

impl CacheConfig {
    /// 验证单个缓存配置
    pub fn validate(&self, name: &str) -> std::result::Result<(), String> {
        if self.local_ttl_secs == 0 {
            return Err(format!("Cache '{}' local_ttl_secs cannot be zero", name));
        }

        if self.remote_ttl_secs == 0 {
            return Err(format!("Cache '{}' remote_ttl_secs cannot be zero", name));
        }

        if self.remote_ttl_secs > 86400 * 30 {
            return Err(format!(
                "Cache '{}' remote_ttl_secs cannot exceed 30 days",
                name
            ));
        }

        // 近端TTL必须不大于远端TTL，否则近端可能长期持有已从
        // 共享存储过期的值
        if self.local_ttl_secs > self.remote_ttl_secs {
            return Err(format!(
                "Cache '{}' configuration error: local TTL ({}) must be <= remote TTL ({})",
                name, self.local_ttl_secs, self.remote_ttl_secs
            ));
        }

        if self.negative_ttl_secs == 0 {
            return Err(format!("Cache '{}' negative_ttl_secs cannot be zero", name));
        }

        if self.negative_ttl_secs > self.local_ttl_secs {
            return Err(format!(
                "Cache '{}' negative_ttl_secs ({}) must be <= local_ttl_secs ({})",
                name, self.negative_ttl_secs, self.local_ttl_secs
            ));
        }

        if self.local_max_entries == 0 {
            return Err(format!(
                "Cache '{}' local_max_entries cannot be zero",
                name
            ));
        }

        if self.local_max_entries > 10_000_000 {
            return Err(format!(
                "Cache '{}' local_max_entries cannot exceed 10,000,000",
                name
            ));
        }

        if self.local_initial_capacity > self.local_max_entries {
            return Err(format!(
                "Cache '{}' local_initial_capacity ({}) must be <= local_max_entries ({})",
                name, self.local_initial_capacity, self.local_max_entries
            ));
        }

        Ok(())
    }
}
