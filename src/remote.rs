//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了共享存储客户端接口和基于Redis的默认实现。

use crate::config::ConnectionConfig;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use secrecy::ExposeSecret;
use std::future::Future;
use tokio::time::{timeout, Duration};
use tracing::{debug, instrument};

/// 共享存储操作特征
///
/// 对远端权威键值存储的窄接口，所有操作以命名空间化的完整键为参数。
/// 任何传输失败或超时都以 `RemoteUnavailable` 暴露给调用方，
/// 由协调器决定如何降级
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 获取值，不存在则返回None
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 写入值
    ///
    /// # 参数
    ///
    /// * `key` - 命名空间化的完整键
    /// * `value` - 值字节
    /// * `ttl` - 过期时间（秒），None表示不过期
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<()>;

    /// 删除单个键，键不存在时同样返回成功
    async fn delete(&self, key: &str) -> Result<()>;

    /// 键是否存在
    async fn exists(&self, key: &str) -> Result<bool>;

    /// 删除指定前缀下的全部键，返回删除数量
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;

    /// 连通性检查
    async fn ping(&self) -> Result<()>;
}

/// 基于Redis的共享存储客户端
///
/// 持有可克隆的连接管理器，连接在所有缓存名称间共享；
/// 每条命令都带有限定超时
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    manager: ConnectionManager,
    command_timeout_ms: u64,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RedisStore")
    }
}

impl RedisStore {
    /// 建立到Redis的连接并创建客户端
    ///
    /// # 参数
    ///
    /// * `config` - 连接配置
    ///
    /// # 返回值
    ///
    /// 返回新的RedisStore实例或错误
    #[instrument(skip(config), level = "info", name = "init_redis_store")]
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let url_secret = &config.url;
        let url = if config.enable_tls && !url_secret.expose_secret().starts_with("rediss://") {
            url_secret.expose_secret().replace("redis://", "rediss://")
        } else {
            url_secret.expose_secret().to_string()
        };

        let client = Client::open(url.as_str())?;
        let manager = match timeout(
            Duration::from_millis(config.connection_timeout_ms),
            client.get_connection_manager(),
        )
        .await
        {
            Ok(res) => res?,
            Err(_) => {
                return Err(CacheError::RemoteUnavailable(format!(
                    "Connection timed out after {}ms",
                    config.connection_timeout_ms
                )));
            }
        };

        Ok(Self {
            client,
            manager,
            command_timeout_ms: config.command_timeout_ms,
        })
    }

    /// 获取底层Redis客户端
    ///
    /// 失效监听器用它建立独立的Pub/Sub连接
    pub fn raw_client(&self) -> Client {
        self.client.clone()
    }

    /// 获取共享的连接管理器
    ///
    /// 失效发布者复用该连接，不另建连接
    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    /// 获取命令超时时间（毫秒）
    pub fn command_timeout_ms(&self) -> u64 {
        self.command_timeout_ms
    }

    /// 为单条命令施加超时，超时和传输错误统一映射为RemoteUnavailable
    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>> + Send,
    {
        match timeout(Duration::from_millis(self.command_timeout_ms), fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(CacheError::RemoteUnavailable(e.to_string())),
            Err(_) => Err(CacheError::RemoteUnavailable(format!(
                "Command timed out after {}ms",
                self.command_timeout_ms
            ))),
        }
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let result: Option<Vec<u8>> = self.bounded(async move { conn.get(key).await }).await?;
        debug!("Remote get: key={}, found={}", key, result.is_some());
        Ok(result)
    }

    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<()> {
        let mut conn = self.manager.clone();
        match ttl {
            Some(ttl) if ttl > 0 => {
                self.bounded(async move { conn.set_ex::<_, _, ()>(key, value, ttl).await })
                    .await?;
            }
            _ => {
                self.bounded(async move { conn.set::<_, _, ()>(key, value).await })
                    .await?;
            }
        }
        debug!("Remote put: key={}, ttl={:?}", key, ttl);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        self.bounded(async move { conn.del::<_, ()>(key).await })
            .await?;
        debug!("Remote delete: key={}", key);
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let exists: bool = self.bounded(async move { conn.exists(key).await }).await?;
        Ok(exists)
    }

    /// 按前缀清空命名空间
    ///
    /// 使用SCAN游标遍历，避免阻塞Redis的KEYS命令
    #[instrument(skip(self), level = "debug")]
    async fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let pattern = format!("{}*", prefix);
        let mut deleted: u64 = 0;
        let mut cursor: u64 = 0;

        loop {
            let mut conn = self.manager.clone();
            let pattern = pattern.clone();
            let (next_cursor, keys): (u64, Vec<String>) = self
                .bounded(async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(100)
                        .query_async(&mut conn)
                        .await
                })
                .await?;

            if !keys.is_empty() {
                let mut conn = self.manager.clone();
                let removed: u64 = self
                    .bounded(async move { conn.del(keys).await })
                    .await?;
                deleted += removed;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!("Remote delete_prefix: prefix={}, deleted={}", prefix, deleted);
        Ok(deleted)
    }

    #[instrument(skip(self), level = "debug")]
    async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: String = self
            .bounded(async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        Ok(())
    }
}
