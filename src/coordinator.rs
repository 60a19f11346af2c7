//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存协调器，实现近端/共享两级之间的
//! 读穿透、写穿透和失效广播协议。

use crate::config::CacheConfig;
use crate::error::Result;
use crate::near::{CachedValue, NearCache};
use crate::remote::RemoteStore;
use crate::sync::invalidation::InvalidationSink;
use crate::sync::message::InvalidationMessage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// 缓存协调器
///
/// 每个缓存名称一个，独占本名称的近端缓存，与其他名称共享
/// 远端存储连接。所有应用侧的读写都经过协调器；失效监听器
/// 通过 [`CacheCoordinator::apply_invalidation`] 应用远端变更通知。
///
/// 写路径先写共享存储（权威数据源），成功后驱逐本地条目而不是
/// 直接覆盖，迫使下一次读重新从共享存储取值，从而避免与并发
/// 写者之间的新旧值竞争
pub struct CacheCoordinator {
    name: String,
    config: CacheConfig,
    instance_id: String,
    near: NearCache,
    remote: Arc<dyn RemoteStore>,
    sink: Option<Arc<dyn InvalidationSink>>,
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

impl CacheCoordinator {
    /// 创建新的缓存协调器
    ///
    /// # 参数
    ///
    /// * `name` - 缓存名称
    /// * `config` - 该名称的缓存配置
    /// * `instance_id` - 本进程实例标识
    /// * `remote` - 共享存储客户端
    /// * `sink` - 失效消息发布接口，`sync_enabled`为false时传None
    pub fn new(
        name: String,
        config: CacheConfig,
        instance_id: String,
        remote: Arc<dyn RemoteStore>,
        sink: Option<Arc<dyn InvalidationSink>>,
    ) -> Self {
        let near = NearCache::new(config.local_max_entries);
        Self {
            name,
            config,
            instance_id,
            near,
            remote,
            sink,
        }
    }

    /// 缓存名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 该缓存的配置
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// 近端缓存当前条目数
    pub fn local_len(&self) -> usize {
        self.near.len()
    }

    /// 计算键在共享存储中的完整命名空间键
    fn remote_key(&self, key: &str) -> String {
        format!("{}{}:{}", self.config.remote_key_prefix, self.name, key)
    }

    /// 本缓存在共享存储中的命名空间前缀
    fn namespace_prefix(&self) -> String {
        format!("{}{}:", self.config.remote_key_prefix, self.name)
    }

    fn local_ttl(&self) -> Duration {
        Duration::from_secs(self.config.local_ttl_secs)
    }

    fn negative_ttl(&self) -> Duration {
        Duration::from_secs(self.config.negative_ttl_secs)
    }

    /// 读取缓存值
    ///
    /// 近端命中直接返回（包括确认缺失标记，按未命中返回且不访问
    /// 共享存储）；近端未命中时读共享存储并回填近端。共享存储确认
    /// 缺失时回填有界TTL的缺失标记；共享存储不可达时原样传播错误，
    /// 不污染近端缓存
    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.near.get(key) {
            Some(CachedValue::Bytes(bytes)) => {
                debug!("Near hit: cache={}, key={}", self.name, key);
                return Ok(Some(bytes));
            }
            Some(CachedValue::Absent) => {
                debug!("Near negative hit: cache={}, key={}", self.name, key);
                return Ok(None);
            }
            None => {}
        }

        let remote_key = self.remote_key(key);
        match self.remote.get(&remote_key).await? {
            Some(bytes) => {
                self.near
                    .put(key, CachedValue::Bytes(bytes.clone()), Some(self.local_ttl()));
                debug!("Remote hit, near populated: cache={}, key={}", self.name, key);
                Ok(Some(bytes))
            }
            None => {
                // 有界的负缓存，避免确认缺失的键反复打到共享存储
                self.near
                    .put(key, CachedValue::Absent, Some(self.negative_ttl()));
                debug!("Remote miss, negative cached: cache={}, key={}", self.name, key);
                Ok(None)
            }
        }
    }

    /// 写入缓存值
    ///
    /// 先写共享存储（权威数据源），成功后驱逐本地条目并广播失效。
    /// 共享写入失败时错误原样返回，近端缓存保持不变
    #[instrument(skip(self, value), level = "debug", fields(cache = %self.name, value_len = value.len()))]
    pub async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let remote_key = self.remote_key(key);
        self.remote
            .put(&remote_key, value, Some(self.config.remote_ttl_secs))
            .await?;

        // 驱逐而非本地覆盖：下一次get会从共享存储重新取值
        self.near.invalidate(key);
        self.broadcast(InvalidationMessage::evict(
            &self.name,
            key,
            &self.instance_id,
        ))
        .await;
        Ok(())
    }

    /// 删除缓存值
    ///
    /// 语义与 [`CacheCoordinator::put`] 的第2、3步相同：
    /// 共享删除成功后驱逐本地条目并广播失效
    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    pub async fn evict(&self, key: &str) -> Result<()> {
        let remote_key = self.remote_key(key);
        self.remote.delete(&remote_key).await?;

        self.near.invalidate(key);
        self.broadcast(InvalidationMessage::evict(
            &self.name,
            key,
            &self.instance_id,
        ))
        .await;
        Ok(())
    }

    /// 清空整个缓存
    ///
    /// 按命名空间前缀清空共享存储，随后清空本地并广播清空消息
    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    pub async fn clear(&self) -> Result<()> {
        let prefix = self.namespace_prefix();
        let deleted = self.remote.delete_prefix(&prefix).await?;
        debug!("Cleared cache {}: {} remote entries removed", self.name, deleted);

        self.near.invalidate_all();
        self.broadcast(InvalidationMessage::clear(&self.name, &self.instance_id))
            .await;
        Ok(())
    }

    /// 键是否存在
    ///
    /// 近端未过期的条目（含缺失标记）直接回答，否则查询共享存储
    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self.near.get(key) {
            Some(CachedValue::Bytes(_)) => Ok(true),
            Some(CachedValue::Absent) => Ok(false),
            None => self.remote.exists(&self.remote_key(key)).await,
        }
    }

    /// 应用一条远端失效消息
    ///
    /// 发起实例在发布前已完成本地驱逐，自己的消息直接跳过；
    /// 对未知或已驱逐键的失效是幂等的no-op
    pub fn apply_invalidation(&self, message: &InvalidationMessage) {
        if message.origin_instance_id == self.instance_id {
            debug!(
                "Skipping own invalidation: cache={}, key={:?}",
                self.name, message.key
            );
            return;
        }

        match &message.key {
            Some(key) => {
                debug!("Applying remote invalidation: cache={}, key={}", self.name, key);
                self.near.invalidate(key);
            }
            None => {
                debug!("Applying remote clear: cache={}", self.name);
                self.near.invalidate_all();
            }
        }
    }

    /// 广播失效消息
    ///
    /// 共享写入此时已经持久，发布失败只延迟其他实例的收敛
    /// （受它们的本地TTL上界约束），记录日志后继续
    async fn broadcast(&self, message: InvalidationMessage) {
        if !self.config.sync_enabled {
            return;
        }
        let Some(sink) = &self.sink else {
            return;
        };
        if let Err(e) = sink.publish(&message).await {
            warn!(
                "Invalidation broadcast failed for cache {}: {}",
                self.name, e
            );
        }
    }
}
