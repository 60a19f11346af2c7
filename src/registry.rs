//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存注册表，负责按配置构建并管理所有命名缓存。

use crate::config::{CacheConfig, Config, UnknownCachePolicy};
use crate::coordinator::CacheCoordinator;
use crate::error::{CacheError, Result};
use crate::remote::{RedisStore, RemoteStore};
use crate::sync::invalidation::{InvalidationListener, InvalidationSink, RedisPublisher};
use crate::sync::message::channel_name;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// 缓存注册表
///
/// 启动时根据配置一次性构建，进程内所有调用方共享同一个实例。
/// 每个已声明的缓存名称对应一个协调器；开启同步的缓存各有一个
/// 失效监听任务，存活到 [`CacheRegistry::shutdown`] 被调用
pub struct CacheRegistry {
    config: Config,
    instance_id: String,
    remote: Arc<dyn RemoteStore>,
    /// Redis传输句柄，仅在通过 [`CacheRegistry::connect`] 构建时存在；
    /// 监听器和发布者都从这里派生
    transport: Option<RedisStore>,
    /// 注入的发布接口，仅在通过 [`CacheRegistry::with_store`] 构建时存在
    external_sink: Option<Arc<dyn InvalidationSink>>,
    coordinators: DashMap<String, Arc<CacheCoordinator>>,
    cancel: CancellationToken,
    listener_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("config", &self.config)
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

impl CacheRegistry {
    /// 连接共享存储并构建注册表
    ///
    /// 校验配置，建立Redis连接，为每个已声明的缓存名称创建协调器，
    /// 并为开启同步的缓存启动失效监听任务
    ///
    /// # 参数
    ///
    /// * `config` - 缓存系统配置
    ///
    /// # 返回值
    ///
    /// 返回新的注册表实例或错误
    #[instrument(skip(config), level = "info", fields(cache_count = config.caches.len()))]
    pub async fn connect(config: Config) -> Result<Self> {
        if let Err(e) = config.validate() {
            return Err(CacheError::ConfigError(e));
        }

        let store = RedisStore::connect(&config.connection).await?;
        let registry = Self {
            instance_id: uuid::Uuid::new_v4().simple().to_string(),
            remote: Arc::new(store.clone()),
            transport: Some(store),
            external_sink: None,
            coordinators: DashMap::new(),
            cancel: CancellationToken::new(),
            listener_handles: Mutex::new(Vec::new()),
            config,
        };

        registry.build_declared();
        info!(
            "CacheRegistry initialized: instance_id={}, caches={}",
            registry.instance_id,
            registry.coordinators.len()
        );
        Ok(registry)
    }

    /// 在注入的存储和发布接口之上构建注册表
    ///
    /// 不建立任何网络连接，也不启动监听任务，用于测试和嵌入场景。
    /// 远端失效消息由调用方通过
    /// [`CacheCoordinator::apply_invalidation`] 自行投递
    pub fn with_store(
        config: Config,
        remote: Arc<dyn RemoteStore>,
        sink: Option<Arc<dyn InvalidationSink>>,
    ) -> Result<Self> {
        if let Err(e) = config.validate() {
            return Err(CacheError::ConfigError(e));
        }

        let registry = Self {
            instance_id: uuid::Uuid::new_v4().simple().to_string(),
            remote,
            transport: None,
            external_sink: sink,
            coordinators: DashMap::new(),
            cancel: CancellationToken::new(),
            listener_handles: Mutex::new(Vec::new()),
            config,
        };

        registry.build_declared();
        Ok(registry)
    }

    /// 本进程实例标识
    ///
    /// 随失效消息广播，监听器据此跳过自己发出的消息
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// 获取指定名称的缓存协调器
    ///
    /// 已声明的名称返回启动时构建的协调器；未声明的名称按
    /// `unknown_cache_policy` 处理：`default` 策略下用默认配置
    /// 惰性创建并记住，`reject` 策略下返回 `UnknownCache` 错误
    ///
    /// # 参数
    ///
    /// * `name` - 缓存名称
    pub fn get_cache(&self, name: &str) -> Result<Arc<CacheCoordinator>> {
        if let Some(existing) = self.coordinators.get(name) {
            return Ok(existing.value().clone());
        }

        match self.config.sync.unknown_cache_policy {
            UnknownCachePolicy::Default => {
                let entry = self
                    .coordinators
                    .entry(name.to_string())
                    .or_insert_with(|| {
                        warn!(
                            "Cache '{}' not declared, created with default configuration",
                            name
                        );
                        self.build_coordinator(name, CacheConfig::default())
                    });
                Ok(entry.value().clone())
            }
            UnknownCachePolicy::Reject => Err(CacheError::UnknownCache(name.to_string())),
        }
    }

    /// 已注册的缓存名称列表
    pub fn cache_names(&self) -> Vec<String> {
        self.coordinators
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// 优雅关闭注册表
    ///
    /// 取消所有失效监听任务并等待它们退出；超时未退出的任务被中止
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down CacheRegistry, instance_id={}", self.instance_id);
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = self.listener_handles.lock().drain(..).collect();
        let mut errors = Vec::new();
        for handle in handles {
            let abort = handle.abort_handle();
            if tokio::time::timeout(std::time::Duration::from_secs(5), handle)
                .await
                .is_err()
            {
                warn!("Invalidation listener did not stop within 5s, aborting");
                abort.abort();
                errors.push("listener aborted after timeout".to_string());
            }
        }

        if !errors.is_empty() {
            return Err(CacheError::ShutdownError(errors.join("; ")));
        }

        info!("CacheRegistry shut down");
        Ok(())
    }

    /// 为配置中声明的每个缓存名称构建协调器
    fn build_declared(&self) {
        for (name, cache_config) in self.config.caches.clone() {
            let coordinator = self.build_coordinator(&name, cache_config);
            self.coordinators.insert(name, coordinator);
        }
    }

    /// 构建单个协调器，并在需要时启动它的失效监听任务
    fn build_coordinator(&self, name: &str, cache_config: CacheConfig) -> Arc<CacheCoordinator> {
        let sync_enabled = cache_config.sync_enabled;
        let channel = channel_name(&self.config.sync.topic_prefix, name);

        let sink: Option<Arc<dyn InvalidationSink>> = if !sync_enabled {
            None
        } else if let Some(transport) = &self.transport {
            Some(Arc::new(RedisPublisher::new(
                transport.manager(),
                channel.clone(),
                transport.command_timeout_ms(),
            )))
        } else {
            self.external_sink.clone()
        };

        let coordinator = Arc::new(CacheCoordinator::new(
            name.to_string(),
            cache_config,
            self.instance_id.clone(),
            self.remote.clone(),
            sink,
        ));

        if sync_enabled {
            if let Some(transport) = &self.transport {
                let listener = InvalidationListener::new(
                    transport.raw_client(),
                    coordinator.clone(),
                    channel,
                    self.cancel.child_token(),
                );
                self.listener_handles.lock().push(listener.start());
            }
        }

        coordinator
    }
}
