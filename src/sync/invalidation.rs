//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了失效消息的发布者和监听者，用于处理跨实例的缓存失效。

use crate::coordinator::CacheCoordinator;
use crate::error::{CacheError, Result};
use crate::sync::message::InvalidationMessage;
use async_trait::async_trait;
use futures::stream::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// 失效消息发布接口
///
/// 协调器通过该接口广播变更通知；发布失败是非致命的，
/// 由协调器记录日志后继续
#[async_trait]
pub trait InvalidationSink: Send + Sync {
    /// 发布一条失效消息
    async fn publish(&self, message: &InvalidationMessage) -> Result<()>;
}

/// 基于Redis Pub/Sub的失效发布者
///
/// 每个缓存名称一个逻辑频道
pub struct RedisPublisher {
    manager: redis::aio::ConnectionManager,
    channel: String,
    command_timeout_ms: u64,
}

impl RedisPublisher {
    /// 创建新的失效发布者
    ///
    /// # 参数
    ///
    /// * `manager` - 连接管理器
    /// * `channel` - 频道名称
    /// * `command_timeout_ms` - 发布超时时间（毫秒）
    pub fn new(
        manager: redis::aio::ConnectionManager,
        channel: String,
        command_timeout_ms: u64,
    ) -> Self {
        Self {
            manager,
            channel,
            command_timeout_ms,
        }
    }
}

#[async_trait]
impl InvalidationSink for RedisPublisher {
    #[instrument(skip(self, message), level = "debug", fields(channel = %self.channel))]
    async fn publish(&self, message: &InvalidationMessage) -> Result<()> {
        let payload = message.encode()?;
        let mut conn = self.manager.clone();
        let channel = self.channel.clone();

        let publish = async move {
            redis::cmd("PUBLISH")
                .arg(&channel)
                .arg(payload)
                .query_async::<i32>(&mut conn)
                .await
        };

        match timeout(Duration::from_millis(self.command_timeout_ms), publish).await {
            Ok(Ok(receivers)) => {
                debug!(
                    "Invalidation published: cache={}, key={:?}, receivers={}",
                    message.cache_name, message.key, receivers
                );
                Ok(())
            }
            Ok(Err(e)) => Err(CacheError::PublishFailure(e.to_string())),
            Err(_) => Err(CacheError::PublishFailure(format!(
                "Publish timed out after {}ms",
                self.command_timeout_ms
            ))),
        }
    }
}

/// 失效监听器
///
/// 每个开启同步的缓存名称一个，作为独立后台任务订阅失效频道，
/// 收到消息后对本实例的近端缓存执行驱逐。监听器存活于整个进程
/// 生命周期，连接丢失时重连并恢复订阅（不回放丢失的消息），
/// 仅在关闭信号到来时退出
pub struct InvalidationListener {
    client: redis::Client,
    coordinator: Arc<CacheCoordinator>,
    channel: String,
    cancel: CancellationToken,
}

impl InvalidationListener {
    /// 创建新的失效监听器
    ///
    /// # 参数
    ///
    /// * `client` - Redis客户端，用于建立独立的Pub/Sub连接
    /// * `coordinator` - 目标缓存的协调器
    /// * `channel` - 频道名称
    /// * `cancel` - 关闭信号
    pub fn new(
        client: redis::Client,
        coordinator: Arc<CacheCoordinator>,
        channel: String,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            coordinator,
            channel,
            cancel,
        }
    }

    /// 启动监听任务
    ///
    /// 返回任务句柄，任务在收到关闭信号后退出
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(self) {
        let mut backoff_ms: u64 = 500;
        debug!(
            "InvalidationListener started: cache={}, channel={}",
            self.coordinator.name(),
            self.channel
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.subscribe_and_dispatch().await {
                Ok(()) => break,
                Err(e) => {
                    // 订阅失败只影响收敛速度，记录后重连，绝不让监听任务退出
                    warn!(
                        "InvalidationListener: subscription lost for channel {}: {}, reconnecting in {}ms",
                        self.channel, e, backoff_ms
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
                    }
                    backoff_ms = (backoff_ms * 2).min(10_000);
                }
            }
        }

        debug!(
            "InvalidationListener stopped: channel={}",
            self.channel
        );
    }

    /// 建立订阅并分发消息，直到连接丢失或收到关闭信号
    ///
    /// 正常关闭返回Ok，连接问题返回SubscribeFailure交由run重连
    async fn subscribe_and_dispatch(&self) -> Result<()> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| CacheError::SubscribeFailure(e.to_string()))?;
        pubsub
            .subscribe(&self.channel)
            .await
            .map_err(|e| CacheError::SubscribeFailure(e.to_string()))?;

        debug!("InvalidationListener: subscribed to {}", self.channel);
        let mut stream = pubsub.on_message();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                msg = stream.next() => {
                    match msg {
                        Some(msg) => {
                            let payload: Vec<u8> = match msg.get_payload() {
                                Ok(payload) => payload,
                                Err(e) => {
                                    warn!("InvalidationListener: unreadable payload: {}", e);
                                    continue;
                                }
                            };
                            self.dispatch(&payload);
                        }
                        None => {
                            return Err(CacheError::SubscribeFailure(
                                "Pub/Sub stream closed".to_string(),
                            ));
                        }
                    }
                }
            }
        }
    }

    /// 解码并应用单条失效消息
    ///
    /// 解码失败或缓存名称不匹配的消息记录日志后跳过
    fn dispatch(&self, payload: &[u8]) {
        let message = match InvalidationMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    "InvalidationListener: dropping undecodable message on {}: {}",
                    self.channel, e
                );
                return;
            }
        };

        if message.cache_name != self.coordinator.name() {
            warn!(
                "InvalidationListener: message for cache {} received on channel {}, skipped",
                message.cache_name, self.channel
            );
            return;
        }

        self.coordinator.apply_invalidation(&message);
    }
}
