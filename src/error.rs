//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的错误类型和处理机制。

use thiserror::Error;

/// 缓存系统错误类型枚举
///
/// 定义了缓存系统中可能发生的各种错误类型
#[derive(Error, Debug)]
pub enum CacheError {
    /// 共享存储不可达或操作超时
    ///
    /// `put`/`evict` 调用方会直接收到该错误；`get` 仅在近端缓存
    /// 未命中且共享存储同样失败时返回该错误
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    /// 失效消息发布失败
    ///
    /// 非致命错误，只影响其他实例的收敛速度，内部记录日志后继续
    #[error("Failed to publish invalidation message: {0}")]
    PublishFailure(String),

    /// 失效订阅连接丢失
    ///
    /// 监听器内部处理（重连并恢复订阅），不会传播到应用线程
    #[error("Invalidation subscription failed: {0}")]
    SubscribeFailure(String),

    /// 请求了未声明且无默认回退策略的缓存名称
    #[error("Unknown cache: {0}")]
    UnknownCache(String),

    /// 序列化/反序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// 关闭错误
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

/// 缓存操作结果类型别名
///
/// 简化错误处理，所有缓存操作都返回此类型
pub type Result<T> = std::result::Result<T, CacheError>;
