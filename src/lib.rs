//! syncache - 两级一致性缓存库
//!
//! 提供近端内存缓存与远端共享缓存的两级读穿透方案，
//! 通过失效广播保持多实例间近端缓存的最终一致。

#![doc(html_root_url = "https://docs.rs/syncache/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod config;
pub mod coordinator;
pub mod error;
pub mod near;
pub mod registry;
pub mod remote;
pub mod sync;

// Re-export commonly used items
pub use config::{CacheConfig, Config, UnknownCachePolicy};
pub use coordinator::CacheCoordinator;
pub use error::{CacheError, Result};
pub use near::{CachedValue, NearCache};
pub use registry::CacheRegistry;
pub use remote::{RedisStore, RemoteStore};
pub use sync::invalidation::{InvalidationListener, InvalidationSink, RedisPublisher};
pub use sync::message::InvalidationMessage;

/// syncache 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
