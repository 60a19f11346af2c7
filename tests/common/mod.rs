//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。


use std::sync::Once;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(EnvFilter::new("debug"))
            .try_init()
            .ok();
    });
}

/// 生成唯一的缓存名称
///
/// 在基础名称后附加UUID，确保测试之间的隔离
#[allow(dead_code)]
pub fn generate_unique_cache_name(base: &str) -> String {
    format!("{}_{}", base, uuid::Uuid::new_v4().simple())
}

/// 检查Redis是否可用
///
/// 尝试连接到本地Redis实例并执行PING
#[allow(dead_code)]
pub async fn is_redis_available() -> bool {
    let url = redis_url();
    let client = match redis::Client::open(url.as_str()) {
        Ok(client) => client,
        Err(_) => return false,
    };
    let conn = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        client.get_multiplexed_async_connection(),
    )
    .await;
    let mut conn = match conn {
        Ok(Ok(conn)) => conn,
        _ => return false,
    };
    redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .is_ok()
}

/// 测试使用的Redis连接字符串
#[allow(dead_code)]
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}
