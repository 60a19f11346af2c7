//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 真实Redis集成测试：存储客户端往返和两个注册表实例之间的
//! Pub/Sub失效收敛。Redis不可用时跳过。

#[path = "../common/mod.rs"]
mod common;

use std::time::Duration;
use syncache::config::{CacheConfig, Config, ConnectionConfig};
use syncache::registry::CacheRegistry;
use syncache::remote::{RedisStore, RemoteStore};
use tokio::time::sleep;

fn test_connection() -> ConnectionConfig {
    ConnectionConfig {
        url: common::redis_url().into(),
        connection_timeout_ms: 2000,
        command_timeout_ms: 1000,
        enable_tls: false,
    }
}

fn test_config(cache_name: &str) -> Config {
    let mut config = Config::default();
    config.connection = test_connection();
    config.caches.insert(
        cache_name.to_string(),
        CacheConfig {
            local_ttl_secs: 60,
            remote_ttl_secs: 300,
            negative_ttl_secs: 30,
            sync_enabled: true,
            ..Default::default()
        },
    );
    config
}

#[tokio::test]
async fn test_redis_store_round_trip() {
    common::setup_logging();

    if !common::is_redis_available().await {
        println!("Skipping test_redis_store_round_trip: Redis not available");
        return;
    }

    let store = RedisStore::connect(&test_connection())
        .await
        .expect("connect");

    let namespace = common::generate_unique_cache_name("store_rt");
    let key = format!("{}:k1", namespace);

    store
        .put(&key, b"hello".to_vec(), Some(60))
        .await
        .expect("put");
    assert_eq!(store.get(&key).await.expect("get"), Some(b"hello".to_vec()));
    assert!(store.exists(&key).await.expect("exists"));

    store.delete(&key).await.expect("delete");
    assert_eq!(store.get(&key).await.expect("get"), None);
    assert!(!store.exists(&key).await.expect("exists"));

    // 前缀清空只影响本命名空间
    let other = format!("other_{}", namespace);
    store
        .put(&format!("{}:a", namespace), b"1".to_vec(), Some(60))
        .await
        .expect("put");
    store
        .put(&format!("{}:b", namespace), b"2".to_vec(), Some(60))
        .await
        .expect("put");
    store
        .put(&format!("{}:c", other), b"3".to_vec(), Some(60))
        .await
        .expect("put");

    let deleted = store
        .delete_prefix(&format!("{}:", namespace))
        .await
        .expect("delete_prefix");
    assert_eq!(deleted, 2);
    assert!(store
        .exists(&format!("{}:c", other))
        .await
        .expect("exists"));
    store
        .delete(&format!("{}:c", other))
        .await
        .expect("cleanup");

    store.ping().await.expect("ping");
}

/// 端到端收敛：实例A的写入通过Pub/Sub使实例B的负缓存失效
#[tokio::test]
async fn test_cross_registry_invalidation_over_redis() {
    common::setup_logging();

    if !common::is_redis_available().await {
        println!("Skipping test_cross_registry_invalidation_over_redis: Redis not available");
        return;
    }

    let cache_name = common::generate_unique_cache_name("orders");
    let instance_a = CacheRegistry::connect(test_config(&cache_name))
        .await
        .expect("instance A");
    let instance_b = CacheRegistry::connect(test_config(&cache_name))
        .await
        .expect("instance B");
    assert_ne!(instance_a.instance_id(), instance_b.instance_id());

    let cache_a = instance_a.get_cache(&cache_name).expect("A cache");
    let cache_b = instance_b.get_cache(&cache_name).expect("B cache");

    // 等待两个监听器完成订阅
    sleep(Duration::from_millis(500)).await;

    // B先读取一个不存在的键，负缓存标记进入B的近端
    assert_eq!(cache_b.get("o1").await.expect("get"), None);

    // A写入。负缓存TTL是30秒，B若没有收到失效消息，
    // 接下来的读取仍会返回None
    cache_a
        .put("o1", br#"{"total":10}"#.to_vec())
        .await
        .expect("put");

    // 等待消息传播
    let mut converged = false;
    for _ in 0..20 {
        sleep(Duration::from_millis(100)).await;
        if cache_b.get("o1").await.expect("get") == Some(br#"{"total":10}"#.to_vec()) {
            converged = true;
            break;
        }
    }
    assert!(
        converged,
        "instance B did not converge to the value written by instance A"
    );

    // A本地也立即可见
    assert_eq!(
        cache_a.get("o1").await.expect("get"),
        Some(br#"{"total":10}"#.to_vec())
    );

    // 清理并关闭
    cache_a.clear().await.expect("clear");
    instance_a.shutdown().await.expect("shutdown A");
    instance_b.shutdown().await.expect("shutdown B");
}
