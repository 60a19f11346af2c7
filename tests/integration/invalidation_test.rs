//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 失效同步测试：消息线上格式、发起方短路和两实例间的
//! 写传播收敛（共享内存存储模拟远端，手动投递消息模拟总线）。

#[path = "../common/mod.rs"]
mod common;

use common::fakes::{FakeSink, FakeStore};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use syncache::config::{CacheConfig, Config};
use syncache::error::CacheError;
use syncache::registry::CacheRegistry;
use syncache::sync::message::{channel_name, InvalidationMessage};

#[test]
fn test_message_round_trips_through_json() {
    let message = InvalidationMessage::evict("orders", "o1", "inst-a");
    let payload = message.encode().expect("encode");
    let decoded = InvalidationMessage::decode(&payload).expect("decode");
    assert_eq!(decoded, message);
    assert!(decoded.issued_at > 0);

    let clear = InvalidationMessage::clear("orders", "inst-a");
    let decoded = InvalidationMessage::decode(&clear.encode().expect("encode")).expect("decode");
    assert_eq!(decoded.key, None);
}

#[test]
fn test_malformed_payload_is_a_serialization_error() {
    let err = InvalidationMessage::decode(b"not json at all").expect_err("must fail");
    assert!(matches!(err, CacheError::Serialization(_)));

    let err = InvalidationMessage::decode(br#"{"cache_name":"orders"}"#).expect_err("must fail");
    assert!(matches!(err, CacheError::Serialization(_)));
}

#[test]
fn test_channel_name_is_per_cache() {
    assert_eq!(channel_name("cache-sync", "orders"), "cache-sync:orders");
    assert_eq!(channel_name("custom", "users"), "custom:users");
}

fn orders_config() -> Config {
    let mut config = Config::default();
    config.caches.insert(
        "orders".to_string(),
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
async fn test_origin_instance_skips_own_message() {
    common::setup_logging();

    let store = Arc::new(FakeStore::new());
    let registry =
        CacheRegistry::with_store(orders_config(), store.clone(), None).expect("registry");
    let orders = registry.get_cache("orders").expect("orders");

    store.seed("orders:o1", b"value");
    orders.get("o1").await.expect("get");
    assert_eq!(orders.local_len(), 1);

    // 自己发出的消息被短路，近端条目保留
    let own = InvalidationMessage::evict("orders", "o1", registry.instance_id());
    orders.apply_invalidation(&own);
    assert_eq!(orders.local_len(), 1);

    // 其他实例的消息正常驱逐
    let foreign = InvalidationMessage::evict("orders", "o1", "someone-else");
    orders.apply_invalidation(&foreign);
    assert_eq!(orders.local_len(), 0);

    // 对已驱逐键重复应用是幂等的
    orders.apply_invalidation(&foreign);
    assert_eq!(orders.local_len(), 0);
}

#[tokio::test]
async fn test_clear_message_empties_near_cache() {
    common::setup_logging();

    let store = Arc::new(FakeStore::new());
    let registry =
        CacheRegistry::with_store(orders_config(), store.clone(), None).expect("registry");
    let orders = registry.get_cache("orders").expect("orders");

    store.seed("orders:o1", b"1");
    store.seed("orders:o2", b"2");
    orders.get("o1").await.expect("get");
    orders.get("o2").await.expect("get");
    assert_eq!(orders.local_len(), 2);

    orders.apply_invalidation(&InvalidationMessage::clear("orders", "someone-else"));
    assert_eq!(orders.local_len(), 0);
}

/// 规格场景：实例A写入orders缓存，实例B通过失效消息收敛。
///
/// 两个注册表共享同一个内存存储（模拟共享Redis），A发布的消息
/// 经过一次编解码后投递给B（模拟Pub/Sub线路）
#[tokio::test]
async fn test_two_instance_write_propagation() {
    common::setup_logging();

    let store = Arc::new(FakeStore::new());
    let sink_a = Arc::new(FakeSink::new());

    let instance_a = CacheRegistry::with_store(orders_config(), store.clone(), Some(sink_a.clone()))
        .expect("instance A");
    let instance_b =
        CacheRegistry::with_store(orders_config(), store.clone(), None).expect("instance B");

    let orders_a = instance_a.get_cache("orders").expect("A orders");
    let orders_b = instance_b.get_cache("orders").expect("B orders");

    // B先读取旧值，近端缓存被填充
    store.seed("orders:o1", br#"{"total":5}"#);
    assert_eq!(
        orders_b.get("o1").await.expect("get"),
        Some(br#"{"total":5}"#.to_vec())
    );

    // A写入新值：共享存储更新、A本地驱逐、失效消息发布
    orders_a
        .put("o1", br#"{"total":10}"#.to_vec())
        .await
        .expect("put");
    assert_eq!(store.raw_get("orders:o1"), Some(br#"{"total":10}"#.to_vec()));
    assert_eq!(orders_a.local_len(), 0);

    // A自己随后的读取绝不返回比刚写入更旧的值
    assert_eq!(
        orders_a.get("o1").await.expect("get"),
        Some(br#"{"total":10}"#.to_vec())
    );

    // 消息经过线上格式投递给B的监听器
    let wire = sink_a
        .last_message()
        .expect("A must publish")
        .encode()
        .expect("encode");
    orders_b.apply_invalidation(&InvalidationMessage::decode(&wire).expect("decode"));

    // B的近端被驱逐，下一次读取从共享存储取到新值并回填近端
    let get_calls_before = store.get_calls.load(Ordering::SeqCst);
    assert_eq!(
        orders_b.get("o1").await.expect("get"),
        Some(br#"{"total":10}"#.to_vec())
    );
    assert_eq!(store.get_calls.load(Ordering::SeqCst), get_calls_before + 1);

    // 回填后的重复读取不再访问共享存储
    assert_eq!(
        orders_b.get("o1").await.expect("get"),
        Some(br#"{"total":10}"#.to_vec())
    );
    assert_eq!(store.get_calls.load(Ordering::SeqCst), get_calls_before + 1);
}

#[tokio::test]
async fn test_eviction_propagates_negative_result() {
    common::setup_logging();

    let store = Arc::new(FakeStore::new());
    let sink_a = Arc::new(FakeSink::new());

    let instance_a = CacheRegistry::with_store(orders_config(), store.clone(), Some(sink_a.clone()))
        .expect("instance A");
    let instance_b =
        CacheRegistry::with_store(orders_config(), store.clone(), None).expect("instance B");

    let orders_a = instance_a.get_cache("orders").expect("A orders");
    let orders_b = instance_b.get_cache("orders").expect("B orders");

    store.seed("orders:o1", b"value");
    orders_b.get("o1").await.expect("get");

    orders_a.evict("o1").await.expect("evict");

    let wire = sink_a.last_message().expect("message").encode().expect("encode");
    orders_b.apply_invalidation(&InvalidationMessage::decode(&wire).expect("decode"));

    // B重新读取，共享存储已无此键
    assert_eq!(orders_b.get("o1").await.expect("get"), None);
}
