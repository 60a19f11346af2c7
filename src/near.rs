//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了近端缓存的实现，基于内存的有界LRU缓存。

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::debug;

/// 缓存值
///
/// `Absent` 是类型化的空值标记，表示共享存储中确认不存在该键，
/// 区别于"尚未加载"（近端缓存未命中）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    /// 已序列化的值字节
    Bytes(Vec<u8>),
    /// 确认缺失标记（负缓存）
    Absent,
}

/// 近端缓存条目
#[derive(Debug, Clone)]
struct NearEntry {
    value: CachedValue,
    #[allow(dead_code)]
    inserted_at: Instant,
    expires_at: Option<Instant>,
}

impl NearEntry {
    fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }
}

/// 近端缓存
///
/// 每实例、每缓存名称一个，条目数有界，容量压力下按
/// 最近最少使用（LRU）顺序淘汰；过期条目在访问时惰性移除。
///
/// 应用任务和失效监听器会并发调用，内部加锁，对外不暴露锁
pub struct NearCache {
    inner: Mutex<LruCache<String, NearEntry>>,
}

impl NearCache {
    /// 创建新的近端缓存实例
    ///
    /// # 参数
    ///
    /// * `max_entries` - 最大条目数，0会被提升为1
    pub fn new(max_entries: usize) -> Self {
        let cap = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(cap)),
        }
    }

    /// 获取缓存值
    ///
    /// 命中时将条目提升为最近使用；过期条目被移除并按未命中处理
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    ///
    /// # 返回值
    ///
    /// 返回缓存值（可能是 `Absent` 标记），不存在或已过期则返回None
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let expired = match guard.get(key) {
            Some(entry) => {
                if entry.is_expired(now) {
                    true
                } else {
                    return Some(entry.value.clone());
                }
            }
            None => return None,
        };
        if expired {
            guard.pop(key);
            debug!("NearCache get: key={}, expired=true, removed", key);
        }
        None
    }

    /// 插入或覆盖缓存值
    ///
    /// 已满时先淘汰最近最少使用的条目再插入
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `value` - 缓存值或缺失标记
    /// * `ttl` - 过期时间，None表示不过期（仍受容量淘汰约束）
    pub fn put(&self, key: &str, value: CachedValue, ttl: Option<Duration>) {
        let now = Instant::now();
        let entry = NearEntry {
            value,
            inserted_at: now,
            expires_at: ttl.map(|ttl| now + ttl),
        };
        let mut guard = self.inner.lock();
        guard.put(key.to_string(), entry);
        debug!("NearCache put: key={}, ttl={:?}", key, ttl);
    }

    /// 移除单个缓存条目
    ///
    /// 键不存在时为幂等的no-op
    pub fn invalidate(&self, key: &str) {
        let removed = self.inner.lock().pop(key).is_some();
        debug!("NearCache invalidate: key={}, removed={}", key, removed);
    }

    /// 清空全部缓存条目
    ///
    /// 缓存已空时为幂等的no-op
    pub fn invalidate_all(&self) {
        self.inner.lock().clear();
        debug!("NearCache invalidate_all: cleared");
    }

    /// 当前条目数
    ///
    /// 包含尚未被惰性移除的过期条目
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// 缓存是否为空
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
