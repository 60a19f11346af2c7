//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了跨实例的缓存失效同步机制。

pub mod invalidation;
pub mod message;
