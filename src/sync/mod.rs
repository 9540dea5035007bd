//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的同步机制，包括失效广播、单飞加载和写入后刷新。

pub mod invalidation;
pub mod message;
pub mod refresh;
pub mod single_flight;
