//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存客户端：协调器及其内部写路径。

pub mod coordinator;
pub mod negative;
pub mod write_through;

pub use coordinator::DistributedCacheCoordinator;
pub use negative::NegativeCache;
