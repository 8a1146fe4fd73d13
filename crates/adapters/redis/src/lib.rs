//! kvlab-adapter-redis - Redis 适配器
//!
//! 连接池、类型化 Store 门面、Hash 仓储和命名缓存

mod cache;
mod config;
mod error;
mod pool;
mod repository;
mod retry;
mod store;

pub use cache::*;
pub use config::*;
pub use pool::*;
pub use repository::*;
pub use retry::*;
pub use store::*;

pub use redis::Value;
