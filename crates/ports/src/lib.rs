//! ports - 抽象 trait 层
//!
//! 定义缓存与仓储的抽象接口，具体实现位于 adapters

mod cache;
mod record;
mod repository;

pub use cache::*;
pub use record::*;
pub use repository::*;
