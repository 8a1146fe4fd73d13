//! Catalog Service Library
//!
//! - `product`: 商品记录及其 Hash 映射
//! - `service`: 带读穿缓存的商品服务
//! - `publisher`: 定时向频道发布客户消息

pub mod product;
pub mod publisher;
pub mod service;
