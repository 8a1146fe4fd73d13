//! Cache trait 定义

use async_trait::async_trait;
use kvlab_errors::AppResult;

/// 命名缓存 trait
///
/// 值以字符串形式存取，序列化由调用方负责。
/// 实现不得在进程内做额外缓存，每次调用都必须到达后端。
#[async_trait]
pub trait CachePort: Send + Sync {
    /// 获取缓存值
    async fn get(&self, cache_name: &str, key: &str) -> AppResult<Option<String>>;

    /// 写入缓存值，过期策略由缓存配置决定
    async fn put(&self, cache_name: &str, key: &str, value: &str) -> AppResult<()>;

    /// 删除缓存项
    async fn evict(&self, cache_name: &str, key: &str) -> AppResult<()>;

    /// 清空整个命名缓存，返回删除的条目数
    async fn clear(&self, cache_name: &str) -> AppResult<u64>;
}
