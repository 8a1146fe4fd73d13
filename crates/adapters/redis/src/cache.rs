//! Redis 命名缓存
//!
//! 缓存项存放在 `<cache>::<key>` 字符串键中，过期时间取自缓存配置。
//! 不做进程内缓存，每次调用都到达 Redis。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use kvlab_errors::{AppError, AppResult};
use kvlab_ports::CachePort;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::store::RedisStore;

/// 缓存配置
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// 默认 TTL，为空表示永不过期
    pub default_ttl: Option<Duration>,
    /// 按缓存名覆盖 TTL
    pub ttls: HashMap<String, Duration>,
    /// 缓存名与键之间的分隔符
    pub key_separator: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: None,
            ttls: HashMap::new(),
            key_separator: "::".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn with_cache_ttl(mut self, cache_name: impl Into<String>, ttl: Duration) -> Self {
        self.ttls.insert(cache_name.into(), ttl);
        self
    }

    /// 指定缓存的 TTL，0 表示永不过期
    pub fn ttl_for(&self, cache_name: &str) -> Option<Duration> {
        self.ttls
            .get(cache_name)
            .copied()
            .or(self.default_ttl)
            .filter(|ttl| !ttl.is_zero())
    }
}

/// 缓存管理器
#[derive(Clone)]
pub struct RedisCacheManager {
    store: RedisStore,
    config: CacheConfig,
}

impl RedisCacheManager {
    pub fn new(store: RedisStore, config: CacheConfig) -> Self {
        Self { store, config }
    }

    /// 获取命名缓存
    pub fn cache(&self, name: &str) -> RedisCache {
        RedisCache {
            name: name.to_string(),
            store: self.store.clone(),
            ttl: self.config.ttl_for(name),
            separator: self.config.key_separator.clone(),
        }
    }
}

/// 命名缓存
#[derive(Clone)]
pub struct RedisCache {
    name: String,
    store: RedisStore,
    ttl: Option<Duration>,
    separator: String,
}

impl RedisCache {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn entry_key(&self, key: &str) -> String {
        entry_key(&self.name, &self.separator, key)
    }

    pub async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.store.get(&self.entry_key(key)).await
    }

    pub async fn put(&self, key: &str, value: &str) -> AppResult<()> {
        let entry_key = self.entry_key(key);
        self.store.set(&entry_key, value, self.ttl).await?;
        debug!(cache = %self.name, key = %entry_key, "Cache entry stored");
        Ok(())
    }

    /// 删除缓存项，返回缓存项是否存在
    pub async fn evict(&self, key: &str) -> AppResult<bool> {
        let entry_key = self.entry_key(key);
        let removed = self.store.delete(&entry_key).await?;
        debug!(cache = %self.name, key = %entry_key, removed, "Cache entry evicted");
        Ok(removed)
    }

    /// 清空缓存，返回删除的条目数
    pub async fn clear(&self) -> AppResult<u64> {
        let pattern = format!(
            "{}{}*",
            escape_glob(&self.name),
            escape_glob(&self.separator)
        );
        let keys = self.store.scan_keys(&pattern).await?;
        let removed = self.store.delete_many(&keys).await?;
        debug!(cache = %self.name, removed, "Cache cleared");
        Ok(removed)
    }

    /// 读取并反序列化（JSON）
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        match self.get(key).await? {
            Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
                AppError::serialization(format!(
                    "Cached value {}{}{} is not valid: {}",
                    self.name, self.separator, key, e
                ))
            }),
            None => Ok(None),
        }
    }

    /// 序列化（JSON）后写入
    pub async fn put_as<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> AppResult<()> {
        let raw = serde_json::to_string(value)
            .map_err(|e| AppError::serialization(format!("Failed to serialize cache value: {}", e)))?;
        self.put(key, &raw).await
    }
}

#[async_trait]
impl CachePort for RedisCacheManager {
    async fn get(&self, cache_name: &str, key: &str) -> AppResult<Option<String>> {
        self.cache(cache_name).get(key).await
    }

    async fn put(&self, cache_name: &str, key: &str, value: &str) -> AppResult<()> {
        self.cache(cache_name).put(key, value).await
    }

    async fn evict(&self, cache_name: &str, key: &str) -> AppResult<()> {
        self.cache(cache_name).evict(key).await.map(|_| ())
    }

    async fn clear(&self, cache_name: &str) -> AppResult<u64> {
        self.cache(cache_name).clear().await
    }
}

fn entry_key(name: &str, separator: &str, key: &str) -> String {
    format!("{}{}{}", name, separator, key)
}

/// 转义 SCAN MATCH 的通配字符
fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
