//! 基础设施资源管理
//!
//! 连接池、Store、缓存管理器在启动时创建一次，之后由各组件共享

use std::sync::Arc;
use std::time::Duration;

use kvlab_adapter_redis::{
    CacheConfig, PoolStatus, RedisCacheManager, RedisConfig, RedisPool, RedisRepository,
    RedisStore, RetryConfig, with_retry,
};
use kvlab_config::{AppConfig, CacheSettings, RedisSettings};
use kvlab_errors::AppResult;
use kvlab_ports::HashRecord;
use secrecy::ExposeSecret;
use tracing::info;

/// 基础设施资源容器
pub struct Infrastructure {
    /// 应用配置
    config: AppConfig,
    /// Redis 连接池
    pool: Arc<RedisPool>,
    /// 命令入口
    store: RedisStore,
    /// 命名缓存
    cache_manager: RedisCacheManager,
}

impl Infrastructure {
    /// 从配置创建基础设施资源（带重试）
    pub async fn from_config(config: AppConfig) -> AppResult<Self> {
        let retry_config = RetryConfig::default();

        let redis_config = redis_config(&config.redis);
        info!(
            url = %redis_config.display_url(),
            pool_size = redis_config.pool_size,
            "Connecting to Redis"
        );

        let pool = with_retry(&retry_config, "Redis connection", || {
            let cfg = redis_config.clone();
            async move { RedisPool::new(cfg).await }
        })
        .await?;
        info!("Redis connection pool created");

        let pool = Arc::new(pool);
        let store = RedisStore::new(pool.clone());
        let cache_manager = RedisCacheManager::new(store.clone(), cache_config(&config.cache));

        Ok(Self {
            config,
            pool,
            store,
            cache_manager,
        })
    }

    /// 获取应用配置
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 获取 Store
    pub fn store(&self) -> RedisStore {
        self.store.clone()
    }

    /// 创建指定命名空间的仓储，默认 TTL 取自 `redis.default_ttl_secs`
    pub fn repository<T: HashRecord>(&self, namespace: &str) -> RedisRepository<T> {
        RedisRepository::new(self.store.clone(), namespace)
            .with_default_ttl(self.config.redis.default_ttl())
    }

    /// 获取缓存管理器（实现 CachePort trait）
    pub fn cache_manager(&self) -> RedisCacheManager {
        self.cache_manager.clone()
    }

    /// 获取连接池状态
    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// 检查 Redis 连接状态
    ///
    /// 返回 true 表示连接可用
    pub async fn check_redis_connection(&self) -> bool {
        self.pool.ping().await.is_ok()
    }

    /// 关闭连接池，之后的命令都会失败
    pub fn close(&self) {
        self.pool.close();
        info!("Infrastructure closed");
    }
}

fn redis_config(settings: &RedisSettings) -> RedisConfig {
    let mut config = RedisConfig::new(settings.host.clone(), settings.port)
        .with_database(settings.database)
        .with_pool_size(settings.pool_size)
        .with_acquire_timeout(settings.acquire_timeout())
        .with_operation_timeout(settings.operation_timeout());

    if let Some(password) = &settings.password {
        config = config.with_password(password.expose_secret().clone());
    }
    if let Some(ttl) = settings.default_ttl() {
        config = config.with_default_ttl(ttl);
    }
    config
}

fn cache_config(settings: &CacheSettings) -> CacheConfig {
    CacheConfig {
        default_ttl: settings.default_ttl_secs.map(Duration::from_secs),
        ttls: settings
            .ttls
            .iter()
            .map(|(name, secs)| (name.clone(), Duration::from_secs(*secs)))
            .collect(),
        key_separator: settings.key_separator.clone(),
    }
}
