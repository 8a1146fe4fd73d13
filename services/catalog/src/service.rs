//! 商品服务
//!
//! 读穿缓存：先查 `products` 缓存，未命中时查仓储，仓储也没有时生成示例商品，
//! 结果写回缓存。保存写穿仓储与缓存，删除同时清理两者。

use std::sync::Arc;

use kvlab_errors::{AppError, AppResult};
use kvlab_ports::{CachePort, Repository};
use tracing::{debug, info};

use crate::product::Product;

/// 商品缓存名
pub const PRODUCT_CACHE: &str = "products";

/// 示例商品名称
pub const SAMPLE_PRODUCT_NAME: &str = "Sample";

pub struct ProductService {
    cache: Arc<dyn CachePort>,
    repository: Arc<dyn Repository<Product, String>>,
}

impl ProductService {
    pub fn new(
        cache: Arc<dyn CachePort>,
        repository: Arc<dyn Repository<Product, String>>,
    ) -> Self {
        Self { cache, repository }
    }

    /// 获取商品
    pub async fn get_product(&self, id: &str) -> AppResult<Product> {
        if let Some(cached) = self.cache.get(PRODUCT_CACHE, id).await? {
            debug!(product_id = id, "Product cache hit");
            return serde_json::from_str(&cached).map_err(|e| {
                AppError::serialization(format!("Cached product {} is unreadable: {}", id, e))
            });
        }

        let product = match self.repository.find_by_id(&id.to_string()).await? {
            Some(product) => product,
            None => {
                info!(product_id = id, "Product not stored, using sample");
                Product::new(id, SAMPLE_PRODUCT_NAME)
            }
        };

        self.cache_product(&product).await?;
        Ok(product)
    }

    /// 保存商品并刷新缓存
    pub async fn save(&self, product: &Product) -> AppResult<()> {
        self.repository.save(product).await?;
        self.cache_product(product).await?;
        info!(product_id = %product.id, "Product saved");
        Ok(())
    }

    /// 删除商品，返回仓储中是否存在过该商品
    pub async fn remove(&self, id: &str) -> AppResult<bool> {
        let removed = self.repository.delete(&id.to_string()).await?;
        self.cache.evict(PRODUCT_CACHE, id).await?;
        info!(product_id = id, removed, "Product removed");
        Ok(removed)
    }

    async fn cache_product(&self, product: &Product) -> AppResult<()> {
        let value = serde_json::to_string(product)
            .map_err(|e| AppError::serialization(e.to_string()))?;
        self.cache.put(PRODUCT_CACHE, &product.id, &value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::{mock, predicate::eq};

    mock! {
        pub Cache {}

        #[async_trait]
        impl CachePort for Cache {
            async fn get(&self, cache_name: &str, key: &str) -> AppResult<Option<String>>;
            async fn put(&self, cache_name: &str, key: &str, value: &str) -> AppResult<()>;
            async fn evict(&self, cache_name: &str, key: &str) -> AppResult<()>;
            async fn clear(&self, cache_name: &str) -> AppResult<u64>;
        }
    }

    mock! {
        pub ProductRepo {}

        #[async_trait]
        impl Repository<Product, String> for ProductRepo {
            async fn find_by_id(&self, id: &String) -> AppResult<Option<Product>>;
            async fn save(&self, entity: &Product) -> AppResult<()>;
            async fn delete(&self, id: &String) -> AppResult<bool>;
            async fn exists(&self, id: &String) -> AppResult<bool>;
        }
    }

    fn service(cache: MockCache, repo: MockProductRepo) -> ProductService {
        ProductService::new(Arc::new(cache), Arc::new(repo))
    }

    #[tokio::test]
    async fn test_cache_hit_skips_repository() {
        let cached = Product::new("P-001", "Sample").with_price(500);
        let json = serde_json::to_string(&cached).unwrap();

        let mut cache = MockCache::new();
        cache
            .expect_get()
            .with(eq(PRODUCT_CACHE), eq("P-001"))
            .times(1)
            .returning(move |_, _| Ok(Some(json.clone())));
        cache.expect_put().never();

        let mut repo = MockProductRepo::new();
        repo.expect_find_by_id().never();

        let product = service(cache, repo).get_product("P-001").await.unwrap();
        assert_eq!(product, cached);
    }

    #[tokio::test]
    async fn test_miss_builds_sample_and_caches_it() {
        let mut cache = MockCache::new();
        cache.expect_get().times(1).returning(|_, _| Ok(None));
        cache
            .expect_put()
            .withf(|name, key, value| {
                name == PRODUCT_CACHE && key == "P-001" && value.contains("\"Sample\"")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut repo = MockProductRepo::new();
        repo.expect_find_by_id()
            .with(eq("P-001".to_string()))
            .times(1)
            .returning(|_| Ok(None));

        let product = service(cache, repo).get_product("P-001").await.unwrap();
        assert_eq!(product.id, "P-001");
        assert_eq!(product.name, SAMPLE_PRODUCT_NAME);
    }

    #[tokio::test]
    async fn test_miss_loads_from_repository() {
        let stored = Product::new("1", "Contoh Product").with_price(20_000);
        let returned = stored.clone();

        let mut cache = MockCache::new();
        cache.expect_get().returning(|_, _| Ok(None));
        cache.expect_put().times(1).returning(|_, _, _| Ok(()));

        let mut repo = MockProductRepo::new();
        repo.expect_find_by_id()
            .times(1)
            .returning(move |_| Ok(Some(returned.clone())));

        let product = service(cache, repo).get_product("1").await.unwrap();
        assert_eq!(product, stored);
    }

    #[tokio::test]
    async fn test_unreadable_cache_entry() {
        let mut cache = MockCache::new();
        cache
            .expect_get()
            .returning(|_, _| Ok(Some("not json".to_string())));

        let err = service(cache, MockProductRepo::new())
            .get_product("P-001")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_save_writes_through() {
        let product = Product::new("P002", "Sample");

        let mut repo = MockProductRepo::new();
        repo.expect_save()
            .withf(|p| p.id == "P002")
            .times(1)
            .returning(|_| Ok(()));

        let mut cache = MockCache::new();
        cache
            .expect_put()
            .withf(|name, key, _| name == PRODUCT_CACHE && key == "P002")
            .times(1)
            .returning(|_, _, _| Ok(()));

        service(cache, repo).save(&product).await.unwrap();
    }

    #[tokio::test]
    async fn test_save_failure_leaves_cache_untouched() {
        let mut repo = MockProductRepo::new();
        repo.expect_save()
            .returning(|_| Err(AppError::backend_unavailable("connection reset")));

        let mut cache = MockCache::new();
        cache.expect_put().never();

        let err = service(cache, repo)
            .save(&Product::new("P002", "Sample"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_remove_evicts() {
        let mut repo = MockProductRepo::new();
        repo.expect_delete()
            .with(eq("P003".to_string()))
            .times(1)
            .returning(|_| Ok(false));

        let mut cache = MockCache::new();
        cache
            .expect_evict()
            .with(eq(PRODUCT_CACHE), eq("P003"))
            .times(1)
            .returning(|_, _| Ok(()));

        assert!(!service(cache, repo).remove("P003").await.unwrap());
    }
}
