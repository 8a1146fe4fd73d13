//! Redis Hash 仓储
//!
//! 记录保存在 `<namespace>:<id>` 的 Hash 中，命名空间同名的 Set 维护 ID 索引

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use kvlab_errors::AppResult;
use kvlab_ports::{HashRecord, KeyValueRepository, Repository};
use tracing::debug;

use crate::store::RedisStore;

/// Redis 仓储
pub struct RedisRepository<T> {
    store: RedisStore,
    namespace: String,
    default_ttl: Option<Duration>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: HashRecord> RedisRepository<T> {
    pub fn new(store: RedisStore, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            default_ttl: None,
            _marker: PhantomData,
        }
    }

    /// 记录自身没有 TTL 时使用的默认值，0 表示永不过期
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl.filter(|t| !t.is_zero());
        self
    }

    /// 保存时实际使用的 TTL
    fn effective_ttl(&self, entity: &T) -> Option<Duration> {
        entity
            .ttl()
            .filter(|t| !t.is_zero())
            .or(self.default_ttl)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// 记录所在的键
    pub fn key_for(&self, id: &str) -> String {
        format!("{}:{}", self.namespace, id)
    }
}

#[async_trait]
impl<T: HashRecord + 'static> Repository<T, String> for RedisRepository<T> {
    async fn find_by_id(&self, id: &String) -> AppResult<Option<T>> {
        let fields = self.store.entries(&self.key_for(id)).await?;
        // 键不存在或已过期时 HGETALL 返回空
        if fields.is_empty() {
            return Ok(None);
        }
        T::from_hash(fields).map(Some)
    }

    /// 保存记录，整体替换旧字段并重新设置过期时间
    async fn save(&self, entity: &T) -> AppResult<()> {
        let id = entity.id().to_string();
        let key = self.key_for(&id);
        let fields = entity.to_hash();
        let ttl = self.effective_ttl(entity);

        self.store
            .run_transaction(|tx| {
                tx.delete(&key)
                    .put_all(&key, &fields)
                    .add_member(&self.namespace, &id);
                if let Some(ttl) = ttl {
                    tx.expire(&key, ttl);
                }
                Ok(())
            })
            .await?;

        debug!(
            key = %key,
            ttl_ms = ttl.map(|t| t.as_millis() as u64),
            "Record saved"
        );
        Ok(())
    }

    async fn delete(&self, id: &String) -> AppResult<bool> {
        let key = self.key_for(id);
        let replies = self
            .store
            .run_transaction(|tx| {
                tx.delete(&key).remove_member(&self.namespace, id);
                Ok(())
            })
            .await?;

        let removed = matches!(replies.first(), Some(redis::Value::Int(n)) if *n > 0);
        debug!(key = %key, removed, "Record deleted");
        Ok(removed)
    }

    async fn exists(&self, id: &String) -> AppResult<bool> {
        self.store.exists(&self.key_for(id)).await
    }
}

#[async_trait]
impl<T: HashRecord + 'static> KeyValueRepository<T> for RedisRepository<T> {
    /// 查询所有记录，顺带清理索引中已过期的 ID
    async fn find_all(&self) -> AppResult<Vec<T>> {
        let mut ids: Vec<String> = self.store.members(&self.namespace).await?.into_iter().collect();
        ids.sort();

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            match self.find_by_id(&id).await? {
                Some(record) => records.push(record),
                None => {
                    self.store.remove_member(&self.namespace, &id).await?;
                    debug!(namespace = %self.namespace, id = %id, "Expired id pruned from index");
                }
            }
        }
        Ok(records)
    }

    async fn count(&self) -> AppResult<u64> {
        self.store.cardinality(&self.namespace).await
    }

    async fn delete_all(&self) -> AppResult<u64> {
        let mut keys: Vec<String> = self
            .store
            .members(&self.namespace)
            .await?
            .iter()
            .map(|id| self.key_for(id))
            .collect();
        keys.push(self.namespace.clone());

        let removed = self.store.delete_many(&keys).await?;
        // 索引键本身也计入了删除数
        Ok(removed.saturating_sub(1))
    }
}
