//! Redis Store 门面
//!
//! 按数据类型分组的类型化命令。每个请求/响应操作借出一个池化连接，
//! 在 `operation_timeout` 内执行一条命令后归还。门面不做重试。

mod batch;
mod geo;
mod pubsub;
mod stream;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kvlab_errors::{AppError, AppResult};
use kvlab_telemetry::{REDIS_COMMAND_ERRORS_TOTAL, REDIS_COMMANDS_TOTAL};
use redis::{Cmd, FromRedisValue, RedisResult};
use tracing::debug;

use crate::error::map_redis_error;
use crate::pool::RedisPool;

pub use batch::*;
pub use geo::*;
pub use pubsub::*;
pub use stream::*;

/// Redis Store
#[derive(Clone)]
pub struct RedisStore {
    pool: Arc<RedisPool>,
}

impl RedisStore {
    pub fn new(pool: Arc<RedisPool>) -> Self {
        Self { pool }
    }

    /// 底层连接池
    pub fn pool(&self) -> &Arc<RedisPool> {
        &self.pool
    }

    /// 执行单条命令
    pub(crate) async fn query<T: FromRedisValue>(
        &self,
        operation: &'static str,
        cmd: &Cmd,
    ) -> AppResult<T> {
        self.query_within(operation, self.pool.config().operation_timeout, cmd)
            .await
    }

    /// 执行单条命令，使用指定的超时
    pub(crate) async fn query_within<T: FromRedisValue>(
        &self,
        operation: &'static str,
        timeout: Duration,
        cmd: &Cmd,
    ) -> AppResult<T> {
        let mut conn = self.pool.acquire().await?;
        let result = self
            .bounded_within(operation, timeout, cmd.query_async::<T>(conn.connection_mut()))
            .await;
        record(operation, &result);
        result
    }

    /// 在命令超时内等待响应
    pub(crate) async fn bounded<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = RedisResult<T>>,
    ) -> AppResult<T> {
        self.bounded_within(operation, self.pool.config().operation_timeout, fut)
            .await
    }

    pub(crate) async fn bounded_within<T>(
        &self,
        operation: &'static str,
        timeout: Duration,
        fut: impl Future<Output = RedisResult<T>>,
    ) -> AppResult<T> {
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result.map_err(|e| map_redis_error(operation, e)),
            Err(_) => Err(AppError::backend_unavailable(format!(
                "Redis {} timed out after {:?}",
                operation, timeout
            ))),
        }
    }

    // ---------------------------------------------------------------
    // Keys
    // ---------------------------------------------------------------

    /// 删除键，返回键是否存在
    pub async fn delete(&self, key: &str) -> AppResult<bool> {
        let removed: i64 = self.query("DEL", redis::cmd("DEL").arg(key)).await?;
        Ok(removed > 0)
    }

    /// 批量删除，返回删除的键数
    pub async fn delete_many(&self, keys: &[String]) -> AppResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.query("DEL", redis::cmd("DEL").arg(keys)).await
    }

    pub async fn exists(&self, key: &str) -> AppResult<bool> {
        self.query("EXISTS", redis::cmd("EXISTS").arg(key)).await
    }

    /// 设置过期时间，键不存在时返回 false
    pub async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        let millis = ttl_millis(ttl)?;
        self.query("PEXPIRE", redis::cmd("PEXPIRE").arg(key).arg(millis))
            .await
    }

    /// 剩余存活时间，键不存在或没有过期时间时返回 None
    pub async fn ttl(&self, key: &str) -> AppResult<Option<Duration>> {
        let millis: i64 = self.query("PTTL", redis::cmd("PTTL").arg(key)).await?;
        // -2 表示键不存在，-1 表示没有过期时间
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }

    /// 按模式遍历键（SCAN，不阻塞服务端）
    pub async fn scan_keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = self
                .query(
                    "SCAN",
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(100),
                )
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }

    // ---------------------------------------------------------------
    // String
    // ---------------------------------------------------------------

    /// 设置字符串值，ttl 到期后由服务端自动删除
    pub async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl)?);
        }
        self.query::<()>("SET", &cmd).await?;
        debug!(key, ttl_ms = ttl.map(|t| t.as_millis() as u64), "Value set");
        Ok(())
    }

    pub async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.query("GET", redis::cmd("GET").arg(key)).await
    }

    // ---------------------------------------------------------------
    // List
    // ---------------------------------------------------------------

    /// 追加到列表尾部，返回列表长度
    pub async fn push_right(&self, key: &str, value: &str) -> AppResult<usize> {
        self.query("RPUSH", redis::cmd("RPUSH").arg(key).arg(value))
            .await
    }

    /// 从列表头部弹出
    pub async fn pop_left(&self, key: &str) -> AppResult<Option<String>> {
        self.query("LPOP", redis::cmd("LPOP").arg(key)).await
    }

    /// 列表区间，`stop = -1` 表示到末尾
    pub async fn range(&self, key: &str, start: isize, stop: isize) -> AppResult<Vec<String>> {
        self.query("LRANGE", redis::cmd("LRANGE").arg(key).arg(start).arg(stop))
            .await
    }

    // ---------------------------------------------------------------
    // Set
    // ---------------------------------------------------------------

    /// 添加成员，返回是否为新成员
    pub async fn add_member(&self, key: &str, value: &str) -> AppResult<bool> {
        let added: i64 = self
            .query("SADD", redis::cmd("SADD").arg(key).arg(value))
            .await?;
        Ok(added > 0)
    }

    pub async fn remove_member(&self, key: &str, value: &str) -> AppResult<bool> {
        let removed: i64 = self
            .query("SREM", redis::cmd("SREM").arg(key).arg(value))
            .await?;
        Ok(removed > 0)
    }

    pub async fn members(&self, key: &str) -> AppResult<HashSet<String>> {
        self.query("SMEMBERS", redis::cmd("SMEMBERS").arg(key)).await
    }

    pub async fn cardinality(&self, key: &str) -> AppResult<u64> {
        self.query("SCARD", redis::cmd("SCARD").arg(key)).await
    }

    // ---------------------------------------------------------------
    // Sorted set
    // ---------------------------------------------------------------

    /// 添加带分数的成员，返回是否为新成员（已存在时更新分数）
    pub async fn add_scored(&self, key: &str, value: &str, score: f64) -> AppResult<bool> {
        let added: i64 = self
            .query("ZADD", redis::cmd("ZADD").arg(key).arg(score).arg(value))
            .await?;
        Ok(added > 0)
    }

    /// 弹出分数最高的成员
    pub async fn pop_max(&self, key: &str) -> AppResult<Option<(String, f64)>> {
        let popped: Vec<(String, f64)> = self
            .query("ZPOPMAX", redis::cmd("ZPOPMAX").arg(key))
            .await?;
        Ok(popped.into_iter().next())
    }

    /// 按分数升序的排名区间
    pub async fn range_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> AppResult<Vec<String>> {
        self.query("ZRANGE", redis::cmd("ZRANGE").arg(key).arg(start).arg(stop))
            .await
    }

    // ---------------------------------------------------------------
    // Hash
    // ---------------------------------------------------------------

    /// 写入多个字段（单条 HSET，不会出现部分写入）
    pub async fn put_all<K, V>(&self, key: &str, mapping: &[(K, V)]) -> AppResult<()>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if mapping.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in mapping {
            cmd.arg(field.as_ref()).arg(value.as_ref());
        }
        self.query::<()>("HSET", &cmd).await
    }

    pub async fn hash_put(&self, key: &str, field: &str, value: &str) -> AppResult<()> {
        self.query::<()>("HSET", redis::cmd("HSET").arg(key).arg(field).arg(value))
            .await
    }

    pub async fn hash_get(&self, key: &str, field: &str) -> AppResult<Option<String>> {
        self.query("HGET", redis::cmd("HGET").arg(key).arg(field))
            .await
    }

    /// 全部字段，键不存在时返回空映射
    pub async fn entries(&self, key: &str) -> AppResult<HashMap<String, String>> {
        self.query("HGETALL", redis::cmd("HGETALL").arg(key)).await
    }

    // ---------------------------------------------------------------
    // HyperLogLog
    // ---------------------------------------------------------------

    /// 合并元素到基数估计器，返回估计值是否发生变化
    pub async fn add_elements<S: AsRef<str>>(&self, key: &str, elements: &[S]) -> AppResult<bool> {
        let mut cmd = redis::cmd("PFADD");
        cmd.arg(key);
        for element in elements {
            cmd.arg(element.as_ref());
        }
        self.query("PFADD", &cmd).await
    }

    /// 近似基数，误差是后端的固有属性（标准误差约 0.81%）
    pub async fn estimate_size(&self, key: &str) -> AppResult<u64> {
        self.query("PFCOUNT", redis::cmd("PFCOUNT").arg(key)).await
    }
}

fn record<T>(operation: &'static str, result: &AppResult<T>) {
    metrics::counter!(REDIS_COMMANDS_TOTAL, "operation" => operation).increment(1);
    if let Err(e) = result {
        metrics::counter!(
            REDIS_COMMAND_ERRORS_TOTAL,
            "operation" => operation,
            "kind" => e.kind()
        )
        .increment(1);
        debug!(operation, error = %e, "Redis command failed");
    }
}

/// TTL 转毫秒，0 会被服务端拒绝
pub(crate) fn ttl_millis(ttl: Duration) -> AppResult<u64> {
    let millis = ttl.as_millis();
    if millis == 0 {
        return Err(AppError::validation("TTL must be at least 1ms"));
    }
    u64::try_from(millis).map_err(|_| AppError::validation("TTL is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis() {
        assert_eq!(ttl_millis(Duration::from_secs(2)).unwrap(), 2_000);
        assert_eq!(ttl_millis(Duration::from_micros(1_500)).unwrap(), 1);
        assert!(matches!(
            ttl_millis(Duration::ZERO),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            ttl_millis(Duration::from_micros(999)),
            Err(AppError::Validation(_))
        ));
    }
}
