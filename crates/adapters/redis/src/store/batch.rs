//! 事务与管道
//!
//! 两者共用 [`Batch`] 记录命令：事务以 `MULTI … EXEC` 原子执行，
//! 管道只合并网络往返，不保证原子性。执行期间独占一个池化连接。

use std::time::Duration;

use kvlab_errors::{AppError, AppResult};
use redis::aio::ConnectionLike;
use redis::{Pipeline, Value};
use tracing::{debug, warn};

use super::{RedisStore, record, ttl_millis};
use crate::error::map_redis_error;

/// 待执行的命令批次
pub struct Batch {
    pipe: Pipeline,
    len: usize,
    error: Option<AppError>,
}

impl Batch {
    fn new() -> Self {
        Self {
            pipe: redis::pipe(),
            len: 0,
            error: None,
        }
    }

    /// 已记录的命令数
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn push(&mut self, name: &str) -> &mut Pipeline {
        self.len += 1;
        self.pipe.cmd(name)
    }

    fn fail(&mut self, err: AppError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub fn set(&mut self, key: &str, value: &str, ttl: Option<Duration>) -> &mut Self {
        match ttl.map(ttl_millis).transpose() {
            Ok(Some(millis)) => {
                self.push("SET").arg(key).arg(value).arg("PX").arg(millis);
            }
            Ok(None) => {
                self.push("SET").arg(key).arg(value);
            }
            Err(e) => self.fail(e),
        }
        self
    }

    pub fn get(&mut self, key: &str) -> &mut Self {
        self.push("GET").arg(key);
        self
    }

    pub fn delete(&mut self, key: &str) -> &mut Self {
        self.push("DEL").arg(key);
        self
    }

    pub fn expire(&mut self, key: &str, ttl: Duration) -> &mut Self {
        match ttl_millis(ttl) {
            Ok(millis) => {
                self.push("PEXPIRE").arg(key).arg(millis);
            }
            Err(e) => self.fail(e),
        }
        self
    }

    pub fn incr(&mut self, key: &str, by: i64) -> &mut Self {
        self.push("INCRBY").arg(key).arg(by);
        self
    }

    pub fn push_right(&mut self, key: &str, value: &str) -> &mut Self {
        self.push("RPUSH").arg(key).arg(value);
        self
    }

    pub fn add_member(&mut self, key: &str, value: &str) -> &mut Self {
        self.push("SADD").arg(key).arg(value);
        self
    }

    pub fn remove_member(&mut self, key: &str, value: &str) -> &mut Self {
        self.push("SREM").arg(key).arg(value);
        self
    }

    pub fn add_scored(&mut self, key: &str, value: &str, score: f64) -> &mut Self {
        self.push("ZADD").arg(key).arg(score).arg(value);
        self
    }

    pub fn put_all<K, V>(&mut self, key: &str, mapping: &[(K, V)]) -> &mut Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if mapping.is_empty() {
            return self;
        }
        let cmd = self.push("HSET").arg(key);
        for (field, value) in mapping {
            cmd.arg(field.as_ref()).arg(value.as_ref());
        }
        self
    }

    pub fn publish(&mut self, channel: &str, message: &str) -> &mut Self {
        self.push("PUBLISH").arg(channel).arg(message);
        self
    }
}

/// 单条回复是否成功
pub fn reply_ok(value: &Value) -> bool {
    !matches!(value, Value::ServerError(_))
}

fn into_reply(value: Value) -> AppResult<Value> {
    match value {
        Value::ServerError(err) => Err(map_redis_error("PIPELINE", err.into())),
        other => Ok(other),
    }
}

impl RedisStore {
    /// 执行事务
    ///
    /// `body` 中记录的命令仅在 `body` 返回 `Ok` 时一次性提交；`body` 出错、
    /// 命令入队失败或 EXEC 被放弃时返回 `TransactionAborted`。
    /// 不要在 `body` 中再向连接池借连接。
    pub async fn run_transaction<F>(&self, body: F) -> AppResult<Vec<Value>>
    where
        F: FnOnce(&mut Batch) -> AppResult<()>,
    {
        let mut batch = Batch::new();
        if let Err(e) = body(&mut batch) {
            return Err(AppError::transaction_aborted(format!(
                "Transaction body failed: {}",
                e
            )));
        }
        if let Some(e) = batch.error.take() {
            return Err(AppError::transaction_aborted(format!(
                "Invalid command in transaction: {}",
                e
            )));
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        batch.pipe.atomic();
        let mut conn = self.pool().acquire().await?;
        let result = self
            .bounded(
                "EXEC",
                batch
                    .pipe
                    .query_async::<Option<Vec<Value>>>(conn.connection_mut()),
            )
            .await;
        drop(conn);
        record("EXEC", &result);

        let replies = match result {
            Ok(Some(replies)) => replies,
            Ok(None) => return Err(AppError::transaction_aborted("EXEC returned nil")),
            Err(AppError::Command(msg)) => return Err(AppError::transaction_aborted(msg)),
            Err(e) => return Err(e),
        };

        if let Some(failed) = replies.iter().position(|r| !reply_ok(r)) {
            warn!(
                commands = batch.len(),
                failed_index = failed,
                "Command failed inside transaction"
            );
            return Err(AppError::transaction_aborted(format!(
                "Command #{} failed inside transaction, the other commands were applied",
                failed
            )));
        }

        debug!(commands = batch.len(), "Transaction committed");
        Ok(replies)
    }

    /// 执行管道
    ///
    /// 按提交顺序返回每条命令各自的结果，不保证原子性
    pub async fn run_pipelined<F>(&self, body: F) -> AppResult<Vec<AppResult<Value>>>
    where
        F: FnOnce(&mut Batch) -> AppResult<()>,
    {
        let mut batch = Batch::new();
        body(&mut batch)?;
        if let Some(e) = batch.error.take() {
            return Err(e);
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        // query_async 遇到第一条错误回复就整体失败，这里直接发送以保留逐条结果
        let mut conn = self.pool().acquire().await?;
        let result = self
            .bounded(
                "PIPELINE",
                conn.connection_mut()
                    .req_packed_commands(&batch.pipe, 0, batch.len()),
            )
            .await;
        drop(conn);
        record("PIPELINE", &result);

        let replies: Vec<AppResult<Value>> = result?.into_iter().map(into_reply).collect();
        debug!(
            commands = batch.len(),
            failed = replies.iter().filter(|r| r.is_err()).count(),
            "Pipeline executed"
        );
        Ok(replies)
    }
}
