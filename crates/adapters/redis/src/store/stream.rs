//! Redis Stream 命令
//!
//! 追加、消费者组、按组读取与确认

use std::collections::HashMap;
use std::time::Duration;

use kvlab_errors::{AppError, AppResult};
use redis::Value;
use serde::Deserialize;
use tracing::{debug, info};

use super::RedisStore;

/// Stream 记录
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    /// 服务端生成的 ID，同一 Stream 内严格递增
    pub id: String,
    /// Stream 名称
    pub stream: String,
    /// 字段
    pub fields: HashMap<String, String>,
}

impl StreamRecord {
    /// 获取字段值
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// 获取 JSON 字段并解析
    pub fn get_json<T: for<'de> Deserialize<'de>>(&self, key: &str) -> AppResult<Option<T>> {
        match self.fields.get(key) {
            Some(value) => {
                let parsed = serde_json::from_str(value)
                    .map_err(|e| AppError::serialization(format!("Failed to parse JSON: {}", e)))?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }
}

/// 消费者组读取位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOffset {
    /// 组内尚未投递给任何消费者的新记录（`>`）
    LastConsumed,
    /// 本消费者已投递但未确认的记录，从给定 ID 之后开始
    Pending(String),
}

impl ReadOffset {
    /// 从头重读本消费者的待确认记录
    pub fn pending_from_start() -> Self {
        Self::Pending("0".to_string())
    }

    fn as_arg(&self) -> &str {
        match self {
            Self::LastConsumed => ">",
            Self::Pending(id) => id,
        }
    }
}

/// 读取选项
#[derive(Debug, Clone, Default)]
pub struct StreamReadOptions {
    /// 最多读取条数
    pub count: Option<usize>,
    /// 没有数据时阻塞等待的时长，为空时不阻塞
    pub block: Option<Duration>,
}

impl StreamReadOptions {
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_block(mut self, block: Duration) -> Self {
        self.block = Some(block);
        self
    }

    /// 阻塞读取的等待上限：阻塞时长加上命令超时，
    /// 保证服务端在阻塞结束前不会被客户端判定超时
    pub(crate) fn read_timeout(&self, operation_timeout: Duration) -> Duration {
        match self.block {
            Some(block) => block.saturating_add(operation_timeout),
            None => operation_timeout,
        }
    }
}

impl RedisStore {
    /// 追加记录，返回生成的 ID
    pub async fn append<K, V>(&self, stream: &str, fields: &[(K, V)]) -> AppResult<String>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if fields.is_empty() {
            return Err(AppError::validation("Stream record needs at least one field"));
        }

        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("*");
        for (key, value) in fields {
            cmd.arg(key.as_ref()).arg(value.as_ref());
        }

        let id: String = self.query("XADD", &cmd).await?;
        debug!(stream, id = %id, "Record appended to stream");
        Ok(id)
    }

    /// Stream 长度
    pub async fn stream_len(&self, stream: &str) -> AppResult<u64> {
        self.query("XLEN", redis::cmd("XLEN").arg(stream)).await
    }

    /// 创建消费者组（从 Stream 起点开始，Stream 不存在时自动创建）
    ///
    /// 组已存在时视为成功，不会重置组的读取位置
    pub async fn create_consumer_group(&self, stream: &str, group: &str) -> AppResult<()> {
        let result = self
            .query::<()>(
                "XGROUP CREATE",
                redis::cmd("XGROUP")
                    .arg("CREATE")
                    .arg(stream)
                    .arg(group)
                    .arg("0")
                    .arg("MKSTREAM"),
            )
            .await;

        match result {
            Ok(()) => {
                info!(stream, group, "Consumer group created");
                Ok(())
            }
            Err(AppError::GroupAlreadyExists(_)) => {
                debug!(stream, group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// 以消费者身份读取
    pub async fn read_as_consumer(
        &self,
        group: &str,
        consumer: &str,
        stream: &str,
        offset: ReadOffset,
    ) -> AppResult<Vec<StreamRecord>> {
        self.read_as_consumer_with(group, consumer, stream, offset, &StreamReadOptions::default())
            .await
    }

    /// 以消费者身份读取（带选项）
    ///
    /// 记录在组内至少投递一次，处理完后需调用 [`RedisStore::acknowledge`]
    pub async fn read_as_consumer_with(
        &self,
        group: &str,
        consumer: &str,
        stream: &str,
        offset: ReadOffset,
        options: &StreamReadOptions,
    ) -> AppResult<Vec<StreamRecord>> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(consumer);

        if let Some(count) = options.count {
            cmd.arg("COUNT").arg(count);
        }
        if let Some(block) = options.block {
            // BLOCK 0 表示无限等待
            let millis = u64::try_from(block.as_millis()).unwrap_or(u64::MAX);
            if millis == 0 {
                return Err(AppError::validation("Block duration must be at least 1ms"));
            }
            cmd.arg("BLOCK").arg(millis);
        }

        cmd.arg("STREAMS").arg(stream).arg(offset.as_arg());

        let timeout = options.read_timeout(self.pool().config().operation_timeout);
        let reply: Value = self.query_within("XREADGROUP", timeout, &cmd).await?;
        let records = parse_xread_response(reply);
        debug!(
            stream,
            group,
            consumer,
            count = records.len(),
            "Records read from stream"
        );
        Ok(records)
    }

    /// 确认记录，返回确认成功的条数
    pub async fn acknowledge<S: AsRef<str>>(
        &self,
        stream: &str,
        group: &str,
        ids: &[S],
    ) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut cmd = redis::cmd("XACK");
        cmd.arg(stream).arg(group);
        for id in ids {
            cmd.arg(id.as_ref());
        }

        let acked: u64 = self.query("XACK", &cmd).await?;
        debug!(stream, group, acked, "Records acknowledged");
        Ok(acked)
    }
}

fn bulk_to_string(value: &Value) -> Option<String> {
    match value {
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

/// 解析单条记录 `[id, [field, value, ...]]`
fn parse_entry(entry: &Value, stream: &str) -> Option<StreamRecord> {
    let Value::Array(parts) = entry else {
        return None;
    };
    let id = bulk_to_string(parts.first()?)?;

    let mut fields = HashMap::new();
    // 已被 XDEL 删除的待确认记录，字段部分为 nil
    if let Some(Value::Array(field_values)) = parts.get(1) {
        for pair in field_values.chunks_exact(2) {
            if let (Some(k), Some(v)) = (bulk_to_string(&pair[0]), bulk_to_string(&pair[1])) {
                fields.insert(k, v);
            }
        }
    }

    Some(StreamRecord {
        id,
        stream: stream.to_string(),
        fields,
    })
}

/// 解析 XREAD/XREADGROUP 响应 `[[stream, [entry, ...]], ...]`，无数据时为 nil
fn parse_xread_response(value: Value) -> Vec<StreamRecord> {
    let mut records = Vec::new();

    let Value::Array(streams) = value else {
        return records;
    };

    for stream_data in &streams {
        let Value::Array(parts) = stream_data else {
            continue;
        };
        let (Some(name), Some(Value::Array(entries))) =
            (parts.first().and_then(bulk_to_string), parts.get(1))
        else {
            continue;
        };

        records.extend(entries.iter().filter_map(|entry| parse_entry(entry, &name)));
    }

    records
}
