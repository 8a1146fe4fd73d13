//! Redis 发布/订阅
//!
//! 发布走连接池；每个订阅持有一条池外的长连接，消息在独立任务中按序交给处理函数

use std::future::Future;

use futures::StreamExt;
use kvlab_errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::RedisStore;

/// 收到的消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubSubMessage {
    /// 频道
    pub channel: String,
    /// 消息内容
    pub payload: String,
    /// 接收时间
    pub received_at: chrono::DateTime<chrono::Utc>,
}

impl PubSubMessage {
    /// 创建新消息
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
            received_at: chrono::Utc::now(),
        }
    }

    /// 解析 JSON 负载
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> AppResult<T> {
        serde_json::from_str(&self.payload).map_err(|e| {
            AppError::serialization(format!("Failed to parse message payload: {}", e))
        })
    }
}

/// 活跃的订阅
///
/// 丢弃句柄即取消订阅；需要等待投递任务结束时调用 [`Subscription::unsubscribe`]
pub struct Subscription {
    channel: String,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// 订阅的频道
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// 投递任务是否仍在运行
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// 取消订阅并等待投递任务结束
    pub async fn unsubscribe(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(channel = %self.channel, error = %e, "Subscription task ended abnormally");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl RedisStore {
    /// 发布消息，返回收到消息的订阅者数量
    ///
    /// 发布之后才建立的订阅收不到这条消息
    pub async fn publish(&self, channel: &str, message: &str) -> AppResult<u64> {
        let receivers: u64 = self
            .query("PUBLISH", redis::cmd("PUBLISH").arg(channel).arg(message))
            .await?;
        debug!(channel, receivers, "Message published");
        Ok(receivers)
    }

    /// 发布 JSON 消息
    pub async fn publish_json<T: Serialize>(&self, channel: &str, data: &T) -> AppResult<u64> {
        let payload = serde_json::to_string(data)
            .map_err(|e| AppError::serialization(format!("Failed to serialize message: {}", e)))?;
        self.publish(channel, &payload).await
    }

    /// 订阅频道
    ///
    /// 返回前服务端已确认订阅。处理函数在独立任务中运行，每条消息调用一次，
    /// 顺序与发布顺序一致；处理函数返回的错误只记录日志。
    /// 处理函数与调用方并发执行，访问共享状态需要自行同步。
    pub async fn subscribe<F, Fut>(&self, channel: &str, mut handler: F) -> AppResult<Subscription>
    where
        F: FnMut(PubSubMessage) -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        let mut pubsub = self
            .bounded("SUBSCRIBE", self.pool().client().get_async_pubsub())
            .await?;

        // 服务端确认也受命令超时约束
        self.bounded("SUBSCRIBE", pubsub.subscribe(channel)).await?;

        info!(channel, "Subscribed to channel");

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let channel_name = channel.to_string();

        let task = tokio::spawn(async move {
            let mut messages = pubsub.on_message();

            loop {
                let msg = tokio::select! {
                    _ = cancelled.cancelled() => break,
                    next = messages.next() => match next {
                        Some(msg) => msg,
                        None => {
                            warn!(channel = %channel_name, "Subscription connection closed");
                            break;
                        }
                    },
                };

                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        error!(channel = %channel_name, error = %e, "Failed to get message payload");
                        continue;
                    }
                };

                let message = PubSubMessage::new(msg.get_channel_name(), payload);
                if let Err(e) = handler(message).await {
                    error!(channel = %channel_name, error = %e, "Failed to handle message");
                }
            }

            info!(channel = %channel_name, "Unsubscribed from channel");
        });

        Ok(Subscription {
            channel: channel.to_string(),
            token,
            task: Some(task),
        })
    }
}
