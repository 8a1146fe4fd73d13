//! 定时客户消息发布
//!
//! 按固定间隔向频道发布 `"<前缀> <uuid>"`，首次发布在启动时立即进行

use std::sync::Arc;

use kvlab_adapter_redis::{RedisStore, RetryConfig, with_retry};
use kvlab_config::PublisherConfig;
use kvlab_errors::AppResult;
use kvlab_telemetry::PUBLISHED_MESSAGES_TOTAL;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

/// 消息格式：前缀 + 空格 + 随机 UUID
pub fn customer_message(prefix: &str) -> String {
    format!("{} {}", prefix, Uuid::new_v4())
}

pub struct CustomerPublisher {
    store: RedisStore,
    config: PublisherConfig,
    retry: RetryConfig,
}

impl CustomerPublisher {
    pub fn new(store: RedisStore, config: PublisherConfig) -> Self {
        Self {
            store,
            config,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn channel(&self) -> &str {
        &self.config.channel
    }

    /// 生成一条消息
    pub fn next_message(&self) -> String {
        customer_message(&self.config.message_prefix)
    }

    /// 发布一条消息，返回收到消息的订阅者数量
    pub async fn publish_once(&self) -> AppResult<u64> {
        let message = self.next_message();
        let receivers = with_retry(&self.retry, "PUBLISH", || {
            self.store.publish(&self.config.channel, &message)
        })
        .await?;

        metrics::counter!(PUBLISHED_MESSAGES_TOTAL, "channel" => self.config.channel.clone())
            .increment(1);
        debug!(channel = %self.config.channel, receivers, %message, "Customer message published");
        Ok(receivers)
    }

    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                channel = %self.config.channel,
                interval_secs = self.config.interval_secs,
                "Customer publisher started"
            );
            let mut ticker = interval(self.config.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.publish_once().await {
                            error!(error = %e, "Failed to publish customer message");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        info!("Customer publisher received shutdown signal");
                        break;
                    }
                }
            }
            info!("Customer publisher stopped");
        })
    }
}
