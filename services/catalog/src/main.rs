//! Catalog Service - 服务入口
//!
//! 启动定时发布任务与同频道的日志订阅者，收到关闭信号后停止

use std::sync::Arc;

use anyhow::Context;
use catalog::publisher::CustomerPublisher;
use kvlab_bootstrap::{Infrastructure, RuntimeConfig, init_runtime, shutdown_signal};
use kvlab_config::AppConfig;
use kvlab_telemetry::init_metrics;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 不存在时忽略
    dotenvy::dotenv().ok();

    let runtime = RuntimeConfig::default();
    let config = AppConfig::load(&runtime.config_dir).context("Failed to load configuration")?;
    init_runtime(&config);
    let _metrics = init_metrics()?;

    let infra = Infrastructure::from_config(config).await?;
    let store = infra.store();
    let publisher_config = infra.config().publisher.clone();

    // 日志订阅者
    let subscription = store
        .subscribe(&publisher_config.channel, |message| async move {
            info!(channel = %message.channel, payload = %message.payload, "Received message");
            Ok(())
        })
        .await?;

    let shutdown = CancellationToken::new();
    let publisher = Arc::new(CustomerPublisher::new(store, publisher_config));
    let publisher_handle = publisher.start(shutdown.clone());

    shutdown_signal().await;

    shutdown.cancel();
    if let Err(e) = publisher_handle.await {
        warn!(error = %e, "Customer publisher task failed");
    }
    subscription.unsubscribe().await;
    infra.close();

    info!("Catalog service stopped");
    Ok(())
}
