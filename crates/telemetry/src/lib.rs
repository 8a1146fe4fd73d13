//! telemetry - 可观测性库

use kvlab_errors::{AppError, AppResult};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Redis 命令计数器名称
pub const REDIS_COMMANDS_TOTAL: &str = "kvlab_redis_commands_total";
/// Redis 命令失败计数器名称
pub const REDIS_COMMAND_ERRORS_TOTAL: &str = "kvlab_redis_command_errors_total";
/// 定时发布消息计数器名称
pub const PUBLISHED_MESSAGES_TOTAL: &str = "kvlab_published_messages_total";

/// 初始化 tracing
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// 初始化 JSON 格式的 tracing（生产环境）
pub fn init_tracing_json(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// 初始化 Prometheus metrics
pub fn init_metrics() -> AppResult<PrometheusHandle> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::internal(format!("Failed to install Prometheus recorder: {}", e)))?;

    metrics::describe_counter!(REDIS_COMMANDS_TOTAL, "Redis commands issued by the store");
    metrics::describe_counter!(REDIS_COMMAND_ERRORS_TOTAL, "Redis commands that failed");
    metrics::describe_counter!(PUBLISHED_MESSAGES_TOTAL, "Messages sent by the scheduled publisher");

    Ok(handle)
}
