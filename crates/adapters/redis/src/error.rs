//! Redis 错误映射

use kvlab_errors::AppError;
use redis::{ErrorKind, RedisError};

/// 将 Redis 错误按可恢复性映射为 AppError
pub(crate) fn map_redis_error(operation: &str, err: RedisError) -> AppError {
    if err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
        || err.is_io_error()
    {
        return AppError::backend_unavailable(format!("Redis {} failed: {}", operation, err));
    }

    if err.code() == Some("BUSYGROUP") || err.to_string().contains("BUSYGROUP") {
        return AppError::group_already_exists(format!("Redis {}: {}", operation, err));
    }

    match err.kind() {
        ErrorKind::ExecAbortError => {
            AppError::transaction_aborted(format!("Redis {} aborted: {}", operation, err))
        }
        ErrorKind::TypeError => AppError::serialization(format!(
            "Unexpected reply to Redis {}: {}",
            operation, err
        )),
        _ => AppError::command(format!("Redis {} failed: {}", operation, err)),
    }
}
