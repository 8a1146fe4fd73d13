//! kvlab-errors - 统一错误处理
//!
//! 所有 crate 共用的错误类型，按后端故障的可恢复性分类

use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 连接池耗尽、获取超时或连接池已关闭
    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// 网络或协议故障（连接被拒绝、中途断开、响应超时）
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// 后端返回的错误响应（类型错误、语法错误等）
    #[error("Command failed: {0}")]
    Command(String),

    /// 消费者组已存在，仅在 Store 内部使用，不会传播给调用方
    #[error("Consumer group already exists: {0}")]
    GroupAlreadyExists(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 事务被放弃，批次中的命令均未生效
    #[error("Transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn connection_unavailable(msg: impl Into<String>) -> Self {
        Self::ConnectionUnavailable(msg.into())
    }

    pub fn backend_unavailable(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    pub fn group_already_exists(msg: impl Into<String>) -> Self {
        Self::GroupAlreadyExists(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn transaction_aborted(msg: impl Into<String>) -> Self {
        Self::TransactionAborted(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// 是否值得由调用方重试
    ///
    /// Store 本身从不重试，重试策略由调用方决定
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionUnavailable(_) | Self::BackendUnavailable(_)
        )
    }

    /// 错误类别名称，用于日志和指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionUnavailable(_) => "connection_unavailable",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::Command(_) => "command",
            Self::GroupAlreadyExists(_) => "group_already_exists",
            Self::Serialization(_) => "serialization",
            Self::TransactionAborted(_) => "transaction_aborted",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(AppError::connection_unavailable("pool exhausted").is_retryable());
        assert!(AppError::backend_unavailable("connection reset").is_retryable());
        assert!(!AppError::command("WRONGTYPE").is_retryable());
        assert!(!AppError::transaction_aborted("body failed").is_retryable());
        assert!(!AppError::serialization("bad price").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = AppError::transaction_aborted("EXECABORT");
        assert_eq!(err.to_string(), "Transaction aborted: EXECABORT");
        assert_eq!(err.kind(), "transaction_aborted");
    }
}
