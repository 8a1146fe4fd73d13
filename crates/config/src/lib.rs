//! kvlab-config - 配置加载库
//!
//! 加载顺序：`default.toml` → `<APP_ENV>.toml` → `KVLAB_` 前缀的环境变量（`__` 表示嵌套）

use std::collections::HashMap;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use secrecy::Secret;
use serde::Deserialize;
use thiserror::Error;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "KVLAB_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Redis 连接配置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub database: u8,
    pub password: Option<Secret<String>>,
    /// 连接池大小
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// 获取连接的最长等待时间
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// 单个命令的超时时间
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// 记录的默认 TTL，为空或 0 表示永不过期
    pub default_ttl_secs: Option<u64>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_pool_size() -> u32 {
    // 开发环境: 8, 生产环境: 32
    match std::env::var("APP_ENV").as_deref() {
        Ok("production") => 32,
        _ => 8,
    }
}

fn default_acquire_timeout_ms() -> u64 {
    5_000
}

fn default_operation_timeout_ms() -> u64 {
    3_000
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: 0,
            password: None,
            pool_size: default_pool_size(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
            default_ttl_secs: None,
        }
    }
}

impl RedisSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// 记录的默认 TTL，0 与未设置相同
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// 缓存配置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// 所有缓存的默认 TTL，为空或 0 表示永不过期
    pub default_ttl_secs: Option<u64>,
    #[serde(default = "default_key_separator")]
    pub key_separator: String,
    /// 按缓存名覆盖 TTL，0 表示该缓存永不过期
    #[serde(default)]
    pub ttls: HashMap<String, u64>,
}

fn default_key_separator() -> String {
    "::".to_string()
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: None,
            key_separator: default_key_separator(),
            ttls: HashMap::new(),
        }
    }
}

/// 定时发布任务配置
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_message_prefix")]
    pub message_prefix: String,
}

fn default_channel() -> String {
    "customers".to_string()
}

fn default_interval_secs() -> u64 {
    10
}

fn default_message_prefix() -> String {
    "customer".to_string()
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            interval_secs: default_interval_secs(),
            message_prefix: default_message_prefix(),
        }
    }
}

impl PublisherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 是否输出 JSON 格式日志，未设置时生产环境默认开启
    pub json: Option<bool>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json: None,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let figment = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::from_figment(figment)
    }

    /// 从已组装的 figment 提取并校验配置
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.redis.pool_size == 0 {
            return Err(ConfigError::Invalid("redis.pool_size must be at least 1".into()));
        }
        if self.publisher.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "publisher.interval_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }

    /// 是否输出 JSON 日志
    pub fn json_logs(&self) -> bool {
        self.telemetry.json.unwrap_or_else(|| self.is_production())
    }
}

#[cfg(test)]
mod tests;
