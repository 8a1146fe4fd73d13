use figment::{
    providers::{Format, Toml},
    Figment,
};
use secrecy::{ExposeSecret, Secret};

use crate::{AppConfig, ConfigError, RedisSettings};

fn from_toml(toml: &str) -> Result<AppConfig, ConfigError> {
    AppConfig::from_figment(Figment::new().merge(Toml::string(toml)))
}

#[test]
fn test_minimal_config_uses_defaults() {
    let config = from_toml(r#"app_name = "catalog""#).unwrap();

    assert_eq!(config.app_env, "development");
    assert_eq!(config.redis.host, "127.0.0.1");
    assert_eq!(config.redis.port, 6379);
    assert_eq!(config.redis.operation_timeout_ms, 3_000);
    assert!(config.redis.default_ttl().is_none());
    assert_eq!(config.cache.key_separator, "::");
    assert_eq!(config.publisher.channel, "customers");
    assert_eq!(config.publisher.interval_secs, 10);
    assert!(!config.json_logs());
}

#[test]
fn test_nested_sections() {
    let config = from_toml(
        r#"
        app_name = "catalog"
        app_env = "production"

        [redis]
        host = "redis.internal"
        port = 6380
        pool_size = 4
        default_ttl_secs = 60

        [cache]
        default_ttl_secs = 600
        ttls = { scores = 30 }
        "#,
    )
    .unwrap();

    assert!(config.is_production());
    assert!(config.json_logs());
    assert_eq!(config.redis.host, "redis.internal");
    assert_eq!(config.redis.pool_size, 4);
    assert_eq!(config.redis.default_ttl_secs, Some(60));
    assert_eq!(config.cache.ttls.get("scores"), Some(&30));
}

#[test]
fn test_zero_pool_size_rejected() {
    let result = from_toml(
        r#"
        app_name = "catalog"
        [redis]
        pool_size = 0
        "#,
    );
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_zero_ttl_means_no_expiry() {
    let config = from_toml(
        r#"
        app_name = "catalog"

        [redis]
        default_ttl_secs = 0

        [cache]
        default_ttl_secs = 0
        ttls = { scores = 0 }
        "#,
    )
    .unwrap();

    assert!(config.redis.default_ttl().is_none());
    assert_eq!(config.cache.default_ttl_secs, Some(0));
    assert_eq!(config.cache.ttls.get("scores"), Some(&0));
}

#[test]
fn test_missing_app_name_fails() {
    assert!(matches!(from_toml(""), Err(ConfigError::Load(_))));
}

#[test]
fn test_secret_redaction() {
    let settings = RedisSettings {
        password: Some(Secret::new("hunter2".to_string())),
        ..Default::default()
    };
    let debug_output = format!("{:?}", settings);
    assert!(!debug_output.contains("hunter2"));
    assert!(debug_output.contains("REDACTED"));
    assert_eq!(
        settings.password.as_ref().map(|p| p.expose_secret().as_str()),
        Some("hunter2")
    );
}
