use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_ORDER_HOLD_MINUTES: i64 = 15;
const DEFAULT_CART_HOLD_HOURS: i64 = 24;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_LOCK_WAIT_TIMEOUT_MS: u64 = 5_000;

/// Application configuration with validation.
///
/// Hold durations are configuration, not business rules baked into the
/// engine: callers may override `hold_minutes` per reserve call, and the
/// cart TTL applies whenever a cart hold is touched.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_env")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Maximum database connections in the pool
    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1, max = 256))]
    pub db_max_connections: u32,

    /// Minimum database connections in the pool
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Default order-hold lifetime in minutes, used when a reserve call
    /// does not supply its own
    #[serde(default = "default_order_hold_minutes")]
    #[validate(range(min = 1))]
    pub order_hold_minutes: i64,

    /// Cart-hold lifetime in hours, refreshed on every cart touch
    #[serde(default = "default_cart_hold_hours")]
    #[validate(range(min = 1))]
    pub cart_hold_hours: i64,

    /// Whether the background expiry sweeper runs
    #[serde(default = "default_true")]
    pub sweep_enabled: bool,

    /// Interval between background expiry sweeps in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Upper bound on waiting for a per-SKU lock before the operation
    /// fails as retryable
    #[serde(default = "default_lock_wait_timeout_ms")]
    pub lock_wait_timeout_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_env() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_order_hold_minutes() -> i64 {
    DEFAULT_ORDER_HOLD_MINUTES
}
fn default_cart_hold_hours() -> i64 {
    DEFAULT_CART_HOLD_HOURS
}
fn default_true() -> bool {
    true
}
fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}
fn default_lock_wait_timeout_ms() -> u64 {
    DEFAULT_LOCK_WAIT_TIMEOUT_MS
}

impl AppConfig {
    /// Socket address the HTTP server binds to.
    pub fn server_addr(&self) -> Result<SocketAddr, AppConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppConfigError::Invalid(format!("invalid host/port: {}", e)))
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from `config/default.toml`, an environment-specific
/// file, and `APP__`-prefixed environment variables, in that order of
/// precedence.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://stockhold.db?mode=rwc")?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate()?;

    Ok(app_config)
}

/// Initializes the global tracing subscriber. `RUST_LOG` wins over the
/// configured level when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("stockhold_api={},tower_http=info", level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> AppConfig {
        AppConfig {
            database_url: "sqlite://test.db?mode=rwc".to_string(),
            host: default_host(),
            port: default_port(),
            environment: default_env(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: true,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            order_hold_minutes: default_order_hold_minutes(),
            cart_hold_hours: default_cart_hold_hours(),
            sweep_enabled: true,
            sweep_interval_secs: default_sweep_interval_secs(),
            lock_wait_timeout_ms: default_lock_wait_timeout_ms(),
        }
    }

    #[test]
    fn hold_durations_have_sensible_defaults() {
        let cfg = minimal();
        assert_eq!(cfg.order_hold_minutes, 15);
        assert_eq!(cfg.cart_hold_hours, 24);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn server_addr_parses_host_and_port() {
        let mut cfg = minimal();
        cfg.host = "127.0.0.1".to_string();
        cfg.port = 9090;
        assert_eq!(cfg.server_addr().unwrap().to_string(), "127.0.0.1:9090");
    }

    #[test]
    fn zero_hold_minutes_fails_validation() {
        let mut cfg = minimal();
        cfg.order_hold_minutes = 0;
        assert!(cfg.validate().is_err());
    }
}
