//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use crate::models::Gender;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Comma separated list of allowed CORS origins
    #[serde(default)]
    pub cors_origins: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Run embedded migrations at startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    20
}

fn default_run_migrations() -> bool {
    true
}

/// Redis configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// TTL for the cached pricing snapshot in seconds
    #[serde(default = "default_config_ttl")]
    pub config_ttl_secs: u64,
}

fn default_config_ttl() -> u64 {
    300
}

/// Authentication configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// JWT signing secret
    pub jwt_secret: String,

    /// JWT token expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: i64,
}

fn default_jwt_expiration() -> i64 {
    30 * 24 * 3600
}

/// Billing-specific configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    /// Hard ceiling on billable call time in seconds
    #[serde(default = "default_max_call_duration")]
    pub max_call_duration_secs: i64,

    /// Minimum billable minutes for message calls
    #[serde(default = "default_message_minimum")]
    pub message_minimum_minutes: i64,

    /// Gender that pays for monetized calls
    #[serde(default = "default_payer_gender")]
    pub payer_gender: Gender,

    /// Gender that earns from monetized calls
    #[serde(default = "default_earner_gender")]
    pub earner_gender: Gender,
}

fn default_max_call_duration() -> i64 {
    6 * 3600
}

fn default_message_minimum() -> i64 {
    1
}

fn default_payer_gender() -> Gender {
    Gender::Male
}

fn default_earner_gender() -> Gender {
    Gender::Female
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            max_call_duration_secs: default_max_call_duration(),
            message_minimum_minutes: default_message_minimum(),
            payer_gender: default_payer_gender(),
            earner_gender: default_earner_gender(),
        }
    }
}

/// Outbound notification configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    /// Webhook that receives call events; events are only logged when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Webhook request timeout in milliseconds
    #[serde(default = "default_notification_timeout")]
    pub timeout_ms: u64,
}

fn default_notification_timeout() -> u64 {
    2000
}

impl BillingConfig {
    /// Reject limits that would make timed calls free
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_duration_secs < 60 {
            return Err(ConfigError::Message(format!(
                "billing.max_call_duration_secs must be at least 60, got {}",
                self.max_call_duration_secs
            )));
        }
        if self.message_minimum_minutes < 1 {
            return Err(ConfigError::Message(format!(
                "billing.message_minimum_minutes must be at least 1, got {}",
                self.message_minimum_minutes
            )));
        }
        Ok(())
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_ms: default_notification_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 20)?
            .set_default("database.run_migrations", true)?
            .set_default("auth.jwt_expiration_secs", default_jwt_expiration())?
            .set_default("billing.max_call_duration_secs", default_max_call_duration())?
            .set_default("billing.message_minimum_minutes", default_message_minimum())?
            .set_default("billing.payer_gender", "male")?
            .set_default("billing.earner_gender", "female")?
            .set_default("notifications.timeout_ms", 2000)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with COINCALL_ prefix
            .add_source(
                Environment::with_prefix("COINCALL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: Self = config.try_deserialize()?;
        app.billing.validate()?;
        Ok(app)
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("COINCALL").separator("__"))
            .build()?;

        let app: Self = config.try_deserialize()?;
        app.billing.validate()?;
        Ok(app)
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
