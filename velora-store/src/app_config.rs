use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub hold_ttl_seconds: u64,
    pub commission_rate: f64,
    #[serde(default = "default_min_lead_minutes")]
    pub min_lead_minutes: i64,
    #[serde(default = "default_max_advance_days")]
    pub max_advance_days: i64,
    #[serde(default = "default_max_duration_minutes")]
    pub max_duration_minutes: i64,
    #[serde(default = "default_retry_attempts")]
    pub payment_retry_attempts: u32,
    #[serde(default = "default_retry_base_ms")]
    pub payment_retry_base_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub payment_retry_max_ms: u64,
}

fn default_min_lead_minutes() -> i64 {
    30
}
fn default_max_advance_days() -> i64 {
    180
}
fn default_max_duration_minutes() -> i64 {
    8 * 60
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    200
}
fn default_retry_max_ms() -> u64 {
    2_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            // Start off by merging in the "default" configuration file
            .add_source(config::File::with_name("config/default"))
            // Add in the current environment file (optional)
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in to git
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `VELORA__SERVER__PORT=9090` overrides server.port
            .add_source(config::Environment::with_prefix("VELORA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
