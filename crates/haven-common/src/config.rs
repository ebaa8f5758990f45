//! Application configuration loaded from environment variables and config files.
//!
//! Supports `.env` files for development and environment variables for production.
//! Config precedence: env vars > .env file > config file > defaults

use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Get the global application configuration.
///
/// # Panics
/// Panics if config has not been initialized via [`init_from`].
pub fn get() -> &'static AppConfig {
    CONFIG.get().expect("Config not initialized. Call haven_common::config::init_from() first.")
}

/// Initialize the global configuration, reading the optional config file `path`
/// (extension inferred by the `config` crate).
///
/// Should be called once at application startup, before any other code accesses config.
pub fn init_from(path: &str) -> Result<&'static AppConfig, config::ConfigError> {
    // Load .env file if present (development)
    let _ = dotenvy::dotenv();

    let app_config = load(path)?;
    Ok(CONFIG.get_or_init(|| app_config))
}

/// Build an [`AppConfig`] without touching the global slot.
pub fn load(path: &str) -> Result<AppConfig, config::ConfigError> {
    let cfg = config::Config::builder()
        // Defaults
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8008)?
        .set_default("server.name", "localhost")?
        .set_default("database.max_connections", 20)?
        .set_default("database.min_connections", 5)?
        .set_default("federation.request_timeout_secs", 30)?
        .set_default("federation.discovery_timeout_secs", 5)?
        .set_default("federation.remote_call_timeout_secs", 60)?
        .set_default("federation.key_ttl_days", 90)?
        .set_default("federation.supported_room_versions", vec!["1", "2", "3", "4", "5", "6"])?
        // Optional config file
        .add_source(config::File::with_name(path).required(false))
        // Environment variables (HAVEN_SERVER__NAME, HAVEN_DATABASE__URL, etc.)
        .add_source(
            config::Environment::with_prefix("HAVEN")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("federation.supported_room_versions")
                .try_parsing(true),
        )
        .build()?;

    cfg.try_deserialize()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub federation: FederationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Public server name used for federation (e.g. "haven.example.com").
    /// Maps to the `HAVEN_SERVER__NAME` env var or `server.name` in the config file.
    pub name: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// JWT signing secret (HS256), should be 256+ bits of entropy
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FederationConfig {
    /// Overall HTTP timeout for a single outbound S2S request.
    pub request_timeout_secs: u64,
    /// Timeout for `.well-known` lookups during server discovery.
    pub discovery_timeout_secs: u64,
    /// Upper bound on any one remote step of a join (make_join, send_join,
    /// alias lookup, key fetch), including discovery.
    pub remote_call_timeout_secs: u64,
    /// Lifetime of a freshly generated signing key.
    pub key_ttl_days: i64,
    /// Room versions this server is willing to join.
    pub supported_room_versions: Vec<String>,
}

impl FederationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn remote_call_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_call_timeout_secs)
    }
}
