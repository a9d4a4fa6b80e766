//! Server configuration loading from file and environment variables.

use murmur_types::ModerationPolicy;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// Topic and message store.
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub moderation: ModerationPolicy,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Session identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// SQLite file holding the nickname and fallback identity.
    #[serde(default = "default_identity_store_path")]
    pub store_path: String,

    /// JSON endpoint answering `{"ip": "..."}`.
    #[serde(default = "default_lookup_url")]
    pub lookup_url: String,

    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "murmur_channels=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "murmur.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_identity_store_path() -> String {
    "murmur-local.db".to_string()
}

fn default_lookup_url() -> String {
    "https://api.ipify.org?format=json".to_string()
}

fn default_lookup_timeout_ms() -> u64 {
    3_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            store_path: default_identity_store_path(),
            lookup_url: default_lookup_url(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `MURMUR_HOST` overrides `server.host`
/// - `MURMUR_PORT` overrides `server.port`
/// - `MURMUR_DB_PATH` overrides `database.path`
/// - `MURMUR_IDENTITY_STORE_PATH` overrides `identity.store_path`
/// - `MURMUR_LOOKUP_URL` overrides `identity.lookup_url`
/// - `MURMUR_DENYLIST` overrides `moderation.denylist` (comma separated)
/// - `MURMUR_LOG_LEVEL` overrides `logging.level`
/// - `MURMUR_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies `MURMUR_*` overrides read through `var`.
pub fn apply_env_overrides<F>(config: &mut Config, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = var("MURMUR_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("MURMUR_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = var("MURMUR_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(store_path) = var("MURMUR_IDENTITY_STORE_PATH") {
        config.identity.store_path = store_path;
    }
    if let Some(url) = var("MURMUR_LOOKUP_URL") {
        config.identity.lookup_url = url;
    }
    if let Some(denylist) = var("MURMUR_DENYLIST") {
        config.moderation.denylist = denylist
            .split(',')
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(level) = var("MURMUR_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("MURMUR_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
