//! Configuration management for Crosspost

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{ConfigError, ConnectError, Result};
use crate::types::PlatformId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// One `[apps.<platform>]` table per registered OAuth application
    #[serde(default)]
    pub apps: BTreeMap<String, AppConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address for crosspost-api
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Externally reachable base URL, used to build OAuth redirect URIs
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: default_public_url(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_public_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Seconds between dispatch ticks
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Publish attempts per queue entry before it is abandoned
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base retry delay in seconds, doubled per attempt
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay: u64,
    /// Ceiling for the computed retry delay in seconds
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay: u64,
    /// Timeout in seconds for a single publish or token call
    #[serde(default = "default_http_timeout")]
    pub http_timeout: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            max_attempts: default_max_attempts(),
            retry_base_delay: default_retry_base_delay(),
            retry_max_delay: default_retry_max_delay(),
            http_timeout: default_http_timeout(),
        }
    }
}

fn default_poll_interval() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_base_delay() -> u64 {
    30
}

fn default_retry_max_delay() -> u64 {
    3600
}

fn default_http_timeout() -> u64 {
    30
}

/// Credentials and endpoint overrides for one platform's OAuth application.
///
/// The endpoint overrides exist for self-hosted instances (any Mastodon
/// server) and for tests; when absent the platform's well-known endpoints
/// are used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub publish_url: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Look up the enabled OAuth application for a platform
    pub fn app_for(&self, platform: PlatformId) -> std::result::Result<&AppConfig, ConnectError> {
        self.apps
            .get(platform.as_str())
            .filter(|app| app.enabled)
            .ok_or_else(|| ConnectError::NotConfigured(platform.to_string()))
    }

    /// The redirect URI registered with the platform for OAuth callbacks
    pub fn redirect_uri(&self, platform: PlatformId) -> String {
        if let Ok(app) = self.app_for(platform) {
            if let Some(uri) = &app.redirect_uri {
                return uri.clone();
            }
        }
        format!(
            "{}/auth/callback/{}",
            self.server.public_url.trim_end_matches('/'),
            platform
        )
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/crosspost/crosspost.db".to_string(),
            },
            server: ServerConfig::default(),
            dispatch: DispatchConfig::default(),
            apps: BTreeMap::new(),
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosspost").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("crosspost"))
}
