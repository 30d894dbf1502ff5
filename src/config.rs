//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::Result;
use crate::error::Error;

/// Client secret baked in at build time. Empty means chart login is unsupported.
const BUILD_CLIENT_SECRET: &str = match option_env!("NAVCHARTS_CLIENT_SECRET") {
    Some(secret) => secret,
    None => "",
};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OAuth client id registered with the chart provider
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Overrides the build-time client secret when non-empty
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Directory holding the saved login
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default)]
    pub endpoints: ProviderEndpoints,

    #[serde(default)]
    pub charts: ChartsConfig,

    /// Lifetime of a fetched enroute key / signed cookie pair
    #[serde(default = "default_signed_access_ttl")]
    pub signed_access_ttl_secs: u64,
}

/// Provider hosts. Overridable so a staging or mock provider can be used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoints {
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default = "default_enroute_key_url")]
    pub enroute_key_url: String,

    #[serde(default = "default_signed_cookies_url")]
    pub signed_cookies_url: String,

    #[serde(default = "default_tile_host")]
    pub tile_host: String,
}

/// Which enroute chart variant to show
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartsConfig {
    /// High-altitude routes instead of low-altitude ones
    #[serde(default)]
    pub high_routes: bool,

    #[serde(default = "default_day_mode")]
    pub day_mode: bool,
}

fn default_client_id() -> String {
    "navcharts".to_string()
}

fn default_cache_dir() -> PathBuf {
    config_dir().join("cache")
}

fn default_signed_access_ttl() -> u64 {
    600
}

fn default_authorize_url() -> String {
    "https://identity.api.navigraph.com/connect/authorize".to_string()
}

fn default_token_url() -> String {
    "https://identity.api.navigraph.com/connect/token".to_string()
}

fn default_enroute_key_url() -> String {
    "https://api.navigraph.com/v1/enroute/key".to_string()
}

fn default_signed_cookies_url() -> String {
    "https://api.navigraph.com/v1/enroute/signed-cookies".to_string()
}

fn default_tile_host() -> String {
    "https://enroute.charts.api.navigraph.com".to_string()
}

fn default_day_mode() -> bool {
    true
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            enroute_key_url: default_enroute_key_url(),
            signed_cookies_url: default_signed_cookies_url(),
            tile_host: default_tile_host(),
        }
    }
}

impl Default for ChartsConfig {
    fn default() -> Self {
        Self {
            high_routes: false,
            day_mode: default_day_mode(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            client_secret: None,
            cache_dir: default_cache_dir(),
            endpoints: ProviderEndpoints::default(),
            charts: ChartsConfig::default(),
            signed_access_ttl_secs: default_signed_access_ttl(),
        }
    }
}

impl Config {
    /// The effective client secret: config override first, then the build-time one
    pub fn client_secret(&self) -> &str {
        match self.client_secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret,
            _ => BUILD_CLIENT_SECRET,
        }
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".navcharts")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from file
pub fn load() -> Result<Config> {
    let path = config_path();

    if !path.exists() {
        return Err(Error::Config(format!(
            "Config not found at {:?}. Run 'navcharts init' first.",
            path
        )));
    }

    let content = std::fs::read_to_string(&path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}

/// Load configuration, falling back to defaults when no file exists
pub fn load_or_default() -> Result<Config> {
    if config_path().exists() {
        load()
    } else {
        Ok(Config::default())
    }
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    let path = config_path();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    Ok(())
}
