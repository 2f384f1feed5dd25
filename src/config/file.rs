//! TOML configuration file loading
//!
//! Supports `~/.config/lemonchat/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Upstream assistant API
    #[serde(default)]
    pub assistant: AssistantFileConfig,

    /// Lemon Squeezy billing
    #[serde(default)]
    pub lemonsqueezy: LemonSqueezyFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Public URL of the web app (used for checkout redirects)
    pub app_url: Option<String>,

    /// `SQLite` database path
    pub db_path: Option<String>,

    /// Global requests-per-minute limit
    pub rate_limit: Option<u32>,

    /// Subscriber status cache TTL in seconds
    pub subscriber_cache_secs: Option<u64>,
}

/// Assistant API configuration (secrets stay in the environment)
#[derive(Debug, Default, Deserialize)]
pub struct AssistantFileConfig {
    pub api_url: Option<String>,
    pub project_id: Option<String>,
}

/// Lemon Squeezy configuration (secrets stay in the environment)
#[derive(Debug, Default, Deserialize)]
pub struct LemonSqueezyFileConfig {
    pub api_url: Option<String>,
    pub store_id: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    let Some(path) = config_file_path() else {
        return ConfigFile::default();
    };

    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config(&content).unwrap_or_else(|e| {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config file, using defaults"
            );
            ConfigFile::default()
        }),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the TOML is malformed
pub fn parse_config(content: &str) -> crate::Result<ConfigFile> {
    let config = toml::from_str(content)?;
    Ok(config)
}

/// Return the config file path: `~/.config/lemonchat/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("lemonchat").join("config.toml"))
}
