//! Configuration management for the lemonchat gateway

pub mod file;

use std::path::PathBuf;

use secrecy::SecretString;

use crate::{Error, Result};

/// Default assistant API base URL
pub const DEFAULT_ASSISTANT_URL: &str = "https://app.customgpt.ai/api/v1";

/// Default Lemon Squeezy API base URL
pub const DEFAULT_LEMONSQUEEZY_URL: &str = "https://api.lemonsqueezy.com/v1";

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API server configuration
    pub server: ServerConfig,

    /// Path to the `SQLite` database
    pub db_path: PathBuf,

    /// Secret used to verify session tokens (HS256)
    pub auth_secret: Option<SecretString>,

    /// Upstream assistant API
    pub assistant: AssistantConfig,

    /// Lemon Squeezy billing
    pub lemonsqueezy: LemonSqueezyConfig,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// API key for admin endpoints (from `LEMONCHAT_API_KEY` env)
    pub api_key: Option<String>,

    /// Public URL of the web app
    pub app_url: String,

    /// Global requests-per-minute limit; `None` disables limiting
    pub rate_limit: Option<u32>,

    /// How long a computed subscriber flag stays cached
    pub subscriber_cache_secs: u64,
}

/// Assistant API configuration
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Base URL, e.g. `https://app.customgpt.ai/api/v1`
    pub api_url: String,

    /// Project the conversations live in
    pub project_id: String,

    /// Bearer token
    pub api_key: Option<SecretString>,
}

/// Lemon Squeezy configuration
#[derive(Debug, Clone)]
pub struct LemonSqueezyConfig {
    /// Base URL, e.g. `https://api.lemonsqueezy.com/v1`
    pub api_url: String,

    /// Bearer token
    pub api_key: Option<SecretString>,

    /// Store the plans and checkouts belong to
    pub store_id: Option<String>,

    /// Signing secret for webhook deliveries
    pub webhook_secret: Option<SecretString>,
}

/// Default database path: `~/.local/share/lemonchat/lemonchat.db`
fn default_db_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("lemonchat.db"),
        |d| d.data_dir().join("lemonchat").join("lemonchat.db"),
    )
}

impl Config {
    /// Load configuration from the environment and the optional TOML file
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but malformed
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(|key| std::env::var(key).ok(), fc)
    }

    /// Build configuration from a variable lookup and a parsed config file
    ///
    /// Precedence is env > toml > default.
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but malformed
    pub fn from_sources<F>(env: F, fc: file::ConfigFile) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match env("LEMONCHAT_PORT").or_else(|| env("PORT")) {
            Some(raw) => raw
                .parse()
                .map_err(|e| Error::Config(format!("invalid LEMONCHAT_PORT '{raw}': {e}")))?,
            None => fc.server.port.unwrap_or(3001),
        };

        let rate_limit = env("LEMONCHAT_RATE_LIMIT")
            .and_then(|s| s.parse().ok())
            .or(fc.server.rate_limit)
            .filter(|n| *n > 0);

        let server = ServerConfig {
            port,
            api_key: env("LEMONCHAT_API_KEY"),
            app_url: env("APP_URL")
                .or(fc.server.app_url)
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            rate_limit,
            subscriber_cache_secs: env("LEMONCHAT_SUBSCRIBER_CACHE_SECS")
                .and_then(|s| s.parse().ok())
                .or(fc.server.subscriber_cache_secs)
                .unwrap_or(60),
        };

        let db_path = env("LEMONCHAT_DB_PATH")
            .or(fc.server.db_path)
            .map_or_else(default_db_path, PathBuf::from);

        let assistant = AssistantConfig {
            api_url: env("ASSISTANT_API_URL")
                .or(fc.assistant.api_url)
                .unwrap_or_else(|| DEFAULT_ASSISTANT_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            project_id: env("ASSISTANT_PROJECT_ID")
                .or(fc.assistant.project_id)
                .unwrap_or_default(),
            api_key: env("ASSISTANT_API_KEY").map(SecretString::from),
        };

        let lemonsqueezy = LemonSqueezyConfig {
            api_url: env("LEMONSQUEEZY_API_URL")
                .or(fc.lemonsqueezy.api_url)
                .unwrap_or_else(|| DEFAULT_LEMONSQUEEZY_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: env("LEMONSQUEEZY_API_KEY").map(SecretString::from),
            store_id: env("LEMONSQUEEZY_STORE_ID").or(fc.lemonsqueezy.store_id),
            webhook_secret: env("LEMONSQUEEZY_WEBHOOK_SECRET").map(SecretString::from),
        };

        if assistant.project_id.is_empty() {
            tracing::warn!("ASSISTANT_PROJECT_ID not set - chat relay will fail upstream");
        }

        Ok(Self {
            server,
            db_path,
            auth_secret: env("AUTH_SECRET").map(SecretString::from),
            assistant,
            lemonsqueezy,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_sources(lookup(&[]), file::ConfigFile::default()).unwrap();

        assert_eq!(config.server.port, 3001);
        assert_eq!(config.server.app_url, "http://localhost:3000");
        assert!(config.server.rate_limit.is_none());
        assert_eq!(config.assistant.api_url, DEFAULT_ASSISTANT_URL);
        assert_eq!(config.lemonsqueezy.api_url, DEFAULT_LEMONSQUEEZY_URL);
        assert!(config.auth_secret.is_none());
    }

    #[test]
    fn env_overrides_file() {
        let fc = file::parse_config(
            r#"
            [server]
            port = 9000
            app_url = "https://file.example"

            [lemonsqueezy]
            store_id = "1"
            "#,
        )
        .unwrap();

        let config = Config::from_sources(
            lookup(&[
                ("LEMONCHAT_PORT", "8080"),
                ("LEMONSQUEEZY_STORE_ID", "2"),
                ("LEMONSQUEEZY_API_KEY", "ls-key"),
            ]),
            fc,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.app_url, "https://file.example");
        assert_eq!(config.lemonsqueezy.store_id.as_deref(), Some("2"));
        assert_eq!(
            config.lemonsqueezy.api_key.as_ref().map(|k| k.expose_secret()),
            Some("ls-key")
        );
    }

    #[test]
    fn trailing_slashes_are_trimmed() {
        let config = Config::from_sources(
            lookup(&[
                ("APP_URL", "https://chat.example/"),
                ("ASSISTANT_API_URL", "http://127.0.0.1:9/api/"),
            ]),
            file::ConfigFile::default(),
        )
        .unwrap();

        assert_eq!(config.server.app_url, "https://chat.example");
        assert_eq!(config.assistant.api_url, "http://127.0.0.1:9/api");
    }

    #[test]
    fn malformed_port_is_an_error() {
        let result = Config::from_sources(
            lookup(&[("LEMONCHAT_PORT", "eighty")]),
            file::ConfigFile::default(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn zero_rate_limit_disables_limiting() {
        let config = Config::from_sources(
            lookup(&[("LEMONCHAT_RATE_LIMIT", "0")]),
            file::ConfigFile::default(),
        )
        .unwrap();
        assert!(config.server.rate_limit.is_none());
    }
}
