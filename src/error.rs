//! Error types for the lemonchat gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Resource not found
    #[error("{0}")]
    NotFound(String),

    /// Caller is not allowed to touch the resource
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Request payload failed validation
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Assistant API returned an error or an unreadable stream
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Payments provider returned an error
    #[error("billing error: {0}")]
    Billing(String),
}

impl Error {
    /// HTTP status code this error maps to at the API boundary
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Unauthorized(_) => 401,
            Self::InvalidInput(_) => 400,
            Self::Upstream(_) | Self::Billing(_) | Self::Http(_) => 502,
            _ => 500,
        }
    }
}
