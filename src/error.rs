//! Error types for the Blocklist Updater

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpdaterError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("API error: {code} - {message}")]
    ApiError {
        code: String,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid data: {0}")]
    ValidationError(String),

    #[error("Failed to load {path}: {source}")]
    LoadFailed {
        path: String,
        #[source]
        source: LoadError,
    },
}

/// Outcome of reading a persisted JSON document (config, cache, ledger)
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("file does not exist")]
    Missing,

    #[error("malformed content: {0}")]
    Malformed(String),

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl LoadError {
    /// True when the caller should fall back to an empty default
    pub fn is_recoverable(&self) -> bool {
        matches!(self, LoadError::Missing | LoadError::Malformed(_))
    }
}

pub type Result<T> = std::result::Result<T, UpdaterError>;
