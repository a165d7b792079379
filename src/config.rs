//! Configuration for the Blocklist Updater
//!
//! Values come from `UPDATER_*` environment variables (a `.env` file is
//! honoured); CLI flags override individual fields afterwards.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, UpdaterError};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Files
    #[serde(default = "default_domains_file")]
    pub domains_file: PathBuf,
    #[serde(default = "default_sources_file")]
    pub sources_file: PathBuf,
    #[serde(default = "default_cache_file")]
    pub cache_file: PathBuf,
    #[serde(default = "default_status_file")]
    pub status_file: PathBuf,
    #[serde(default = "default_report_file")]
    pub report_file: PathBuf,
    #[serde(default = "default_markdown_file")]
    pub markdown_file: PathBuf,
    #[serde(default = "default_regex_file")]
    pub regex_file: PathBuf,
    pub metrics_file: Option<PathBuf>,

    // Merge
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    // Fetching
    #[serde(default = "default_max_parallel_fetches")]
    pub max_parallel_fetches: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
}

fn default_domains_file() -> PathBuf {
    PathBuf::from("domains.txt")
}

fn default_sources_file() -> PathBuf {
    PathBuf::from("data/sources.json")
}

fn default_cache_file() -> PathBuf {
    PathBuf::from("data/source_cache.json")
}

fn default_status_file() -> PathBuf {
    PathBuf::from("data/domain_status.json")
}

fn default_report_file() -> PathBuf {
    PathBuf::from("reports/latest_update.json")
}

fn default_markdown_file() -> PathBuf {
    PathBuf::from("reports/latest_update.md")
}

fn default_regex_file() -> PathBuf {
    PathBuf::from("regex.list")
}

fn default_chunk_size() -> usize {
    500
}

fn default_max_parallel_fetches() -> usize {
    4
}

fn default_request_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    1000 // 1 second, doubled after every wait
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domains_file: default_domains_file(),
            sources_file: default_sources_file(),
            cache_file: default_cache_file(),
            status_file: default_status_file(),
            report_file: default_report_file(),
            markdown_file: default_markdown_file(),
            regex_file: default_regex_file(),
            metrics_file: None,
            chunk_size: default_chunk_size(),
            max_parallel_fetches: default_max_parallel_fetches(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("UPDATER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(UpdaterError::InvalidConfig(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.max_parallel_fetches == 0 {
            return Err(UpdaterError::InvalidConfig(
                "max_parallel_fetches must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(UpdaterError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}
