//! HTTP Client Module
//!
//! Fetches raw feed bodies with:
//! - A bounded number of attempts per request
//! - Exponential backoff, raised to the server's `Retry-After` when present
//! - A fixed per-request timeout so one dead feed cannot stall a run
//!
//! Failures never escape `FeedFetcher::fetch_text`: after the last attempt
//! the caller simply gets no data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Result, UpdaterError};
use crate::metrics;

/// Longest wait a server can impose through `Retry-After`
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout (whole request including body)
    pub request_timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Total attempts per fetch, including the first one
    pub max_attempts: u32,
    /// Wait before the first retry; doubled after every wait
    pub initial_retry_delay: Duration,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            max_attempts: 3,
            initial_retry_delay: Duration::from_secs(1),
            user_agent: format!("blocklist-updater/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            request_timeout: config.request_timeout(),
            connect_timeout: config.connect_timeout(),
            max_attempts: config.max_attempts,
            initial_retry_delay: config.initial_backoff(),
            ..Default::default()
        }
    }
}

/// Anything that can turn a feed URL into its text body
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Returns the body, or `None` once all attempts are exhausted
    async fn fetch_text(&self, url: &str) -> Option<String>;
}

/// Why a single attempt failed
enum AttemptError {
    Retryable {
        error: UpdaterError,
        retry_after: Option<Duration>,
    },
    Terminal(UpdaterError),
}

/// HTTP client with bounded retries
pub struct ResilientHttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl ResilientHttpClient {
    /// Creates a new resilient HTTP client
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, config })
    }

    /// Creates a client with default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(HttpClientConfig::default())
    }

    /// Fetches `url`, retrying transient failures
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.initial_retry_delay;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(url = %url, attempt, "Executing HTTP request");

            let (error, retry_after) = match self.attempt(url).await {
                Ok(body) => {
                    metrics::record_fetch_attempt(metrics::OUTCOME_OK);
                    debug!(url = %url, attempt, bytes = body.len(), "Request succeeded");
                    return Ok(body);
                }
                Err(AttemptError::Terminal(error)) => {
                    metrics::record_fetch_attempt(metrics::OUTCOME_TERMINAL);
                    warn!(url = %url, attempt, error = %error, "Non-retryable error");
                    return Err(error);
                }
                Err(AttemptError::Retryable { error, retry_after }) => (error, retry_after),
            };

            metrics::record_fetch_attempt(metrics::OUTCOME_RETRYABLE);
            if attempt >= max_attempts {
                warn!(
                    url = %url,
                    attempts = attempt,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(error);
            }

            if let Some(retry_after) = retry_after {
                delay = delay.max(retry_after);
            }
            warn!(
                url = %url,
                attempt,
                max_attempts,
                wait_ms = delay.as_millis() as u64,
                error = %error,
                "Transient error, will retry"
            );
            tokio::time::sleep(delay).await;
            delay = delay.saturating_mul(2);
        }
    }

    async fn attempt(&self, url: &str) -> std::result::Result<String, AttemptError> {
        let response = self.client.get(url).send().await.map_err(classify_transport)?;
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await.map_err(classify_transport)?;
            return Ok(String::from_utf8_lossy(&body).into_owned());
        }

        let retry_after = retry_after_of(&response);
        let error = UpdaterError::ApiError {
            code: status.to_string(),
            message: format!("GET {url}"),
        };
        if Self::is_retryable_status(status) {
            Err(AttemptError::Retryable { error, retry_after })
        } else {
            Err(AttemptError::Terminal(error))
        }
    }

    /// Checks if a status code should trigger a retry
    fn is_retryable_status(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::TOO_MANY_REQUESTS |     // 429
            StatusCode::INTERNAL_SERVER_ERROR | // 500
            StatusCode::BAD_GATEWAY |           // 502
            StatusCode::SERVICE_UNAVAILABLE |   // 503
            StatusCode::GATEWAY_TIMEOUT         // 504
        )
    }
}

#[async_trait]
impl FeedFetcher for ResilientHttpClient {
    async fn fetch_text(&self, url: &str) -> Option<String> {
        self.get_text(url).await.ok()
    }
}

/// Transport errors (reset, timeout, truncated body) are worth retrying;
/// a request that cannot even be built is not.
fn classify_transport(error: reqwest::Error) -> AttemptError {
    if error.is_builder() {
        AttemptError::Terminal(UpdaterError::HttpError(error))
    } else {
        AttemptError::Retryable {
            error: UpdaterError::HttpError(error),
            retry_after: None,
        }
    }
}

fn retry_after_of(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| parse_retry_after(value, Utc::now()))
}

/// Parses a `Retry-After` value: delta-seconds or an HTTP-date.
/// The result is capped at `MAX_RETRY_AFTER`.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    let wait = match value.parse::<f64>() {
        Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => {
            Duration::try_from_secs_f64(seconds).unwrap_or(MAX_RETRY_AFTER)
        }
        Ok(_) => return None,
        Err(_) => {
            let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
            (at - now).to_std().unwrap_or(Duration::ZERO)
        }
    };
    Some(wait.min(MAX_RETRY_AFTER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_config_defaults() {
        let config = HttpClientConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.initial_retry_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_retryable_status() {
        for code in [429, 500, 502, 503, 504] {
            let status = StatusCode::from_u16(code).unwrap();
            assert!(ResilientHttpClient::is_retryable_status(status), "{code}");
        }
        assert!(!ResilientHttpClient::is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!ResilientHttpClient::is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!ResilientHttpClient::is_retryable_status(StatusCode::REQUEST_TIMEOUT));
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let now = Utc::now();
        assert_eq!(parse_retry_after("5", now), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(" 1.5 ", now), Some(Duration::from_millis(1500)));
        assert_eq!(parse_retry_after("-1", now), None);
        assert_eq!(parse_retry_after("soon", now), None);
        assert_eq!(parse_retry_after("NaN", now), None);
    }

    #[test]
    fn test_parse_retry_after_is_capped() {
        let now = Utc::now();
        assert_eq!(parse_retry_after("1e20", now), Some(MAX_RETRY_AFTER));
        assert_eq!(parse_retry_after("86400", now), Some(MAX_RETRY_AFTER));
        assert_eq!(
            parse_retry_after("Fri, 31 Dec 9999 23:59:59 GMT", now),
            Some(MAX_RETRY_AFTER)
        );
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 0).unwrap();
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", now),
            Some(Duration::from_secs(60))
        );
        // Dates in the past mean "retry now"
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_client_builds() {
        assert!(ResilientHttpClient::with_defaults().is_ok());
    }

    fn client_with(max_attempts: u32, initial_retry_delay: Duration) -> ResilientHttpClient {
        ResilientHttpClient::new(HttpClientConfig {
            max_attempts,
            initial_retry_delay,
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_connection_refused_is_retried() {
        // Bind then drop to get a port nothing listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = client_with(3, Duration::from_millis(10));

        let started = std::time::Instant::now();
        let result = client.get_text(&format!("http://127.0.0.1:{port}/feed.txt")).await;

        assert!(matches!(result, Err(UpdaterError::HttpError(_))));
        // Two waits between three attempts: 10ms then 20ms
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_retried() {
        let client = client_with(3, Duration::from_secs(1));

        let started = std::time::Instant::now();
        let result = client.get_text("not a url").await;

        assert!(matches!(result, Err(UpdaterError::HttpError(_))));
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
