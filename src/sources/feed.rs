//! Feed parsing
//!
//! Feeds come as hosts files (`0.0.0.0 example.com`) or plain domain lists.
//! Both are reduced to normalized domains in first-seen order.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::SourceConfig;
use crate::dedup::unique_preserve_order;
use crate::http_client::FeedFetcher;
use crate::normalize::normalize_domain;

/// Result of fetching one source
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub source: Arc<SourceConfig>,
    /// `None` when the fetch failed after all retries
    pub domains: Option<Vec<String>>,
}

/// Extracts normalized domains from a feed body
pub fn parse_feed(text: &str) -> Vec<String> {
    let mut domains = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parts = line.split_whitespace();
        let first = parts.next().unwrap_or_default();
        let candidate = parts.next().unwrap_or(first);
        if let Some(domain) = normalize_domain(candidate) {
            domains.push(domain);
        }
    }
    domains
}

/// Fetches one source and parses its body
pub async fn fetch_source(fetcher: &dyn FeedFetcher, source: Arc<SourceConfig>) -> FetchOutcome {
    debug!(source = %source.name, url = %source.url, "Fetching source");

    let domains = match fetcher.fetch_text(&source.url).await {
        Some(text) => {
            let parsed = unique_preserve_order(parse_feed(&text));
            info!(source = %source.name, domains = parsed.len(), "Fetched source");
            Some(parsed)
        }
        None => {
            warn!(source = %source.name, url = %source.url, "Failed to fetch source");
            None
        }
    };

    FetchOutcome { source, domains }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticFetcher(Option<&'static str>);

    #[async_trait]
    impl FeedFetcher for StaticFetcher {
        async fn fetch_text(&self, _url: &str) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    #[test]
    fn test_parse_hosts_and_plain_lines() {
        let text = "127.0.0.1 example.com\n#c\nexample.org\n\n0.0.0.0 ads.example.net # inline\n";
        assert_eq!(
            parse_feed(text),
            vec!["example.com", "example.org", "ads.example.net"]
        );
    }

    #[test]
    fn test_parse_keeps_first_seen_order() {
        let text = "b.com\na.com\nB.com\n";
        assert_eq!(parse_feed(text), vec!["b.com", "a.com", "b.com"]);
    }

    #[test]
    fn test_parse_skips_ip_only_entries() {
        let text = "0.0.0.0 0.0.0.0\n10.0.0.1\n::1 localhost.example\n";
        assert_eq!(parse_feed(text), vec!["localhost.example"]);
    }

    #[tokio::test]
    async fn test_fetch_source_success_dedups() {
        let fetcher = StaticFetcher(Some("b.com\na.com\nb.com\n"));
        let source = Arc::new(SourceConfig::from_url("https://feed.example"));
        let outcome = fetch_source(&fetcher, source).await;
        assert_eq!(outcome.domains.unwrap(), vec!["b.com", "a.com"]);
    }

    #[tokio::test]
    async fn test_fetch_source_failure() {
        let fetcher = StaticFetcher(None);
        let source = Arc::new(SourceConfig::from_url("https://feed.example"));
        let outcome = fetch_source(&fetcher, source).await;
        assert!(outcome.domains.is_none());
    }
}
