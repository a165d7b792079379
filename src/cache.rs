//! Source Cache
//!
//! Per-source snapshot of the last fetch, keyed by source URL. Decides
//! whether a source can be served from cache (TTL) and whether it has gone
//! dark for longer than its SLA allows.
//!
//! A failed fetch never replaces the cached domains: the previous list and
//! `last_success_at` survive until the source answers again.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::dedup::unique_preserve_order;
use crate::error::{LoadError, Result, UpdaterError};
use crate::sources::SourceConfig;
use crate::storage;

/// Result of the last fetch attempt for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Ok,
    Error,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Ok => "ok",
            FetchStatus::Error => "error",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "ok" => Some(FetchStatus::Ok),
            "error" => Some(FetchStatus::Error),
            _ => None,
        }
    }
}

/// Cached state of one source
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheEntry {
    /// Normalized domains from the last successful fetch, first-seen order
    pub domains: Vec<String>,
    /// Last fetch attempt, successful or not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
    /// Last successful fetch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<FetchStatus>,
}

impl CacheEntry {
    /// Fresh iff the last attempt succeeded and the TTL has not elapsed
    pub fn is_fresh(&self, update_interval_days: u32, now: DateTime<Utc>) -> bool {
        if self.status != Some(FetchStatus::Ok) {
            return false;
        }
        match self.fetched_at {
            Some(fetched_at) => {
                fetched_at + Duration::days(i64::from(update_interval_days.max(1))) > now
            }
            None => false,
        }
    }

    /// Last success, falling back to `fetched_at` for entries that predate
    /// the `last_success_at` field
    pub fn effective_last_success(&self) -> Option<DateTime<Utc>> {
        match (self.last_success_at, self.status) {
            (Some(at), _) => Some(at),
            (None, Some(FetchStatus::Ok)) => self.fetched_at,
            _ => None,
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let domains = match object.get("domains") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|d| d.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        Some(Self {
            domains,
            fetched_at: object.get("fetched_at").and_then(parse_timestamp),
            last_success_at: object.get("last_success_at").and_then(parse_timestamp),
            status: object
                .get("status")
                .and_then(Value::as_str)
                .and_then(FetchStatus::parse),
        })
    }
}

/// SLA check for a source against its cache entry.
///
/// A source with an SLA misses it when it never succeeded or its last
/// success is older than `sla_days`.
pub fn sla_missed(source: &SourceConfig, entry: Option<&CacheEntry>, now: DateTime<Utc>) -> bool {
    let Some(sla_days) = source.sla_days else {
        return false;
    };
    match entry.and_then(CacheEntry::effective_last_success) {
        Some(last_success) => last_success + Duration::days(i64::from(sla_days)) < now,
        None => true,
    }
}

/// File-backed cache of all sources
pub struct SourceCache {
    file_path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
    dirty: bool,
}

impl SourceCache {
    /// Creates an empty cache that will be written to `file_path`
    pub fn empty(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            entries: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Loads the cache; a missing or corrupt file yields an empty cache
    pub async fn load(file_path: &Path) -> Result<Self> {
        let entries = match storage::read_text(file_path).await {
            Ok(content) => match Self::parse(&content) {
                Ok(entries) => {
                    info!(sources = entries.len(), "Loaded source cache");
                    entries
                }
                Err(e) => {
                    warn!(error = %e, path = %file_path.display(), "Corrupt source cache, starting fresh");
                    BTreeMap::new()
                }
            },
            Err(LoadError::Missing) => {
                debug!(path = %file_path.display(), "No source cache yet");
                BTreeMap::new()
            }
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "Unreadable source cache, starting fresh");
                BTreeMap::new()
            }
            Err(e) => {
                return Err(UpdaterError::LoadFailed {
                    path: file_path.display().to_string(),
                    source: e,
                })
            }
        };

        Ok(Self {
            file_path: file_path.to_path_buf(),
            entries,
            dirty: false,
        })
    }

    /// Parses the cache document, dropping entries that do not conform
    pub fn parse(content: &str) -> std::result::Result<BTreeMap<String, CacheEntry>, LoadError> {
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let document: Value =
            serde_json::from_str(content).map_err(|e| LoadError::Malformed(e.to_string()))?;
        let Value::Object(map) = document else {
            return Err(LoadError::Malformed("cache root is not an object".to_string()));
        };

        let mut entries = BTreeMap::new();
        for (url, value) in &map {
            match CacheEntry::from_value(value) {
                Some(entry) => {
                    entries.insert(url.clone(), entry);
                }
                None => debug!(url = %url, "Dropping malformed cache entry"),
            }
        }
        Ok(entries)
    }

    pub fn get(&self, url: &str) -> Option<&CacheEntry> {
        self.entries.get(url)
    }

    pub fn put(&mut self, url: impl Into<String>, entry: CacheEntry) {
        self.entries.insert(url.into(), entry);
        self.dirty = true;
    }

    pub fn is_fresh(&self, source: &SourceConfig, now: DateTime<Utc>) -> bool {
        self.get(&source.url)
            .map(|entry| entry.is_fresh(source.update_interval_days, now))
            .unwrap_or(false)
    }

    pub fn sla_missed(&self, source: &SourceConfig, now: DateTime<Utc>) -> bool {
        sla_missed(source, self.get(&source.url), now)
    }

    /// Records a successful fetch, replacing the cached domains
    pub fn record_success(&mut self, url: &str, domains: Vec<String>, now: DateTime<Utc>) {
        self.put(
            url,
            CacheEntry {
                domains: unique_preserve_order(domains),
                fetched_at: Some(now),
                last_success_at: Some(now),
                status: Some(FetchStatus::Ok),
            },
        );
    }

    /// Records a failed fetch, keeping the previous domains and last success
    pub fn record_failure(&mut self, url: &str, now: DateTime<Utc>) {
        let previous = self.entries.get(url).cloned().unwrap_or_default();
        self.put(
            url,
            CacheEntry {
                domains: previous.domains,
                fetched_at: Some(now),
                last_success_at: previous.last_success_at,
                status: Some(FetchStatus::Error),
            },
        );
    }

    /// Drops the entry for a source so the next run refetches it
    pub fn reset_source(&mut self, url: &str) -> bool {
        let removed = self.entries.remove(url).is_some();
        self.dirty |= removed;
        removed
    }

    /// Drops every entry
    pub fn reset_all(&mut self) {
        self.entries.clear();
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Writes the whole cache as a snapshot
    pub async fn flush(&mut self) -> Result<()> {
        let snapshot: BTreeMap<&String, CacheEntry> = self
            .entries
            .iter()
            .map(|(url, entry)| {
                let mut entry = entry.clone();
                entry.domains = unique_preserve_order(entry.domains);
                (url, entry)
            })
            .collect();

        storage::write_json(&self.file_path, &snapshot).await?;
        self.dirty = false;
        debug!(path = %self.file_path.display(), sources = snapshot.len(), "Source cache saved");
        Ok(())
    }
}

/// Parses RFC 3339 timestamps, accepting naive ISO-8601 values as UTC
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(status: FetchStatus, fetched_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            domains: vec!["a.com".to_string()],
            fetched_at: Some(fetched_at),
            last_success_at: Some(fetched_at),
            status: Some(status),
        }
    }

    #[test]
    fn test_freshness_respects_ttl() {
        let now = Utc::now();
        assert!(!entry(FetchStatus::Ok, now - Duration::days(2)).is_fresh(1, now));
        assert!(entry(FetchStatus::Ok, now - Duration::hours(12)).is_fresh(1, now));
        assert!(entry(FetchStatus::Ok, now - Duration::days(2)).is_fresh(3, now));
        // Zero interval behaves like one day
        assert!(entry(FetchStatus::Ok, now - Duration::hours(1)).is_fresh(0, now));
    }

    #[test]
    fn test_error_entries_are_never_fresh() {
        let now = Utc::now();
        assert!(!entry(FetchStatus::Error, now).is_fresh(1, now));

        let no_status = CacheEntry {
            status: None,
            ..entry(FetchStatus::Ok, now)
        };
        assert!(!no_status.is_fresh(1, now));
    }

    #[test]
    fn test_sla_missed() {
        let now = Utc::now();
        let source = SourceConfig::from_url("https://feed.example").with_sla(7, true);

        assert!(sla_missed(&source, None, now));
        assert!(sla_missed(
            &source,
            Some(&entry(FetchStatus::Ok, now - Duration::days(10))),
            now
        ));
        assert!(!sla_missed(
            &source,
            Some(&entry(FetchStatus::Ok, now - Duration::days(3))),
            now
        ));

        let without_sla = SourceConfig::from_url("https://feed.example");
        assert!(!sla_missed(&without_sla, None, now));
    }

    #[test]
    fn test_sla_falls_back_to_fetched_at_for_ok_entries() {
        let now = Utc::now();
        let source = SourceConfig::from_url("https://feed.example").with_sla(7, false);
        let legacy = CacheEntry {
            last_success_at: None,
            ..entry(FetchStatus::Ok, now - Duration::days(1))
        };
        assert!(!sla_missed(&source, Some(&legacy), now));

        let failed = CacheEntry {
            last_success_at: None,
            ..entry(FetchStatus::Error, now)
        };
        assert!(sla_missed(&source, Some(&failed), now));
    }

    #[test]
    fn test_parse_is_defensive() {
        let content = r#"{
            "https://a.example": {"domains": ["a.com", 5, "b.com"], "fetched_at": "2024-01-01T00:00:00+00:00", "status": "ok"},
            "https://b.example": {"domains": "not-a-list", "status": "weird"},
            "https://c.example": "garbage",
            "https://d.example": {"fetched_at": "2024-01-01T10:00:00"}
        }"#;

        let entries = SourceCache::parse(content).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries["https://a.example"].domains, vec!["a.com", "b.com"]);
        assert_eq!(entries["https://a.example"].status, Some(FetchStatus::Ok));
        assert!(entries["https://b.example"].domains.is_empty());
        assert_eq!(entries["https://b.example"].status, None);
        assert!(entries["https://d.example"].fetched_at.is_some());

        assert!(SourceCache::parse("[1, 2]").is_err());
        assert!(SourceCache::parse("{broken").is_err());
    }

    #[test]
    fn test_failure_keeps_previous_domains() {
        let now = Utc::now();
        let earlier = now - Duration::days(1);
        let mut cache = SourceCache::empty("unused.json");
        cache.record_success("https://a.example", vec!["x.com".into(), "x.com".into()], earlier);
        cache.record_failure("https://a.example", now);

        let entry = cache.get("https://a.example").unwrap();
        assert_eq!(entry.domains, vec!["x.com"]);
        assert_eq!(entry.status, Some(FetchStatus::Error));
        assert_eq!(entry.fetched_at, Some(now));
        assert_eq!(entry.last_success_at, Some(earlier));

        cache.record_failure("https://new.example", now);
        let fresh_failure = cache.get("https://new.example").unwrap();
        assert!(fresh_failure.domains.is_empty());
        assert!(fresh_failure.last_success_at.is_none());
    }

    #[tokio::test]
    async fn test_flush_and_reload() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("data/source_cache.json");
        let now = Utc::now();

        let mut cache = SourceCache::load(&path).await.unwrap();
        assert!(cache.is_empty());
        cache.record_success("https://a.example", vec!["b.com".into(), "a.com".into()], now);
        cache.record_failure("https://b.example", now);
        cache.flush().await.unwrap();
        assert!(!cache.is_dirty());

        let loaded = SourceCache::load(&path).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get("https://a.example").unwrap().domains, vec!["b.com", "a.com"]);
        assert_eq!(
            loaded.get("https://b.example").unwrap().status,
            Some(FetchStatus::Error)
        );
    }

    #[tokio::test]
    async fn test_corrupt_file_loads_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("cache.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let cache = SourceCache::load(&path).await.unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_reset() {
        let mut cache = SourceCache::empty("unused.json");
        cache.record_success("https://a.example", vec![], Utc::now());
        assert!(cache.reset_source("https://a.example"));
        assert!(!cache.reset_source("https://a.example"));
        cache.record_success("https://b.example", vec![], Utc::now());
        cache.reset_all();
        assert!(cache.is_empty());
    }
}
