//! Source feed configuration
//!
//! Sources are loaded once per run from the JSON sources file and never
//! mutated afterwards. Entries that do not conform are repaired with
//! defaults instead of failing the whole load.

pub mod feed;

use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{LoadError, Result, UpdaterError};
use crate::storage;

pub use feed::{fetch_source, parse_feed, FetchOutcome};

const DEFAULT_CATEGORY: &str = "general";
const DEFAULT_REGION: &str = "global";

/// Describes one external feed, identified by its URL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    pub category: String,
    pub regions: Vec<String>,
    /// Relative importance when ranking candidates
    pub weight: f64,
    /// Reliability in 0..=1, multiplies the weight
    pub trust: f64,
    /// Cache TTL in days, at least 1
    pub update_interval_days: u32,
    /// Maximum days since the last success before the source is unreliable
    pub sla_days: Option<u32>,
    pub auto_disable_on_sla: bool,
    pub enabled: bool,
    pub notes: Option<String>,
}

impl SourceConfig {
    /// Builds a source from a bare URL, with every other field defaulted
    pub fn from_url(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: url.clone(),
            url,
            category: DEFAULT_CATEGORY.to_string(),
            regions: vec![DEFAULT_REGION.to_string()],
            weight: 1.0,
            trust: 1.0,
            update_interval_days: 1,
            sla_days: None,
            auto_disable_on_sla: false,
            enabled: true,
            notes: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_trust(mut self, trust: f64) -> Self {
        self.trust = trust.clamp(0.0, 1.0);
        self
    }

    pub fn with_interval_days(mut self, days: u32) -> Self {
        self.update_interval_days = days.max(1);
        self
    }

    pub fn with_sla(mut self, sla_days: u32, auto_disable: bool) -> Self {
        self.sla_days = Some(sla_days.max(1));
        self.auto_disable_on_sla = auto_disable;
        self
    }

    /// Ranking score contributed by this source
    pub fn score(&self) -> f64 {
        self.weight * self.trust
    }

    /// Parses a single entry of the `sources` array
    fn from_value(item: &Value) -> Option<Self> {
        let url = item.get("url").map(value_to_string).unwrap_or_default();
        let url = url.trim().to_string();
        if url.is_empty() {
            return None;
        }
        if url::Url::parse(&url).is_err() {
            warn!(url = %url, "Source URL does not parse, using it verbatim");
        }

        let name = item
            .get("name")
            .map(value_to_string)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| url.clone());

        let regions = match item.get("regions") {
            Some(Value::Array(values)) => values.iter().map(value_to_string).collect(),
            _ => vec![DEFAULT_REGION.to_string()],
        };

        let weight = item.get("weight").and_then(value_to_f64).unwrap_or(1.0);
        let trust = item.get("trust").and_then(value_to_f64).unwrap_or(1.0);
        let interval = item
            .get("update_interval_days")
            .and_then(value_to_i64)
            .unwrap_or(1);
        let sla_days = item
            .get("sla_days")
            .and_then(value_to_i64)
            .map(|days| days.clamp(1, u32::MAX as i64) as u32);

        Some(Self {
            name,
            url,
            category: item
                .get("category")
                .map(value_to_string)
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            regions,
            weight,
            trust: trust.clamp(0.0, 1.0),
            update_interval_days: interval.clamp(1, u32::MAX as i64) as u32,
            sla_days,
            auto_disable_on_sla: item
                .get("auto_disable_on_sla")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            enabled: item.get("enabled").and_then(Value::as_bool).unwrap_or(true),
            notes: item
                .get("notes")
                .map(value_to_string)
                .filter(|n| !n.is_empty()),
        })
    }
}

/// Parses the sources document `{"sources": [...]}`
pub fn parse_sources(content: &str) -> std::result::Result<Vec<SourceConfig>, LoadError> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let document: Value =
        serde_json::from_str(content).map_err(|e| LoadError::Malformed(e.to_string()))?;

    let items = match document.get("sources") {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(LoadError::Malformed("`sources` is not a list".to_string())),
        None => return Ok(Vec::new()),
    };

    let mut sources = Vec::with_capacity(items.len());
    for item in items {
        match SourceConfig::from_value(item) {
            Some(source) => sources.push(source),
            None => debug!("Skipping source entry without url"),
        }
    }
    Ok(sources)
}

/// Loads all sources from the configuration file.
///
/// A missing file yields an empty list; a malformed one is a configuration
/// error.
pub async fn load_sources(path: &Path) -> Result<Vec<SourceConfig>> {
    let content = match storage::read_text(path).await {
        Ok(content) => content,
        Err(LoadError::Missing) => return Ok(Vec::new()),
        Err(e) => {
            return Err(UpdaterError::LoadFailed {
                path: path.display().to_string(),
                source: e,
            })
        }
    };
    parse_sources(&content).map_err(|e| UpdaterError::LoadFailed {
        path: path.display().to_string(),
        source: e,
    })
}

/// Loads the sources that take part in a run
pub async fn load_enabled_sources(path: &Path) -> Result<Vec<Arc<SourceConfig>>> {
    Ok(load_sources(path)
        .await?
        .into_iter()
        .filter(|s| s.enabled)
        .map(Arc::new)
        .collect())
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_to_f64(value: &Value) -> Option<f64> {
    let parsed: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
