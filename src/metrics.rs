//! Prometheus metrics for update runs
//!
//! The updater is a one-shot batch job, so nothing scrapes it directly.
//! At the end of a run the registry is dumped in the text exposition format
//! to a file a node-exporter textfile collector can pick up.
//!
//! Metrics include:
//! - fetch attempts by outcome
//! - per-source results (fetched, failed, served from cache, SLA-skipped)
//! - domains added and canonical list size
//! - run duration

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::path::Path;
use tracing::debug;

use crate::error::{Result, UpdaterError};
use crate::storage;

// ============================================
// LABEL VALUES
// ============================================

pub const OUTCOME_OK: &str = "ok";
pub const OUTCOME_RETRYABLE: &str = "retryable";
pub const OUTCOME_TERMINAL: &str = "terminal";

pub const SOURCE_FETCHED: &str = "fetched";
pub const SOURCE_FAILED: &str = "failed";
pub const SOURCE_CACHED: &str = "cached";
pub const SOURCE_SKIPPED: &str = "skipped";

// ============================================
// METRIC DEFINITIONS
// ============================================

static FETCH_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "blocklist_fetch_attempts_total",
        "HTTP fetch attempts by outcome",
        &["outcome"]
    )
    .expect("Failed to create fetch_attempts metric")
});

static SOURCE_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "blocklist_source_results_total",
        "Per-source results of update runs",
        &["result"]
    )
    .expect("Failed to create source_results metric")
});

static DOMAINS_ADDED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "blocklist_domains_added_total",
        "Domains admitted to the canonical list"
    )
    .expect("Failed to create domains_added metric")
});

static CANONICAL_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "blocklist_canonical_domains",
        "Number of domains in the canonical list after the last run"
    )
    .expect("Failed to create canonical_size metric")
});

static RUN_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "blocklist_update_duration_seconds",
        "Wall-clock duration of update runs",
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .expect("Failed to create run_duration metric")
});

// ============================================
// METRICS API
// ============================================

/// Records one HTTP attempt
pub fn record_fetch_attempt(outcome: &str) {
    FETCH_ATTEMPTS.with_label_values(&[outcome]).inc();
}

/// Records how a source contributed to a run
pub fn record_source_result(result: &str) {
    SOURCE_RESULTS.with_label_values(&[result]).inc();
}

pub fn record_domains_added(count: usize) {
    DOMAINS_ADDED.inc_by(count as u64);
}

pub fn set_canonical_size(count: usize) {
    CANONICAL_SIZE.set(count as i64);
}

pub fn observe_run_duration(seconds: f64) {
    RUN_DURATION.observe(seconds);
}

/// Encodes every registered metric in the text exposition format
pub fn gather_text() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| UpdaterError::ValidationError(format!("metrics encoding failed: {e}")))?;
    String::from_utf8(buffer)
        .map_err(|e| UpdaterError::ValidationError(format!("metrics are not UTF-8: {e}")))
}

/// Writes the metrics textfile
pub async fn write_textfile(path: &Path) -> Result<()> {
    let text = gather_text()?;
    storage::write_atomic(path, text.as_bytes()).await?;
    debug!(path = %path.display(), "Metrics textfile written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_are_exported() {
        record_fetch_attempt(OUTCOME_OK);
        record_source_result(SOURCE_CACHED);
        record_domains_added(3);
        set_canonical_size(42);
        observe_run_duration(1.2);

        let text = gather_text().unwrap();
        assert!(text.contains("blocklist_fetch_attempts_total"));
        assert!(text.contains("blocklist_source_results_total"));
        assert!(text.contains("blocklist_domains_added_total"));
        assert!(text.contains("blocklist_canonical_domains"));
    }
}
