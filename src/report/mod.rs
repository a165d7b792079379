//! Update reports
//!
//! Every run that touched at least one source produces a JSON report for
//! tooling and a Markdown rendering of the same data for humans.

pub mod markdown;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::cache::{self, SourceCache};
use crate::error::Result;
use crate::list_file::{DuplicatesInfo, InvalidInfo, ListDiagnostics, NormalizedInfo};
use crate::orchestrator::FetchRound;
use crate::ranker::MergeOutcome;
use crate::sources::SourceConfig;
use crate::storage;

/// Maximum number of stale candidates listed in a report
pub const STALE_LIMIT: usize = 50;

pub const SKIP_REASON_SLA: &str = "sla_missed";
pub const STATUS_NEVER_FETCHED: &str = "never-fetched";
pub const STATUS_UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSource {
    pub name: String,
    pub url: String,
    pub reason: &'static str,
    pub sla_days: Option<u32>,
    pub trust: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceHealth {
    pub name: String,
    pub url: String,
    pub status: String,
    pub trust: f64,
    pub sla_days: Option<u32>,
    pub auto_disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success_at: Option<DateTime<Utc>>,
    pub sla_breached: bool,
}

/// Summary of one update run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateReport {
    pub generated_at: DateTime<Utc>,
    pub run_id: Uuid,
    pub added: Vec<String>,
    pub total_after_update: usize,
    pub sources: Vec<String>,
    pub normalized: NormalizedInfo,
    pub duplicates_removed: DuplicatesInfo,
    pub invalid_lines: InvalidInfo,
    pub stale_candidates: Vec<String>,
    pub stale_total: usize,
    pub skipped_sources: Vec<SkippedSource>,
    pub source_health: Vec<SourceHealth>,
    pub fetch_errors: bool,
}

/// Everything a report is assembled from
pub struct ReportContext<'a> {
    pub run_id: Uuid,
    pub now: DateTime<Utc>,
    /// Enabled sources, in configuration order
    pub sources: &'a [Arc<SourceConfig>],
    /// Canonical list as it was before the merge
    pub existing: &'a BTreeSet<String>,
    pub diagnostics: &'a ListDiagnostics,
    pub round: &'a FetchRound,
    pub outcome: &'a MergeOutcome,
    /// Cache after the fetch phase
    pub cache: &'a SourceCache,
}

impl UpdateReport {
    pub fn build(ctx: &ReportContext<'_>) -> Self {
        let stale: Vec<&String> = ctx
            .existing
            .iter()
            .filter(|domain| !ctx.round.index.contains(domain))
            .collect();

        let skipped_urls: BTreeSet<&str> =
            ctx.round.skipped.iter().map(|s| s.url.as_str()).collect();

        Self {
            generated_at: ctx.now,
            run_id: ctx.run_id,
            added: ctx.outcome.added.clone(),
            total_after_update: ctx.outcome.merged.len(),
            sources: ctx.round.active.iter().map(|s| s.name.clone()).collect(),
            normalized: ctx.diagnostics.normalized.clone(),
            duplicates_removed: ctx.diagnostics.duplicates.clone(),
            invalid_lines: ctx.diagnostics.invalid.clone(),
            stale_candidates: stale.iter().take(STALE_LIMIT).map(|d| d.to_string()).collect(),
            stale_total: stale.len(),
            skipped_sources: ctx
                .round
                .skipped
                .iter()
                .map(|source| SkippedSource {
                    name: source.name.clone(),
                    url: source.url.clone(),
                    reason: SKIP_REASON_SLA,
                    sla_days: source.sla_days,
                    trust: round3(source.trust),
                })
                .collect(),
            source_health: ctx
                .sources
                .iter()
                .map(|source| {
                    describe_health(
                        source,
                        ctx.cache,
                        skipped_urls.contains(source.url.as_str()),
                        ctx.now,
                    )
                })
                .collect(),
            fetch_errors: ctx.round.fetch_errors(),
        }
    }
}

fn describe_health(
    source: &SourceConfig,
    cache: &SourceCache,
    auto_disabled: bool,
    now: DateTime<Utc>,
) -> SourceHealth {
    let entry = cache.get(&source.url);
    let status = match entry {
        None => STATUS_NEVER_FETCHED,
        Some(entry) => entry.status.map(|s| s.as_str()).unwrap_or(STATUS_UNKNOWN),
    };

    SourceHealth {
        name: source.name.clone(),
        url: source.url.clone(),
        status: status.to_string(),
        trust: round3(source.trust),
        sla_days: source.sla_days,
        auto_disabled,
        fetched_at: entry.and_then(|e| e.fetched_at),
        last_success_at: entry.and_then(|e| e.last_success_at),
        sla_breached: cache::sla_missed(source, entry, now),
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Writes the JSON report
pub async fn write_json(path: &Path, report: &UpdateReport) -> Result<()> {
    storage::write_json(path, report).await?;
    info!(
        path = %path.display(),
        added = report.added.len(),
        total = report.total_after_update,
        "Update report written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::DomainIndex;
    use chrono::Duration;

    fn fixture() -> (Vec<Arc<SourceConfig>>, SourceCache, FetchRound, DateTime<Utc>) {
        let now = Utc::now();
        let live = Arc::new(
            SourceConfig::from_url("https://live.example")
                .with_name("live")
                .with_trust(0.66666),
        );
        let late = Arc::new(
            SourceConfig::from_url("https://late.example")
                .with_name("late")
                .with_sla(2, true),
        );
        let fresh = Arc::new(SourceConfig::from_url("https://new.example").with_name("new"));

        let mut cache = SourceCache::empty("unused.json");
        cache.record_success("https://live.example", vec!["b.com".into()], now);
        cache.record_success("https://late.example", vec![], now - Duration::days(5));

        let mut index = DomainIndex::new();
        index.insert("b.com", &live);

        let round = FetchRound {
            index,
            active: vec![live.clone(), fresh.clone()],
            skipped: vec![late.clone()],
            fetched_sources: 1,
            failed: vec!["https://new.example".to_string()],
            ..Default::default()
        };
        (vec![live, late, fresh], cache, round, now)
    }

    #[test]
    fn test_report_fields() {
        let (sources, cache, round, now) = fixture();
        let existing: BTreeSet<String> = ["a.com", "b.com", "c.com"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let outcome = MergeOutcome {
            merged: vec!["a.com".into(), "b.com".into(), "c.com".into()],
            added: vec![],
            deferred: 0,
        };
        let diagnostics = ListDiagnostics::default();

        let report = UpdateReport::build(&ReportContext {
            run_id: Uuid::new_v4(),
            now,
            sources: &sources,
            existing: &existing,
            diagnostics: &diagnostics,
            round: &round,
            outcome: &outcome,
            cache: &cache,
        });

        assert_eq!(report.total_after_update, 3);
        assert_eq!(report.sources, vec!["live", "new"]);
        assert_eq!(report.stale_candidates, vec!["a.com", "c.com"]);
        assert_eq!(report.stale_total, 2);
        assert!(report.fetch_errors);

        assert_eq!(report.skipped_sources.len(), 1);
        assert_eq!(report.skipped_sources[0].reason, "sla_missed");

        let health: Vec<(&str, &str, bool)> = report
            .source_health
            .iter()
            .map(|h| (h.name.as_str(), h.status.as_str(), h.auto_disabled))
            .collect();
        assert_eq!(
            health,
            vec![
                ("live", "ok", false),
                ("late", "ok", true),
                ("new", "never-fetched", false)
            ]
        );
        assert_eq!(report.source_health[0].trust, 0.667);
        assert!(report.source_health[1].sla_breached);
        assert!(!report.source_health[0].sla_breached);
    }

    #[test]
    fn test_stale_candidates_are_capped() {
        let (sources, cache, round, now) = fixture();
        let existing: BTreeSet<String> = (0..80).map(|i| format!("d{i:03}.com")).collect();
        let outcome = MergeOutcome {
            merged: existing.iter().cloned().collect(),
            ..Default::default()
        };
        let diagnostics = ListDiagnostics::default();

        let report = UpdateReport::build(&ReportContext {
            run_id: Uuid::new_v4(),
            now,
            sources: &sources,
            existing: &existing,
            diagnostics: &diagnostics,
            round: &round,
            outcome: &outcome,
            cache: &cache,
        });

        assert_eq!(report.stale_candidates.len(), STALE_LIMIT);
        assert_eq!(report.stale_total, 80);
        assert_eq!(report.stale_candidates[0], "d000.com");
    }

    #[tokio::test]
    async fn test_written_report_always_has_fetch_errors() {
        let (sources, cache, mut round, now) = fixture();
        round.failed.clear();
        let existing = BTreeSet::new();
        let outcome = MergeOutcome::default();
        let diagnostics = ListDiagnostics::default();
        let report = UpdateReport::build(&ReportContext {
            run_id: Uuid::new_v4(),
            now,
            sources: &sources,
            existing: &existing,
            diagnostics: &diagnostics,
            round: &round,
            outcome: &outcome,
            cache: &cache,
        });

        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("reports/latest_update.json");
        write_json(&path, &report).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(written["fetch_errors"], serde_json::json!(false));
        assert_eq!(written["run_id"], serde_json::json!(report.run_id.to_string()));
    }
}
