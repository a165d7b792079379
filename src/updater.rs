//! Update run driver
//!
//! Wires one run end to end:
//! - load sources, the canonical list and the source cache
//! - fetch what is stale on the bounded worker pool
//! - rank and merge a batch of new domains
//! - write list, cache, JSON report, Markdown report, ledger and metrics,
//!   in that order

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::cache::SourceCache;
use crate::config::Config;
use crate::error::Result;
use crate::http_client::FeedFetcher;
use crate::ledger::DomainLedger;
use crate::list_file::{self, CanonicalList};
use crate::metrics;
use crate::orchestrator::Orchestrator;
use crate::ranker;
use crate::report::{self, markdown, ReportContext, UpdateReport};
use crate::sources::{self, SourceConfig};

/// What a run ended up doing
#[derive(Debug)]
pub enum RunOutcome {
    /// No enabled source; nothing was fetched or written
    NoSources,
    Updated(RunSummary),
}

#[derive(Debug)]
pub struct RunSummary {
    pub report: UpdateReport,
    /// Ranked candidates left for a later run
    pub deferred: usize,
    /// Whether the canonical list file was rewritten
    pub list_written: bool,
}

pub struct Updater {
    config: Config,
    fetcher: Arc<dyn FeedFetcher>,
    source_override: Option<Vec<SourceConfig>>,
}

impl Updater {
    pub fn new(config: Config, fetcher: Arc<dyn FeedFetcher>) -> Self {
        Self {
            config,
            fetcher,
            source_override: None,
        }
    }

    /// Replaces the configured sources with bare URLs for this run
    pub fn with_source_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sources: Vec<SourceConfig> = urls.into_iter().map(SourceConfig::from_url).collect();
        if !sources.is_empty() {
            self.source_override = Some(sources);
        }
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn enabled_sources(&self) -> Result<Vec<Arc<SourceConfig>>> {
        match &self.source_override {
            Some(sources) => Ok(sources
                .iter()
                .filter(|s| s.enabled)
                .cloned()
                .map(Arc::new)
                .collect()),
            None => sources::load_enabled_sources(&self.config.sources_file).await,
        }
    }

    pub async fn run(&self) -> Result<RunOutcome> {
        self.run_at(Utc::now()).await
    }

    /// Runs one update as of `now`
    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<RunOutcome> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        let sources = self.enabled_sources().await?;
        if sources.is_empty() {
            info!("No enabled sources, nothing to do");
            return Ok(RunOutcome::NoSources);
        }

        let list = CanonicalList::load(&self.config.domains_file).await?;
        let mut cache = SourceCache::load(&self.config.cache_file).await?;

        let orchestrator = Orchestrator::new(self.fetcher.clone(), self.config.max_parallel_fetches);
        let round = orchestrator.run(&sources, &mut cache, now).await;
        if round.fetch_errors() {
            warn!(failed = round.failed.len(), "Some sources could not be fetched");
        }

        let outcome = ranker::merge(&list.domains, &round.index, self.config.chunk_size);
        info!(
            added = outcome.added.len(),
            deferred = outcome.deferred,
            total = outcome.merged.len(),
            "Candidates merged"
        );

        let list_written = !outcome.added.is_empty() || list.diagnostics.needs_rewrite();
        if list_written {
            list_file::write(&self.config.domains_file, &outcome.merged).await?;
        }

        cache.flush().await?;

        let report = UpdateReport::build(&ReportContext {
            run_id,
            now,
            sources: &sources,
            existing: &list.domains,
            diagnostics: &list.diagnostics,
            round: &round,
            outcome: &outcome,
            cache: &cache,
        });
        report::write_json(&self.config.report_file, &report).await?;
        markdown::write(&self.config.markdown_file, &report).await?;

        let mut ledger = DomainLedger::load(&self.config.status_file).await?;
        ledger.apply(&outcome.merged, &round.index, now);
        ledger.save().await?;

        metrics::record_domains_added(outcome.added.len());
        metrics::set_canonical_size(outcome.merged.len());
        metrics::observe_run_duration(started.elapsed().as_secs_f64());
        if let Some(path) = &self.config.metrics_file {
            metrics::write_textfile(path).await?;
        }

        info!(
            added = report.added.len(),
            total = report.total_after_update,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Update complete"
        );

        Ok(RunOutcome::Updated(RunSummary {
            report,
            deferred: outcome.deferred,
            list_written,
        }))
    }
}
