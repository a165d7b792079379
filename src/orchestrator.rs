//! Fetch orchestration
//!
//! Splits the configured sources into SLA-skipped, cache-fresh and stale
//! sets, fetches the stale ones on a bounded worker pool, folds the results
//! back into the cache and builds the domain → sources index.
//!
//! The index is order-independent: fetch completion order never changes
//! what the ranker sees.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::cache::SourceCache;
use crate::dedup::unique_preserve_order;
use crate::http_client::FeedFetcher;
use crate::metrics;
use crate::sources::{fetch_source, FetchOutcome, SourceConfig};

/// Domain → sources currently reporting it
#[derive(Debug, Clone, Default)]
pub struct DomainIndex {
    map: BTreeMap<String, Vec<Arc<SourceConfig>>>,
}

impl DomainIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `source` reports `domain`; sources stay sorted by URL
    pub fn insert(&mut self, domain: &str, source: &Arc<SourceConfig>) {
        let holders = self.map.entry(domain.to_string()).or_default();
        if let Err(pos) = holders.binary_search_by(|s| s.url.cmp(&source.url)) {
            holders.insert(pos, source.clone());
        }
    }

    pub fn extend<'a>(&mut self, domains: impl IntoIterator<Item = &'a String>, source: &Arc<SourceConfig>) {
        for domain in domains {
            self.insert(domain, source);
        }
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.map.contains_key(domain)
    }

    pub fn sources_of(&self, domain: &str) -> &[Arc<SourceConfig>] {
        self.map.get(domain).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Sorted, deduplicated names of the sources reporting `domain`
    pub fn source_names(&self, domain: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .sources_of(domain)
            .iter()
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Best `weight × trust` among the reporting sources, 0.0 when unknown
    pub fn score(&self, domain: &str) -> f64 {
        self.sources_of(domain)
            .iter()
            .map(|s| s.score())
            .fold(None, |best: Option<f64>, score| {
                Some(best.map_or(score, |b| b.max(score)))
            })
            .unwrap_or(0.0)
    }

    pub fn domains(&self) -> impl Iterator<Item = &String> {
        self.map.keys()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// How the configured sources are handled in one run
#[derive(Debug, Default)]
pub struct FetchPlan {
    /// Auto-disabled because their SLA was missed
    pub skipped: Vec<Arc<SourceConfig>>,
    /// Sources taking part in the run
    pub active: Vec<Arc<SourceConfig>>,
    /// Active sources served from a fresh cache entry
    pub cached: Vec<(Arc<SourceConfig>, Vec<String>)>,
    /// Active sources that need a network fetch
    pub pending: Vec<Arc<SourceConfig>>,
}

/// Outcome of the fetch phase
#[derive(Debug, Default)]
pub struct FetchRound {
    pub index: DomainIndex,
    pub active: Vec<Arc<SourceConfig>>,
    pub skipped: Vec<Arc<SourceConfig>>,
    pub cached_sources: usize,
    pub fetched_sources: usize,
    /// URLs of sources whose fetch failed this run
    pub failed: Vec<String>,
}

impl FetchRound {
    pub fn fetch_errors(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Runs the fetch phase of an update
pub struct Orchestrator {
    fetcher: Arc<dyn FeedFetcher>,
    max_parallel: usize,
}

impl Orchestrator {
    pub fn new(fetcher: Arc<dyn FeedFetcher>, max_parallel: usize) -> Self {
        Self {
            fetcher,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Partitions sources into skipped / cached / pending
    pub fn plan(sources: &[Arc<SourceConfig>], cache: &SourceCache, now: DateTime<Utc>) -> FetchPlan {
        let mut plan = FetchPlan::default();

        for source in sources {
            if source.auto_disable_on_sla && cache.sla_missed(source, now) {
                warn!(
                    source = %source.name,
                    url = %source.url,
                    sla_days = ?source.sla_days,
                    "Source missed its SLA, skipping"
                );
                plan.skipped.push(source.clone());
                continue;
            }
            plan.active.push(source.clone());

            match cache.get(&source.url) {
                Some(entry) if entry.is_fresh(source.update_interval_days, now) => {
                    debug!(source = %source.name, "Serving source from cache");
                    let domains = unique_preserve_order(entry.domains.iter().cloned());
                    plan.cached.push((source.clone(), domains));
                }
                _ => plan.pending.push(source.clone()),
            }
        }

        plan
    }

    /// Fetches what is needed, updates `cache` and returns the merged index
    #[instrument(skip_all, fields(sources = sources.len()))]
    pub async fn run(
        &self,
        sources: &[Arc<SourceConfig>],
        cache: &mut SourceCache,
        now: DateTime<Utc>,
    ) -> FetchRound {
        let plan = Self::plan(sources, cache, now);
        info!(
            active = plan.active.len(),
            skipped = plan.skipped.len(),
            cached = plan.cached.len(),
            pending = plan.pending.len(),
            "Fetch plan ready"
        );

        let mut round = FetchRound {
            active: plan.active,
            skipped: plan.skipped,
            cached_sources: plan.cached.len(),
            ..Default::default()
        };

        for _ in &round.skipped {
            metrics::record_source_result(metrics::SOURCE_SKIPPED);
        }

        for (source, domains) in &plan.cached {
            metrics::record_source_result(metrics::SOURCE_CACHED);
            round.index.extend(domains, source);
        }

        let mut outcomes = self.fetch_all(plan.pending).await;
        outcomes.sort_by(|a, b| a.source.url.cmp(&b.source.url));

        for outcome in outcomes {
            let source = outcome.source;
            match outcome.domains {
                Some(domains) => {
                    metrics::record_source_result(metrics::SOURCE_FETCHED);
                    round.index.extend(&domains, &source);
                    cache.record_success(&source.url, domains, now);
                    round.fetched_sources += 1;
                }
                None => {
                    metrics::record_source_result(metrics::SOURCE_FAILED);
                    cache.record_failure(&source.url, now);
                    round.failed.push(source.url.clone());
                }
            }
        }

        info!(
            domains = round.index.len(),
            fetched = round.fetched_sources,
            failed = round.failed.len(),
            "Fetch phase complete"
        );
        round
    }

    /// Fetches all pending sources, at most `max_parallel` at a time, and
    /// waits for every one of them
    async fn fetch_all(&self, pending: Vec<Arc<SourceConfig>>) -> Vec<FetchOutcome> {
        if pending.is_empty() {
            return Vec::new();
        }

        let workers = self.max_parallel.min(pending.len());
        debug!(workers, pending = pending.len(), "Starting fetch workers");
        let semaphore = Arc::new(Semaphore::new(workers));

        let handles: Vec<_> = pending
            .iter()
            .cloned()
            .map(|source| {
                let semaphore = semaphore.clone();
                let fetcher = self.fetcher.clone();
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    fetch_source(fetcher.as_ref(), source).await
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(pending)
            .map(|(result, source)| match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(source = %source.name, error = %e, "Fetch task panicked");
                    FetchOutcome {
                        source,
                        domains: None,
                    }
                }
            })
            .collect()
    }
}
