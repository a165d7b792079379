//! Blocklist Updater
//!
//! Aggregates external domain feeds into a curated blocklist:
//! - Normalization of hosts-file and plain domain-list formats
//! - Bounded-retry fetching that honours `Retry-After`
//! - Per-source cache with TTL and SLA tracking
//! - Bounded concurrent fetching
//! - Candidate ranking by `weight × trust` with a per-run batch bound
//! - JSON and Markdown change reports plus a per-domain lifecycle ledger
//! - Prometheus metrics exported as a textfile

pub mod cache;
pub mod check;
pub mod config;
pub mod dedup;
pub mod error;
pub mod http_client;
pub mod ledger;
pub mod list_file;
pub mod metrics;
pub mod normalize;
pub mod orchestrator;
pub mod ranker;
pub mod report;
pub mod sources;
pub mod storage;
pub mod updater;

pub use config::Config;
pub use error::{Result, UpdaterError};
pub use http_client::{FeedFetcher, HttpClientConfig, ResilientHttpClient};
pub use updater::{RunOutcome, RunSummary, Updater};
