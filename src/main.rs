//! Blocklist Updater
//! Incremental domain blocklist maintenance from external feeds
//!
//! Features:
//! - Bounded concurrent fetching with retries and `Retry-After` support
//! - Per-source cache with TTL and SLA-based auto-disable
//! - Batch-bounded merging ranked by source weight and trust
//! - JSON/Markdown change reports and a domain lifecycle ledger
//! - List validation for the domain and regex lists

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use blocklist_updater::cache::SourceCache;
use blocklist_updater::check;
use blocklist_updater::sources;
use blocklist_updater::{Config, HttpClientConfig, ResilientHttpClient, RunOutcome, Updater};

/// Blocklist Updater - incremental domain blocklist maintenance
#[derive(Parser, Debug)]
#[command(name = "blocklist-updater")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Aggregates external feeds into a curated domain blocklist")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, default_value = "false", global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch sources and merge new domains into the list
    Update {
        /// Maximum number of new domains admitted per run
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Canonical domain list
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Sources configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON report output
        #[arg(long)]
        report: Option<PathBuf>,

        /// Markdown report output
        #[arg(long)]
        markdown_report: Option<PathBuf>,

        /// Domain lifecycle ledger
        #[arg(long)]
        status: Option<PathBuf>,

        /// Source cache
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Feed URL to use instead of the configured sources (repeatable)
        #[arg(long = "source")]
        sources: Vec<String>,
    },

    /// Show configured sources with cache and SLA state
    Status,

    /// Drop cached data so the next run refetches
    Reset {
        /// Source URL to reset (or "all")
        #[arg(short, long)]
        source: String,
    },

    /// Validate the domain list and the regex list
    Check {
        /// Domain list to check
        #[arg(long)]
        domains: Option<PathBuf>,

        /// Regex list to check
        #[arg(long)]
        regex: Option<PathBuf>,
    },
}

/// Sets up structured logging with tracing
fn setup_logging(log_level: &str, json_output: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Blocklist Updater");

    let mut config = Config::load()?;

    match cli.command {
        Commands::Update {
            chunk_size,
            dest,
            config: sources_file,
            report,
            markdown_report,
            status,
            cache,
            sources,
        } => {
            if let Some(chunk_size) = chunk_size {
                config.chunk_size = chunk_size;
            }
            override_path(&mut config.domains_file, dest);
            override_path(&mut config.sources_file, sources_file);
            override_path(&mut config.report_file, report);
            override_path(&mut config.markdown_file, markdown_report);
            override_path(&mut config.status_file, status);
            override_path(&mut config.cache_file, cache);
            config.validate()?;

            info!(
                domains = %config.domains_file.display(),
                sources = %config.sources_file.display(),
                chunk_size = config.chunk_size,
                max_parallel = config.max_parallel_fetches,
                "Configuration loaded"
            );

            run_update(config, sources).await?;
        }

        Commands::Status => {
            show_status(config).await?;
        }

        Commands::Reset { source } => {
            reset_cache(config, &source).await?;
        }

        Commands::Check { domains, regex } => {
            override_path(&mut config.domains_file, domains);
            override_path(&mut config.regex_file, regex);
            if !run_check(config).await {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn override_path(target: &mut PathBuf, value: Option<PathBuf>) {
    if let Some(value) = value {
        *target = value;
    }
}

/// Runs a single update
async fn run_update(config: Config, source_urls: Vec<String>) -> Result<()> {
    let client = ResilientHttpClient::new(HttpClientConfig::from_config(&config))?;
    let updater = Updater::new(config, Arc::new(client)).with_source_urls(source_urls);

    match updater.run().await {
        Ok(RunOutcome::NoSources) => {
            println!("No enabled sources configured, nothing to do");
        }
        Ok(RunOutcome::Updated(summary)) => {
            let report = &summary.report;
            println!("\nUpdate Summary");
            println!("==============");
            println!("Run:      {}", report.run_id);
            println!("Added:    {}", report.added.len());
            println!("Deferred: {}", summary.deferred);
            println!("Total:    {}", report.total_after_update);
            println!("Stale:    {}", report.stale_total);
            println!("Skipped:  {}", report.skipped_sources.len());
            if report.fetch_errors {
                println!("Some sources failed to fetch, see the report for details");
            }
        }
        Err(e) => {
            error!(error = %e, "Update failed");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Shows configured sources with their cache state
async fn show_status(config: Config) -> Result<()> {
    let now = Utc::now();
    let configured = sources::load_sources(&config.sources_file).await?;
    let cache = SourceCache::load(&config.cache_file).await?;

    println!("\nBlocklist Updater Status");
    println!("========================\n");

    if configured.is_empty() {
        println!("No sources configured in {}", config.sources_file.display());
        return Ok(());
    }

    for source in &configured {
        let entry = cache.get(&source.url);
        let status = entry
            .map(|e| e.status.map(|s| s.as_str()).unwrap_or("unknown"))
            .unwrap_or("never-fetched");
        let last_success = match entry.and_then(|e| e.effective_last_success()) {
            Some(at) => {
                let age = (now - at).to_std().unwrap_or_default();
                let age = std::time::Duration::from_secs(age.as_secs());
                format!("{} ago", humantime::format_duration(age))
            }
            None => "never".to_string(),
        };

        println!("{} ({})", source.name, source.url);
        println!("  enabled:      {}", source.enabled);
        println!("  status:       {}", status);
        println!("  last success: {}", last_success);
        println!("  domains:      {}", entry.map(|e| e.domains.len()).unwrap_or(0));
        println!(
            "  fresh:        {} (ttl {} days)",
            cache.is_fresh(source, now),
            source.update_interval_days
        );
        match source.sla_days {
            Some(days) => println!(
                "  sla:          {} days, {}{}",
                days,
                if cache.sla_missed(source, now) { "missed" } else { "met" },
                if source.auto_disable_on_sla { ", auto-disable" } else { "" }
            ),
            None => println!("  sla:          none"),
        }
    }

    println!("\nFiles:");
    println!("  List:   {}", config.domains_file.display());
    println!("  Cache:  {} ({} sources)", config.cache_file.display(), cache.len());
    println!("  Report: {}", config.report_file.display());

    Ok(())
}

/// Drops cache entries for one source or for all of them
async fn reset_cache(config: Config, source: &str) -> Result<()> {
    let mut cache = SourceCache::load(&config.cache_file).await?;

    if source == "all" {
        cache.reset_all();
        println!("Reset all cached sources");
    } else if cache.reset_source(source) {
        println!("Reset cached source: {}", source);
    } else {
        println!("No cache entry for source: {}", source);
    }

    if cache.is_dirty() {
        cache.flush().await?;
    }
    Ok(())
}

/// Validates the lists; returns false when issues were found
async fn run_check(config: Config) -> bool {
    let issues = check::run_checks(&config.domains_file, &config.regex_file).await;
    if issues.is_empty() {
        println!("Lists are valid");
        return true;
    }
    for issue in &issues {
        println!("{}", issue);
    }
    false
}
