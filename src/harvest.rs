//! Harvest run orchestration.
//!
//! One run is: resolve configured formats against the store, walk the tree
//! from the configured root, then resolve the buffered set links. The
//! outcome of each phase is collected into a [`HarvestReport`].

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use crate::config::Config;
use crate::db;
use crate::dispatch::resolve_formats;
use crate::error::HarvestError;
use crate::fetch::FetchClient;
use crate::linker::{link_sets, UnresolvedLink};
use crate::migrate;
use crate::models::StoreCounts;
use crate::sqlite_store::SqliteStore;
use crate::store::Store;
use crate::walker::{CrawlState, WalkOptions, Walker};

/// Summary of one harvest run.
#[derive(Debug, Clone, Default)]
pub struct HarvestReport {
    pub root_url: String,
    pub before: StoreCounts,
    pub after: StoreCounts,
    /// Set resources upserted, whether new or already stored.
    pub sets_visited: usize,
    pub records_visited: usize,
    pub payloads_stored: usize,
    pub payloads_absent: usize,
    pub payload_fetch_failures: usize,
    pub decode_failures: usize,
    pub failed_nodes: usize,
    pub skipped_nodes: usize,
    pub depth_limited: usize,
    pub timestamps_missing: usize,
    pub missing_formats: Vec<String>,
    pub linked: usize,
    pub unresolved: Vec<UnresolvedLink>,
    pub requests: u64,
    pub elapsed: Duration,
}

impl HarvestReport {
    pub fn sets_added(&self) -> i64 {
        self.after.sets - self.before.sets
    }

    pub fn records_added(&self) -> i64 {
        self.after.records - self.before.records
    }
}

/// Run one harvest of `config.source.root_url` into `store`.
#[instrument(skip_all, fields(root = %config.source.root_url))]
pub async fn run_harvest(
    config: &Config,
    store: &dyn Store,
    fetcher: &FetchClient,
) -> Result<HarvestReport, HarvestError> {
    let started = Instant::now();
    let before = store.counts().await?;

    let (formats, missing_formats) = resolve_formats(store, config).await?;
    info!(
        formats = formats.len(),
        missing = missing_formats.len(),
        "resolved metadata formats"
    );

    let options = WalkOptions::from_config(config);
    let mut state = CrawlState::new();
    Walker::new(fetcher, store, &formats, &options)
        .walk(&config.source.root_url, &mut state)
        .await?;

    let pending = std::mem::take(&mut state.pending_links);
    info!(pending = pending.len(), "linking records to sets");
    let links = link_sets(store, pending).await?;

    let after = store.counts().await?;
    let stats = state.stats;
    let report = HarvestReport {
        root_url: config.source.root_url.clone(),
        before,
        after,
        sets_visited: stats.sets_upserted,
        records_visited: stats.records_upserted,
        payloads_stored: stats.dispatch.stored,
        payloads_absent: stats.dispatch.absent,
        payload_fetch_failures: stats.dispatch.fetch_failures,
        decode_failures: stats.dispatch.decode_failures,
        failed_nodes: stats.failed_nodes,
        skipped_nodes: stats.revisits_skipped,
        depth_limited: stats.depth_limited,
        timestamps_missing: stats.timestamps_missing,
        missing_formats,
        linked: links.linked,
        unresolved: links.unresolved,
        requests: fetcher.request_count(),
        elapsed: started.elapsed(),
    };

    if !report.unresolved.is_empty() {
        warn!(count = report.unresolved.len(), "records reference unknown sets");
    }
    info!(
        sets = report.sets_visited,
        records = report.records_visited,
        payloads = report.payloads_stored,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "harvest finished"
    );
    Ok(report)
}

/// `oai-harvest harvest`: harvest into the configured SQLite database and
/// print the summary.
pub async fn run_harvest_command(config: &Config, sleep_secs: Option<f64>) -> Result<()> {
    let mut config = config.clone();
    if let Some(secs) = sleep_secs {
        if !secs.is_finite() || secs < 0.0 {
            anyhow::bail!("--sleep must be a non-negative number of seconds");
        }
        config.harvest.rate_limit_ms = (secs * 1000.0).round() as u64;
    }

    let pool = db::connect(&config).await?;
    migrate::migrate_pool(&pool).await?;
    let store = SqliteStore::new(pool);
    let fetcher = FetchClient::from_config(&config)?;

    let report = run_harvest(&config, &store, &fetcher)
        .await
        .with_context(|| format!("harvest of {} failed", config.source.root_url))?;
    print_report(&report);

    store.pool().close().await;
    Ok(())
}

pub fn print_report(report: &HarvestReport) {
    println!("harvest {}", report.root_url);
    println!(
        "  sets: {} visited, {} added",
        report.sets_visited,
        report.sets_added()
    );
    println!(
        "  records: {} visited, {} added",
        report.records_visited,
        report.records_added()
    );
    println!("  payloads stored: {}", report.payloads_stored);
    if report.decode_failures > 0 {
        println!("  payloads discarded (undecodable): {}", report.decode_failures);
    }
    if report.payload_fetch_failures > 0 {
        println!("  payloads unreachable: {}", report.payload_fetch_failures);
    }
    if report.failed_nodes > 0 {
        println!("  failed resources: {}", report.failed_nodes);
    }
    if report.skipped_nodes > 0 {
        println!("  already visited: {}", report.skipped_nodes);
    }
    if report.depth_limited > 0 {
        println!("  depth limited: {}", report.depth_limited);
    }
    for prefix in &report.missing_formats {
        println!("  missing format: {} (register it with `formats add`)", prefix);
    }
    println!("  set links: {}", report.linked);
    for link in &report.unresolved {
        println!(
            "  unresolved: record '{}' -> set '{}'",
            link.identifier, link.set_spec
        );
    }
    println!(
        "  requests: {} in {:.1}s",
        report.requests,
        report.elapsed.as_secs_f64()
    );
    println!("ok");
}
