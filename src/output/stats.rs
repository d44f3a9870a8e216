//! Run statistics from the run store
//!
//! This module provides functionality for extracting and displaying
//! per-run statistics and the run listing used by the CLI.

use crate::storage::{JobRecord, RunStore, StoreError};
use std::collections::{BTreeMap, BTreeSet};
use url::Url;

/// Statistics for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatistics {
    pub run: JobRecord,

    /// Number of stored pages
    pub total_pages: u64,

    /// Number of stored outgoing links
    pub total_links: u64,

    /// Stored pages per crawl depth
    pub depth_breakdown: BTreeMap<u32, u64>,

    /// Distinct hosts of the stored pages, sorted
    pub hosts: Vec<String>,

    /// Seconds from creation to completion, for finished runs
    pub duration_seconds: Option<i64>,
}

/// Loads statistics for a run
///
/// # Arguments
///
/// * `store` - The run store to query
/// * `run_id` - The run to summarize
///
/// # Returns
///
/// * `Ok(RunStatistics)` - Successfully loaded statistics
/// * `Err(StoreError)` - Unknown run or failed query
pub fn load_run_statistics(store: &dyn RunStore, run_id: i64) -> Result<RunStatistics, StoreError> {
    let run = store.get_run(run_id)?;
    let pages = store.list_pages(run_id)?;
    let total_links = store.count_links(run_id)?;

    let mut depth_breakdown = BTreeMap::new();
    let mut hosts = BTreeSet::new();
    for page in &pages {
        *depth_breakdown.entry(page.crawl_depth).or_insert(0) += 1;
        if let Some(host) = Url::parse(&page.url).ok().and_then(|u| u.host_str().map(str::to_string)) {
            hosts.insert(host);
        }
    }

    let duration_seconds = run
        .completed_at
        .map(|finished| (finished - run.created_at).num_seconds());

    Ok(RunStatistics {
        total_pages: u64::try_from(pages.len()).unwrap_or(u64::MAX),
        total_links,
        depth_breakdown,
        hosts: hosts.into_iter().collect(),
        duration_seconds,
        run,
    })
}

/// Prints run statistics to stdout in a formatted manner
pub fn print_run_statistics(stats: &RunStatistics) {
    let run = &stats.run;
    println!("=== Run {} ===\n", run.id);

    println!("Overview:");
    println!("  Kind: {}", run.kind);
    println!("  Query: {}", run.query);
    println!("  Status: {}", run.status);
    println!("  Max depth: {}", run.max_depth);
    println!("  Created: {}", run.created_at.to_rfc3339());
    if let Some(completed) = run.completed_at {
        println!("  Completed: {}", completed.to_rfc3339());
    }
    if let Some(seconds) = stats.duration_seconds {
        println!("  Duration: {}s", seconds);
    }
    if let Some(error) = &run.error_message {
        println!("  Error: {}", error);
    }
    println!();

    println!("Pages:");
    println!("  Crawled: {}", run.pages_crawled);
    println!("  Discovered: {}", run.pages_total);
    println!("  Stored: {}", stats.total_pages);
    println!("  Links stored: {}", stats.total_links);
    println!();

    if !stats.depth_breakdown.is_empty() {
        println!("Pages by Depth:");
        for (depth, count) in &stats.depth_breakdown {
            println!("  Depth {}: {}", depth, count);
        }
        println!();
    }

    if !stats.hosts.is_empty() {
        println!("Hosts ({}):", stats.hosts.len());
        for host in &stats.hosts {
            println!("  - {}", host);
        }
    }
}

/// Prints one line per run
pub fn print_run_table(runs: &[JobRecord]) {
    if runs.is_empty() {
        println!("No runs found");
        return;
    }

    println!(
        "{:>6}  {:<18}  {:<9}  {:>7}  {:<20}  QUERY",
        "ID", "KIND", "STATUS", "PAGES", "CREATED"
    );
    for run in runs {
        println!(
            "{:>6}  {:<18}  {:<9}  {:>7}  {:<20}  {}",
            run.id,
            run.kind.to_db_string(),
            run.status.to_db_string(),
            run.pages_crawled,
            run.created_at.format("%Y-%m-%d %H:%M:%S"),
            run.query
        );
    }
}
