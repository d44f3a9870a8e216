//! WebIntel main entry point
//!
//! This is the command-line interface for the WebIntel crawl job orchestrator.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use webintel::config::{load_config_with_hash, load_crawl_spec, Config};
use webintel::crawler::{CrawlEngine, HttpFetchClient};
use webintel::output::{load_run_statistics, print_run_statistics, print_run_table};
use webintel::scheduler::{
    create_job, CrawlExecutor, ExecutorRegistry, JobScheduler, NoSearchProvider,
};
use webintel::storage::{NewRun, RunStore, SqliteRunStore};
use webintel::JobController;

/// WebIntel: concurrent, controllable crawl jobs
///
/// Jobs are stored in a SQLite run store. `submit` adds pending jobs, `run`
/// processes every pending job with a fixed-size worker pool.
#[derive(Parser, Debug)]
#[command(name = "webintel")]
#[command(version)]
#[command(about = "Concurrent crawl job orchestrator", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recover pending jobs and process them until idle or Ctrl-C
    Run,

    /// Create a pending job
    Submit {
        /// Free-text query for a search-seeded crawl
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        query: Option<String>,

        /// Maximum link depth for a query crawl
        #[arg(long, default_value_t = 2)]
        max_depth: u32,

        /// TOML file describing a configured crawl
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// List all runs
    List,

    /// Show a run's statistics
    Show {
        #[arg(value_name = "RUN_ID")]
        run_id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let store: Arc<dyn RunStore> = Arc::new(
        SqliteRunStore::open(Path::new(&config.storage.database_path))
            .with_context(|| format!("failed to open {}", config.storage.database_path))?,
    );

    match cli.command {
        Command::Run => handle_run(config, store).await,
        Command::Submit {
            query,
            max_depth,
            file,
        } => handle_submit(store.as_ref(), query, max_depth, file),
        Command::List => {
            print_run_table(&store.list_runs()?);
            Ok(())
        }
        Command::Show { run_id } => {
            let stats = load_run_statistics(store.as_ref(), run_id)?;
            print_run_statistics(&stats);
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("webintel=info,warn"),
            1 => EnvFilter::new("webintel=debug,info"),
            2 => EnvFilter::new("webintel=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn handle_submit(
    store: &dyn RunStore,
    query: Option<String>,
    max_depth: u32,
    file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let run = match (query, file) {
        (_, Some(path)) => {
            let spec = load_crawl_spec(&path)
                .with_context(|| format!("invalid crawl file {}", path.display()))?;
            NewRun::configured_crawl(&spec)?
        }
        (Some(query), None) => NewRun::basic_crawl(query, max_depth),
        (None, None) => anyhow::bail!("either --query or --file is required"),
    };

    let run_id = create_job(store, &run)?;
    println!("Created {} run {}", run.kind, run_id);
    Ok(())
}

/// Processes pending jobs until the pool is idle or Ctrl-C arrives
async fn handle_run(config: Config, store: Arc<dyn RunStore>) -> anyhow::Result<()> {
    let controller = Arc::new(JobController::new());
    let fetcher = Arc::new(HttpFetchClient::new(config.fetch.clone())?);
    let engine = Arc::new(CrawlEngine::new(Arc::clone(&controller), fetcher));

    // No search backend or content collectors are wired into the CLI
    let registry = ExecutorRegistry::new()
        .with(Arc::new(CrawlExecutor::basic(
            Arc::clone(&engine),
            Arc::new(NoSearchProvider),
            config.crawl.clone(),
        )))
        .with(Arc::new(CrawlExecutor::configured(engine)));

    let scheduler = JobScheduler::new(
        config.scheduler.max_workers,
        controller,
        Arc::clone(&store),
        registry,
    );

    let scheduled = scheduler.start_at_init()?;
    if scheduled.is_empty() {
        tracing::info!("No pending jobs");
        return Ok(());
    }

    tokio::select! {
        _ = scheduler.wait_idle() => {
            tracing::info!("All jobs finished");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            tracing::warn!("Interrupted, shutting down");
            let remaining = scheduler.shutdown_timeout(config.scheduler.shutdown_grace()).await;
            if remaining > 0 {
                tracing::warn!(remaining, "exiting with jobs still running");
            }
        }
    }

    for task in scheduler.tasks() {
        println!("{:<16} {:<10} {}", task.task_id, task.state.as_str(), task.query);
    }
    Ok(())
}
