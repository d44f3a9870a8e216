//! WebIntel: a crawl job orchestration engine
//!
//! This crate runs many independent, long-lived crawl jobs concurrently. Each job
//! can be paused, resumed, or stopped from outside while its breadth-first
//! traversal is in flight, and unfinished jobs are recovered from the run store
//! after a restart.
//!
//! # Components
//!
//! - [`state::JobController`]: per-job cooperative cancellation state
//! - [`crawler::CrawlEngine`]: breadth-first traversal for one job
//! - [`scheduler::JobScheduler`]: worker pool, executor registry, and recovery

pub mod config;
pub mod crawler;
pub mod output;
pub mod scheduler;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

// Re-export commonly used types
pub use config::{Config, CrawlSpec};
pub use crawler::{CrawlEngine, CrawlReport, PageResult};
pub use scheduler::{JobExecutor, JobScheduler};
pub use state::{ControlStatus, JobController, JobOutcome, JobStatus};
pub use storage::{JobKind, JobRecord, RunStore, SqliteRunStore};
pub use url::{normalize_url, DomainMatch, LinkPolicy};
