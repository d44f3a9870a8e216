//! Configuration module for WebIntel
//!
//! This module handles the TOML application configuration and the per-job
//! crawl and collection payloads, including their creation-time validation.
//!
//! # Example
//!
//! ```no_run
//! use webintel::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("webintel.toml")).unwrap();
//! println!("Worker pool size: {}", config.scheduler.max_workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CollectionSpec, Config, CrawlDefaults, CrawlSpec, FetchConfig, SchedulerConfig, StorageConfig,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, load_crawl_spec, parse_crawl_spec,
};

// Re-export validation entry points
pub use validation::{
    validate, validate_collection_spec, validate_crawl_spec, validate_job, MAX_CRAWL_DEPTH,
};
