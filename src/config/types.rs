use crate::url::DomainMatch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Main configuration structure for WebIntel
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub crawl: CrawlDefaults,
    pub storage: StorageConfig,
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of jobs executing at once
    #[serde(rename = "max-workers")]
    pub max_workers: usize,

    /// How long `run` waits for in-flight jobs after an interrupt (seconds)
    #[serde(rename = "shutdown-grace-secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            shutdown_grace_secs: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// HTTP fetch client configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Navigation timeout per request (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Extra attempts after the first one fails
    #[serde(rename = "retry-attempts")]
    pub retry_attempts: u32,

    /// Fixed delay after an HTTP error status, and the base of the transport backoff (milliseconds)
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Default User-Agent header; jobs may override it
    #[serde(rename = "user-agent")]
    pub user_agent: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            retry_attempts: 5,
            retry_delay_ms: 20_000,
            user_agent: None,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Defaults applied to crawls created from a bare query
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CrawlDefaults {
    #[serde(rename = "default-max-pages")]
    pub default_max_pages: u32,

    /// Politeness delay between fetches (seconds)
    #[serde(rename = "default-wait-time-secs")]
    pub default_wait_time_secs: f64,

    /// Number of search hits used as seeds
    #[serde(rename = "search-results")]
    pub search_results: usize,
}

impl Default for CrawlDefaults {
    fn default() -> Self {
        Self {
            default_max_pages: 50,
            default_wait_time_secs: 1.0,
            search_results: 5,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Crawl parameters stored in a job record's config payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlSpec {
    /// Label stored on the job record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    #[serde(default)]
    pub start_urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_domains: Option<Vec<String>>,

    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    #[serde(default)]
    pub follow_external_links: bool,

    /// Politeness delay between fetches (seconds)
    #[serde(default = "default_wait_time")]
    pub wait_time: f64,

    /// Named CSS selectors the fetch client waits for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_selectors: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(default)]
    pub domain_match: DomainMatch,
}

fn default_max_depth() -> u32 {
    2
}

fn default_max_pages() -> u32 {
    100
}

fn default_wait_time() -> f64 {
    0.5
}

impl Default for CrawlSpec {
    fn default() -> Self {
        Self {
            query: None,
            start_urls: Vec::new(),
            allowed_domains: None,
            max_depth: default_max_depth(),
            max_pages: default_max_pages(),
            follow_external_links: false,
            wait_time: default_wait_time(),
            css_selectors: None,
            proxy: None,
            user_agent: None,
            domain_match: DomainMatch::default(),
        }
    }
}

impl CrawlSpec {
    /// Spec for a crawl seeded from search results
    pub fn from_defaults(defaults: &CrawlDefaults, query: &str, max_depth: u32) -> Self {
        Self {
            query: Some(query.to_string()),
            max_depth,
            max_pages: defaults.default_max_pages,
            wait_time: defaults.default_wait_time_secs,
            ..Self::default()
        }
    }

    /// Delay between successive fetches; invalid values collapse to zero
    pub fn politeness_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.wait_time).unwrap_or(Duration::ZERO)
    }

    pub fn wait_for_selectors(&self) -> Vec<String> {
        self.css_selectors
            .as_ref()
            .map(|selectors| selectors.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Multi-source collection parameters stored in a job record's config payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    pub content_query: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_expertise: Option<String>,

    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    #[serde(default = "default_max_items")]
    pub max_items_per_source: u32,
}

fn default_sources() -> Vec<String> {
    ["web", "pdf", "social", "video", "podcast", "dataset"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_items() -> u32 {
    5
}

impl CollectionSpec {
    pub fn new(content_query: impl Into<String>) -> Self {
        Self {
            content_query: content_query.into(),
            domain_expertise: None,
            sources: default_sources(),
            max_items_per_source: default_max_items(),
        }
    }
}
