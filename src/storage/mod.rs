//! Storage module for persisting job runs
//!
//! This module handles all database operations for the orchestrator, including:
//! - SQLite database initialization and schema management
//! - Job run records and their status lifecycle
//! - Scraped page persistence
//! - Link relationship tracking

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteRunStore;
pub use traits::{RunStore, StoreError, StoreResult};

use crate::config::CrawlSpec;
use crate::state::JobStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of work a job record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Crawl seeded from search results for a query
    BasicCrawl,
    /// Crawl driven by an explicit `CrawlSpec` payload
    ConfiguredCrawl,
    /// Multi-source collection driven by a `CollectionSpec` payload
    ContentCollection,
}

impl JobKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::BasicCrawl => "basic_crawl",
            Self::ConfiguredCrawl => "configured_crawl",
            Self::ContentCollection => "content_collection",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "basic_crawl" => Some(Self::BasicCrawl),
            "configured_crawl" => Some(Self::ConfiguredCrawl),
            "content_collection" => Some(Self::ContentCollection),
            _ => None,
        }
    }

    /// Prefix of the scheduler task ids for this kind
    pub fn task_prefix(&self) -> &'static str {
        match self {
            Self::BasicCrawl => "scrape",
            Self::ConfiguredCrawl => "crawl",
            Self::ContentCollection => "collect",
        }
    }

    pub fn all() -> [Self; 3] {
        [
            Self::BasicCrawl,
            Self::ConfiguredCrawl,
            Self::ContentCollection,
        ]
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Deterministic scheduler task id for a run
pub fn task_id(kind: JobKind, run_id: i64) -> String {
    format!("{}_{}", kind.task_prefix(), run_id)
}

/// A job run as stored in the run store
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: i64,
    pub kind: JobKind,
    pub query: String,
    /// Kind-specific payload, interpreted by the executor
    pub config: Option<Value>,
    pub status: JobStatus,
    pub max_depth: u32,
    pub pages_crawled: u64,
    pub pages_total: u64,
    /// Cause of a `failed` status
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn task_id(&self) -> String {
        task_id(self.kind, self.id)
    }
}

/// Fields needed to create a run; it always starts `pending`
#[derive(Debug, Clone, PartialEq)]
pub struct NewRun {
    pub kind: JobKind,
    pub query: String,
    pub config: Option<Value>,
    pub max_depth: u32,
}

impl NewRun {
    pub fn basic_crawl(query: impl Into<String>, max_depth: u32) -> Self {
        Self {
            kind: JobKind::BasicCrawl,
            query: query.into(),
            config: None,
            max_depth,
        }
    }

    /// A configured crawl; the query column gets the crawl spec's label or first seed
    pub fn configured_crawl(spec: &CrawlSpec) -> Result<Self, serde_json::Error> {
        let query = spec
            .query
            .clone()
            .or_else(|| spec.start_urls.first().cloned())
            .unwrap_or_default();

        Ok(Self {
            kind: JobKind::ConfiguredCrawl,
            query,
            config: Some(serde_json::to_value(spec)?),
            max_depth: spec.max_depth,
        })
    }

    pub fn content_collection(
        spec: &crate::config::CollectionSpec,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: JobKind::ContentCollection,
            query: spec.content_query.clone(),
            config: Some(serde_json::to_value(spec)?),
            max_depth: 0,
        })
    }
}

/// An outgoing link to store with a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub target_url: String,
    pub anchor_text: String,
    pub is_internal: bool,
}

/// A page to store under a run
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewPage {
    pub url: String,
    pub title: Option<String>,
    pub crawl_depth: u32,
    pub content_text: String,
    pub content_html: Option<String>,
    pub metadata: Map<String, Value>,
    pub links: Vec<NewLink>,
}

/// Represents a stored page
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub id: i64,
    pub run_id: i64,
    pub url: String,
    pub title: Option<String>,
    pub crawl_depth: u32,
    pub content_text: String,
    pub content_html: Option<String>,
    pub metadata: Map<String, Value>,
    pub scraped_at: DateTime<Utc>,
}

/// Represents a link relationship between a stored page and a target URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub source_page_id: i64,
    pub target_url: String,
    pub anchor_text: String,
    pub is_internal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_kind_roundtrip() {
        for kind in JobKind::all() {
            assert_eq!(JobKind::from_db_string(kind.to_db_string()), Some(kind));
        }
        assert_eq!(JobKind::from_db_string("invalid"), None);
    }

    #[test]
    fn test_task_ids() {
        assert_eq!(task_id(JobKind::BasicCrawl, 7), "scrape_7");
        assert_eq!(task_id(JobKind::ConfiguredCrawl, 7), "crawl_7");
        assert_eq!(task_id(JobKind::ContentCollection, 12), "collect_12");
    }

    #[test]
    fn test_configured_crawl_query_falls_back_to_seed() {
        let spec = CrawlSpec {
            start_urls: vec!["https://example.com/".to_string()],
            ..CrawlSpec::default()
        };
        let run = NewRun::configured_crawl(&spec).unwrap();
        assert_eq!(run.kind, JobKind::ConfiguredCrawl);
        assert_eq!(run.query, "https://example.com/");
        assert_eq!(run.max_depth, 2);
        assert_eq!(run.config.unwrap()["start_urls"][0], "https://example.com/");
    }

    #[test]
    fn test_content_collection_run() {
        let spec = crate::config::CollectionSpec::new("rust async");
        let run = NewRun::content_collection(&spec).unwrap();
        assert_eq!(run.kind, JobKind::ContentCollection);
        assert_eq!(run.query, "rust async");
        assert_eq!(run.config.unwrap()["max_items_per_source"], 5);
    }
}
