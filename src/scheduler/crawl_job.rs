//! Crawl executors
//!
//! Both crawl kinds drive the shared `CrawlEngine`; they differ only in where
//! the seeds and traversal bounds come from:
//! - `basic_crawl`: seeds from a search for the record's query, bounds from
//!   the configured crawl defaults
//! - `configured_crawl`: seeds and bounds from the record's `CrawlSpec` payload
//!
//! Every crawled page is written to the run store through `StorePageSink`.

use crate::config::{CrawlDefaults, CrawlSpec};
use crate::crawler::{CrawlEngine, CrawlSettings, PageResult, PageSink, SinkError};
use crate::scheduler::executor::{ExecutionSummary, JobContext, JobError, JobExecutor};
use crate::scheduler::search::{SearchHit, SeedProvider};
use crate::storage::{JobKind, JobRecord, NewLink, NewPage, RunStore};
use crate::ConfigError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Persists each crawled page with its links and refreshes the run's page count
pub struct StorePageSink {
    store: Arc<dyn RunStore>,
    run_id: i64,
}

impl StorePageSink {
    pub fn new(store: Arc<dyn RunStore>, run_id: i64) -> Self {
        Self { store, run_id }
    }
}

impl PageSink for StorePageSink {
    fn on_page(&self, page: PageResult) -> Result<(), SinkError> {
        let links = page
            .links
            .into_iter()
            .map(|link| NewLink {
                target_url: link.url,
                anchor_text: link.anchor_text,
                is_internal: link.is_internal,
            })
            .collect();

        let record = NewPage {
            url: page.url,
            title: page.title,
            crawl_depth: page.depth,
            content_text: page.text,
            content_html: Some(page.content),
            metadata: page.metadata,
            links,
        };

        self.store.insert_page(self.run_id, &record)?;
        let count = self.store.count_pages(self.run_id)?;
        self.store.set_pages_crawled(self.run_id, count)?;
        Ok(())
    }
}

enum Seeding {
    Search {
        provider: Arc<dyn SeedProvider>,
        defaults: CrawlDefaults,
    },
    Configured,
}

/// Executor for `basic_crawl` and `configured_crawl` jobs
pub struct CrawlExecutor {
    engine: Arc<CrawlEngine>,
    seeding: Seeding,
}

impl CrawlExecutor {
    /// Executor for query-seeded crawls
    pub fn basic(
        engine: Arc<CrawlEngine>,
        provider: Arc<dyn SeedProvider>,
        defaults: CrawlDefaults,
    ) -> Self {
        Self {
            engine,
            seeding: Seeding::Search { provider, defaults },
        }
    }

    /// Executor for crawls described by a `CrawlSpec` payload
    pub fn configured(engine: Arc<CrawlEngine>) -> Self {
        Self {
            engine,
            seeding: Seeding::Configured,
        }
    }

    fn parse_spec(payload: &Value) -> Result<CrawlSpec, JobError> {
        serde_json::from_value(payload.clone())
            .map_err(|e| JobError::Config(ConfigError::from(e)))
    }

    /// Resolves the traversal spec and seed list for a job
    async fn prepare(
        &self,
        ctx: &JobContext,
        job: &JobRecord,
    ) -> Result<(CrawlSpec, Vec<String>), JobError> {
        match &self.seeding {
            Seeding::Search { provider, defaults } => {
                // An explicit crawl spec is used as-is; search runs only without one
                if let Some(payload) = &job.config {
                    let mut spec = Self::parse_spec(payload)?;
                    spec.max_depth = job.max_depth;
                    tracing::debug!(task_id = %ctx.task_id, seeds = spec.start_urls.len(), "using seeds from crawl spec");
                    let seeds = spec.start_urls.clone();
                    return Ok((spec, seeds));
                }

                let spec = CrawlSpec::from_defaults(defaults, &job.query, job.max_depth);
                let hits = provider
                    .search(&job.query, defaults.search_results)
                    .await
                    .map_err(|e| JobError::Search(format!("{:#}", e)))?;
                tracing::info!(task_id = %ctx.task_id, hits = hits.len(), "search seeds resolved");
                record_search_hits(ctx.store.as_ref(), job.id, &hits)?;

                let seeds = hits.into_iter().map(|hit| hit.url).collect();
                Ok((spec, seeds))
            }
            Seeding::Configured => {
                let payload = job.config.as_ref().ok_or_else(|| {
                    ConfigError::Validation("configured crawl has no crawl spec".to_string())
                })?;
                let spec = Self::parse_spec(payload)?;
                let seeds = spec.start_urls.clone();
                Ok((spec, seeds))
            }
        }
    }
}

/// Stores search hits as depth-0 pages ahead of the traversal
fn record_search_hits(store: &dyn RunStore, run_id: i64, hits: &[SearchHit]) -> Result<(), JobError> {
    for (index, hit) in hits.iter().enumerate() {
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), Value::from("search"));
        metadata.insert("position".to_string(), Value::from(index + 1));
        if let Some(site) = &hit.site {
            metadata.insert("site".to_string(), Value::from(site.as_str()));
        }

        store.insert_page(
            run_id,
            &NewPage {
                url: hit.url.clone(),
                title: Some(hit.title.clone()),
                crawl_depth: 0,
                content_text: hit.snippet.clone(),
                content_html: None,
                metadata,
                links: Vec::new(),
            },
        )?;
    }

    if !hits.is_empty() {
        store.set_pages_crawled(run_id, store.count_pages(run_id)?)?;
    }
    Ok(())
}

#[async_trait]
impl JobExecutor for CrawlExecutor {
    fn kind(&self) -> JobKind {
        match self.seeding {
            Seeding::Search { .. } => JobKind::BasicCrawl,
            Seeding::Configured => JobKind::ConfiguredCrawl,
        }
    }

    async fn execute(
        &self,
        ctx: &JobContext,
        job: &JobRecord,
    ) -> Result<ExecutionSummary, JobError> {
        let (spec, seeds) = self.prepare(ctx, job).await?;
        let settings = CrawlSettings::from_spec(&spec);
        let sink = StorePageSink::new(Arc::clone(&ctx.store), job.id);

        let report = self.engine.run(&ctx.task_id, &seeds, &settings, &sink).await?;

        let discovered = u64::try_from(report.discovered).unwrap_or(u64::MAX);
        ctx.store.set_pages_total(job.id, discovered)?;

        for failure in &report.failed {
            tracing::debug!(task_id = %ctx.task_id, url = %failure.url, error = %failure.error, "url failed");
        }

        Ok(ExecutionSummary {
            outcome: report.outcome,
            pages_crawled: report.pages_crawled,
            failed_urls: report.failed,
        })
    }
}
