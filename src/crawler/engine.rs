//! Crawl engine - breadth-first traversal for one job
//!
//! The engine drives a single job's frontier from its seeds until the frontier
//! empties, the page budget is spent, or the job's controller says stop. Between
//! page fetches it parks on the controller while the job is paused; a fetch that
//! has already started always runs to completion.

use crate::config::CrawlSpec;
use crate::crawler::fetcher::{FetchClient, FetchOptions};
use crate::crawler::frontier::{CrawlTask, Frontier};
use crate::crawler::parser::{DocumentExtractor, ExtractedLink, HtmlExtractor, LinkExtractor};
use crate::state::{ControlStatus, JobController, JobOutcome, StatsUpdate};
use crate::storage::StoreError;
use crate::url::{normalize_url, same_authority, LinkPolicy};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Per-job traversal bounds and link policy
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlSettings {
    pub max_depth: u32,
    pub max_pages: u32,
    pub politeness_delay: Duration,
    pub policy: LinkPolicy,
    pub fetch_options: FetchOptions,
}

impl CrawlSettings {
    pub fn from_spec(spec: &CrawlSpec) -> Self {
        Self {
            max_depth: spec.max_depth,
            max_pages: spec.max_pages,
            politeness_delay: spec.politeness_delay(),
            policy: LinkPolicy::new(
                spec.allowed_domains.as_deref().unwrap_or_default(),
                spec.follow_external_links,
                spec.domain_match,
            ),
            fetch_options: FetchOptions {
                wait_for_selectors: spec.wait_for_selectors(),
                proxy: spec.proxy.clone(),
                user_agent: spec.user_agent.clone(),
                navigation_timeout: None,
            },
        }
    }
}

/// One successfully crawled page, handed to the sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageResult {
    pub url: String,
    pub depth: u32,
    /// Raw response body
    pub content: String,
    pub title: Option<String>,
    pub text: String,
    pub metadata: Map<String, Value>,
    /// Links that passed normalization and the job's link policy
    pub links: Vec<ExtractedLink>,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("run store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Rejected(String),
}

/// Receives every page the engine crawls
///
/// The engine waits for `on_page` to return before it continues. Errors are
/// logged and never abort the job.
pub trait PageSink: Send + Sync {
    fn on_page(&self, page: PageResult) -> Result<(), SinkError>;
}

impl<F> PageSink for F
where
    F: Fn(PageResult) -> Result<(), SinkError> + Send + Sync,
{
    fn on_page(&self, page: PageResult) -> Result<(), SinkError> {
        self(page)
    }
}

/// A URL that could not be crawled, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUrl {
    pub url: String,
    pub error: String,
}

/// Summary of one traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub job_id: String,
    pub outcome: JobOutcome,
    pub pages_crawled: u64,
    pub bytes_downloaded: u64,
    /// Visited URLs in sorted order
    pub visited: Vec<String>,
    pub failed: Vec<FailedUrl>,
    /// Distinct URLs seen by the job
    pub discovered: usize,
    /// True if the loop ended on the page budget
    pub budget_exhausted: bool,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("job {0} is not registered with the controller")]
    NotRegistered(String),
}

/// Breadth-first crawler shared by all jobs
///
/// The engine itself is stateless; each call to [`CrawlEngine::run`] owns its
/// own frontier.
pub struct CrawlEngine {
    controller: Arc<JobController>,
    fetcher: Arc<dyn FetchClient>,
    links: Arc<dyn LinkExtractor>,
    documents: Arc<dyn DocumentExtractor>,
}

impl CrawlEngine {
    /// Creates an engine that extracts links and documents with [`HtmlExtractor`]
    pub fn new(controller: Arc<JobController>, fetcher: Arc<dyn FetchClient>) -> Self {
        let extractor = Arc::new(HtmlExtractor::new());
        Self {
            controller,
            fetcher,
            links: extractor.clone(),
            documents: extractor,
        }
    }

    pub fn with_extractors(
        mut self,
        links: Arc<dyn LinkExtractor>,
        documents: Arc<dyn DocumentExtractor>,
    ) -> Self {
        self.links = links;
        self.documents = documents;
        self
    }

    pub fn controller(&self) -> &Arc<JobController> {
        &self.controller
    }

    /// Runs one traversal to completion
    ///
    /// # Algorithm
    ///
    /// 1. Normalize and queue the seeds at depth 0; invalid seeds are failed
    /// 2. Register and start the job on the controller
    /// 3. While the controller says continue:
    ///    a. Stop on the page budget
    ///    b. Take the next task; drop it if deeper than `max_depth`
    ///    c. Park while paused; stop if the job was stopped meanwhile
    ///    d. Skip already-visited URLs
    ///    e. Fetch; a failed fetch or extraction only fails that URL
    ///    f. Queue admitted links at `depth + 1` while `depth < max_depth`
    ///    g. Hand the page to the sink, update stats, wait the politeness delay
    /// 4. Mark the job complete unless it was stopped
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The traversal ended, completed or stopped
    /// * `Err(EngineError)` - The job could not be started
    pub async fn run(
        &self,
        job_id: &str,
        seeds: &[String],
        settings: &CrawlSettings,
        sink: &dyn PageSink,
    ) -> Result<CrawlReport, EngineError> {
        let mut frontier = Frontier::new();
        let mut failed = Vec::new();

        for seed in seeds {
            match normalize_url(seed, None) {
                Ok(url) => {
                    if !frontier.seed(url) {
                        tracing::debug!(job_id, seed = %seed, "duplicate seed ignored");
                    }
                }
                Err(e) => {
                    tracing::warn!(job_id, seed = %seed, error = %e, "invalid seed URL");
                    frontier.mark_failed(seed);
                    failed.push(FailedUrl {
                        url: seed.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        self.controller.register(job_id);
        if !self.controller.start(job_id) {
            return match self.controller.get_status(job_id) {
                ControlStatus::Stopped | ControlStatus::Completed => {
                    tracing::info!(job_id, "job was stopped before it started");
                    Ok(CrawlReport {
                        job_id: job_id.to_string(),
                        outcome: self.controller.outcome(job_id).unwrap_or(JobOutcome::Stopped),
                        pages_crawled: 0,
                        bytes_downloaded: 0,
                        visited: Vec::new(),
                        failed,
                        discovered: frontier.discovered_count(),
                        budget_exhausted: false,
                    })
                }
                _ => Err(EngineError::NotRegistered(job_id.to_string())),
            };
        }

        tracing::info!(
            job_id,
            seeds = frontier.len(),
            max_depth = settings.max_depth,
            max_pages = settings.max_pages,
            "starting crawl"
        );

        let mut pages_crawled: u64 = 0;
        let mut bytes_downloaded: u64 = 0;
        let mut budget_exhausted = false;

        while self.controller.should_continue(job_id) {
            if pages_crawled >= u64::from(settings.max_pages) {
                tracing::info!(job_id, pages_crawled, "page budget reached");
                budget_exhausted = true;
                break;
            }

            let Some(task) = frontier.pop() else {
                tracing::info!(job_id, "frontier is empty");
                break;
            };

            if task.depth > settings.max_depth {
                tracing::debug!(job_id, url = %task.url, depth = task.depth, "beyond max depth, dropped");
                continue;
            }

            if !self.controller.wait_while_paused(job_id).await {
                tracing::info!(job_id, "stop observed at checkpoint");
                break;
            }

            if !frontier.mark_visited(&task.url) {
                continue;
            }

            tracing::debug!(job_id, url = %task.url, depth = task.depth, "fetching");
            let page = match self.fetcher.fetch(&task.url, &settings.fetch_options).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(job_id, url = %task.url, error = %e, "fetch failed");
                    frontier.mark_failed(task.url.as_str());
                    failed.push(FailedUrl {
                        url: task.url.to_string(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let document = match self.documents.extract_document(&page.body, &task.url) {
                Ok(document) => document,
                Err(e) => {
                    tracing::warn!(job_id, url = %task.url, error = %e, "extraction failed");
                    frontier.mark_failed(task.url.as_str());
                    failed.push(FailedUrl {
                        url: task.url.to_string(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            bytes_downloaded += page.bytes();
            let links = self.follow_links(job_id, &mut frontier, &task, &page.body, settings);
            pages_crawled += 1;

            let result = PageResult {
                url: task.url.to_string(),
                depth: task.depth,
                content: page.body,
                title: document.title,
                text: document.text,
                metadata: document.metadata,
                links,
            };
            if let Err(e) = sink.on_page(result) {
                tracing::warn!(job_id, url = %task.url, error = %e, "page sink failed");
            }

            self.controller.update_stats(
                job_id,
                StatsUpdate {
                    pages_crawled: Some(pages_crawled),
                    bytes_downloaded: Some(bytes_downloaded),
                },
            );

            if !settings.politeness_delay.is_zero() {
                tokio::time::sleep(settings.politeness_delay).await;
            }
        }

        let outcome = if self.controller.should_continue(job_id) {
            self.controller.complete(job_id);
            JobOutcome::Completed
        } else {
            self.controller.outcome(job_id).unwrap_or(JobOutcome::Stopped)
        };

        tracing::info!(
            job_id,
            ?outcome,
            pages_crawled,
            failed = failed.len(),
            "crawl finished"
        );

        Ok(CrawlReport {
            job_id: job_id.to_string(),
            outcome,
            pages_crawled,
            bytes_downloaded,
            visited: frontier.visited(),
            failed,
            discovered: frontier.discovered_count(),
            budget_exhausted,
        })
    }

    /// Normalizes and filters a page's links, queueing the new ones
    ///
    /// Returns every admitted link, queued or not.
    fn follow_links(
        &self,
        job_id: &str,
        frontier: &mut Frontier,
        task: &CrawlTask,
        body: &str,
        settings: &CrawlSettings,
    ) -> Vec<ExtractedLink> {
        let mut admitted = Vec::new();

        for link in self.links.extract(body, &task.url) {
            let url: Url = match normalize_url(&link.url, Some(&task.url)) {
                Ok(url) => url,
                Err(e) => {
                    tracing::trace!(job_id, href = %link.url, error = %e, "unusable link");
                    continue;
                }
            };

            if !settings.policy.admits(&task.url, &url) {
                tracing::trace!(job_id, url = %url, "link rejected by policy");
                continue;
            }

            if task.depth < settings.max_depth && frontier.enqueue(url.clone(), task.depth + 1) {
                tracing::trace!(job_id, url = %url, depth = task.depth + 1, "queued");
            }

            admitted.push(ExtractedLink {
                is_internal: same_authority(&task.url, &url),
                url: url.to_string(),
                anchor_text: link.anchor_text,
            });
        }

        admitted
    }
}
