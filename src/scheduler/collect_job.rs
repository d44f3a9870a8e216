//! Content collection executor
//!
//! A collection job asks a `ContentCollector` plug-in for items from each of
//! its configured sources in turn. The controller checkpoint sits between
//! sources, so a collection can be paused or stopped like a crawl.

use crate::config::{validate_collection_spec, CollectionSpec};
use crate::crawler::FailedUrl;
use crate::scheduler::executor::{ExecutionSummary, JobContext, JobError, JobExecutor};
use crate::state::{JobOutcome, StatsUpdate};
use crate::storage::{JobKind, JobRecord, NewPage};
use crate::ConfigError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// One item returned by a collector
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollectedItem {
    pub url: String,
    pub title: Option<String>,
    pub content: String,
    pub metadata: Map<String, Value>,
}

/// Collects items of one source type for a query
#[async_trait]
pub trait ContentCollector: Send + Sync {
    async fn collect(&self, source: &str, spec: &CollectionSpec)
        -> anyhow::Result<Vec<CollectedItem>>;
}

/// Executor for `content_collection` jobs
pub struct CollectionExecutor {
    collector: Arc<dyn ContentCollector>,
}

impl CollectionExecutor {
    pub fn new(collector: Arc<dyn ContentCollector>) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl JobExecutor for CollectionExecutor {
    fn kind(&self) -> JobKind {
        JobKind::ContentCollection
    }

    async fn execute(
        &self,
        ctx: &JobContext,
        job: &JobRecord,
    ) -> Result<ExecutionSummary, JobError> {
        let payload = job.config.as_ref().ok_or_else(|| {
            ConfigError::Validation("collection job has no collection spec".to_string())
        })?;
        let spec: CollectionSpec =
            serde_json::from_value(payload.clone()).map_err(ConfigError::from)?;
        validate_collection_spec(&spec)?;

        let task_id = ctx.task_id.as_str();
        ctx.controller.register(task_id);
        if !ctx.controller.start(task_id) {
            tracing::info!(task_id, "collection was stopped before it started");
            return Ok(ExecutionSummary {
                outcome: ctx.controller.outcome(task_id).unwrap_or(JobOutcome::Stopped),
                pages_crawled: 0,
                failed_urls: Vec::new(),
            });
        }

        let limit = usize::try_from(spec.max_items_per_source).unwrap_or(usize::MAX);
        let mut collected: u64 = 0;
        let mut failed = Vec::new();

        for source in &spec.sources {
            if !ctx.controller.wait_while_paused(task_id).await {
                tracing::info!(task_id, "stop observed between sources");
                break;
            }

            let items = match self.collector.collect(source, &spec).await {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(task_id, source = %source, error = %e, "source failed");
                    failed.push(FailedUrl {
                        url: format!("source:{}", source),
                        error: format!("{:#}", e),
                    });
                    continue;
                }
            };

            for item in items.into_iter().take(limit) {
                let mut metadata = item.metadata;
                metadata.insert("source_type".to_string(), Value::from(source.as_str()));

                ctx.store.insert_page(
                    job.id,
                    &NewPage {
                        url: item.url,
                        title: item.title,
                        crawl_depth: 0,
                        content_text: item.content,
                        content_html: None,
                        metadata,
                        links: Vec::new(),
                    },
                )?;
                collected += 1;
            }

            ctx.store.set_pages_crawled(job.id, ctx.store.count_pages(job.id)?)?;
            ctx.controller.update_stats(
                task_id,
                StatsUpdate {
                    pages_crawled: Some(collected),
                    bytes_downloaded: None,
                },
            );
            tracing::debug!(task_id, source = %source, collected, "source collected");
        }

        let outcome = if ctx.controller.should_continue(task_id) {
            ctx.controller.complete(task_id);
            JobOutcome::Completed
        } else {
            ctx.controller.outcome(task_id).unwrap_or(JobOutcome::Stopped)
        };
        ctx.store.set_pages_total(job.id, collected)?;

        tracing::info!(task_id, ?outcome, collected, failed = failed.len(), "collection finished");

        Ok(ExecutionSummary {
            outcome,
            pages_crawled: collected,
            failed_urls: failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::JobController;
    use crate::storage::{NewRun, RunStore, SqliteRunStore};
    use std::sync::Mutex;

    /// Returns three items per source, failing for "video"
    #[derive(Default)]
    struct FakeCollector {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContentCollector for FakeCollector {
        async fn collect(
            &self,
            source: &str,
            spec: &CollectionSpec,
        ) -> anyhow::Result<Vec<CollectedItem>> {
            self.calls.lock().unwrap().push(source.to_string());
            if source == "video" {
                anyhow::bail!("video backend offline");
            }
            Ok((0..3)
                .map(|i| CollectedItem {
                    url: format!("https://{}.example.com/{}", source, i),
                    title: Some(format!("{} {}", spec.content_query, i)),
                    content: "body".to_string(),
                    metadata: Map::new(),
                })
                .collect())
        }
    }

    fn setup(spec: &CollectionSpec) -> (JobContext, JobRecord) {
        let store: Arc<dyn RunStore> = Arc::new(SqliteRunStore::open_in_memory().unwrap());
        let run_id = store
            .create_run(&NewRun::content_collection(spec).unwrap())
            .unwrap();
        let job = store.get_run(run_id).unwrap();
        let ctx = JobContext {
            task_id: job.task_id(),
            controller: Arc::new(JobController::new()),
            store,
        };
        (ctx, job)
    }

    #[tokio::test]
    async fn test_collects_each_source_up_to_limit() {
        let mut spec = CollectionSpec::new("solar panels");
        spec.sources = vec!["web".to_string(), "video".to_string(), "pdf".to_string()];
        spec.max_items_per_source = 2;
        let (ctx, job) = setup(&spec);
        let collector = Arc::new(FakeCollector::default());

        let summary = CollectionExecutor::new(collector.clone())
            .execute(&ctx, &job)
            .await
            .unwrap();

        assert_eq!(summary.outcome, JobOutcome::Completed);
        assert_eq!(summary.pages_crawled, 4);
        assert_eq!(summary.failed_urls.len(), 1);
        assert_eq!(summary.failed_urls[0].url, "source:video");
        assert_eq!(*collector.calls.lock().unwrap(), vec!["web", "video", "pdf"]);

        let pages = ctx.store.list_pages(job.id).unwrap();
        assert_eq!(pages.len(), 4);
        assert_eq!(pages[0].metadata["source_type"], "web");
        assert_eq!(pages[3].metadata["source_type"], "pdf");
        assert_eq!(ctx.store.get_run(job.id).unwrap().pages_crawled, 4);
    }

    #[tokio::test]
    async fn test_stopped_before_start() {
        let spec = CollectionSpec::new("q");
        let (ctx, job) = setup(&spec);
        ctx.controller.register(&ctx.task_id);
        ctx.controller.stop(&ctx.task_id);
        let collector = Arc::new(FakeCollector::default());

        let summary = CollectionExecutor::new(collector.clone())
            .execute(&ctx, &job)
            .await
            .unwrap();

        assert_eq!(summary.outcome, JobOutcome::Stopped);
        assert!(collector.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_spec_is_config_error() {
        let spec = CollectionSpec::new("q");
        let (ctx, mut job) = setup(&spec);
        job.config = None;

        let result = CollectionExecutor::new(Arc::new(FakeCollector::default()))
            .execute(&ctx, &job)
            .await;
        assert!(matches!(result, Err(JobError::Config(_))));
    }
}
