//! Job executor capability
//!
//! Each job kind registers one `JobExecutor` with the scheduler at startup.
//! The scheduler owns the record's status around `execute`; executors only do
//! the kind-specific work and report how it ended.

use crate::crawler::{EngineError, FailedUrl};
use crate::state::{JobController, JobOutcome, JobStatus};
use crate::storage::{JobKind, JobRecord, RunStore, StoreError};
use crate::ConfigError;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Everything an executor needs besides the record itself
#[derive(Clone)]
pub struct JobContext {
    /// Controller key for this job
    pub task_id: String,
    pub controller: Arc<JobController>,
    pub store: Arc<dyn RunStore>,
}

/// How an execution ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub outcome: JobOutcome,
    pub pages_crawled: u64,
    pub failed_urls: Vec<FailedUrl>,
}

/// Job-fatal errors; the scheduler marks the run `failed`
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job record {0} no longer exists")]
    MissingRecord(i64),

    #[error("invalid job payload: {0}")]
    Config(#[from] ConfigError),

    #[error("run store error: {0}")]
    Store(#[from] StoreError),

    #[error("crawl engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("seed search failed: {0}")]
    Search(String),

    #[error("content collection failed: {0}")]
    Collector(String),

    #[error("executor panicked: {0}")]
    Panicked(String),
}

/// Kind-specific job logic
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// The job kind this executor handles
    fn kind(&self) -> JobKind;

    /// Runs one job to a terminal outcome
    async fn execute(&self, ctx: &JobContext, job: &JobRecord)
        -> Result<ExecutionSummary, JobError>;

    /// Pending runs this executor should pick up at startup
    fn find_pending(&self, store: &dyn RunStore) -> Result<Vec<JobRecord>, StoreError> {
        let kind = self.kind();
        Ok(store
            .list_runs_by_status(JobStatus::Pending)?
            .into_iter()
            .filter(|run| run.kind == kind)
            .collect())
    }
}
