//! Job scheduler - worker pool, executor registry, and crash recovery
//!
//! The scheduler turns pending run records into running work:
//! - `schedule` registers the job with the controller and spawns a task that
//!   waits for a worker permit, then runs the kind's executor
//! - `start_at_init` reschedules every pending run found in the run store
//! - operator controls (`pause_job`, `resume_job`, `stop_job`) signal the
//!   controller and write the run's status
//!
//! The run store is the system of record for status. The in-memory task table
//! only tracks live progress and is rebuilt from the store after a restart.

mod collect_job;
mod crawl_job;
mod executor;
mod search;

pub use collect_job::{CollectedItem, CollectionExecutor, ContentCollector};
pub use crawl_job::{CrawlExecutor, StorePageSink};
pub use executor::{ExecutionSummary, JobContext, JobError, JobExecutor};
pub use search::{NoSearchProvider, SearchHit, SeedProvider, StaticSeedProvider};

use crate::config::{parse_crawl_spec, validate_job};
use crate::state::{JobController, JobOutcome, JobStatus};
use crate::storage::{JobKind, JobRecord, NewRun, RunStore, StoreError};
use crate::ConfigError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;

/// Live state of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Waiting for a worker
    Scheduled,
    Running,
    Paused,
    Stopped,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Scheduled | Self::Running | Self::Paused)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl From<JobStatus> for TaskState {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Pending => Self::Scheduled,
            JobStatus::Running => Self::Running,
            JobStatus::Paused => Self::Paused,
            JobStatus::Completed => Self::Completed,
            JobStatus::Stopped => Self::Stopped,
            JobStatus::Failed => Self::Failed,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lightweight record of a scheduled task
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDescriptor {
    pub task_id: String,
    pub run_id: i64,
    pub kind: JobKind,
    pub query: String,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub state: TaskState,
}

struct TaskEntry {
    descriptor: TaskDescriptor,
    generation: u64,
    /// True until the spawned task has exited
    live: bool,
    handle: Option<JoinHandle<()>>,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler is shut down")]
    ShutDown,

    #[error("no executor registered for job kind {0}")]
    NoExecutor(JobKind),

    #[error("invalid job: {0}")]
    Config(#[from] ConfigError),

    #[error("run store error: {0}")]
    Store(#[from] StoreError),
}

/// Static job kind -> executor table, filled once at startup
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<JobKind, Arc<dyn JobExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an executor under its own kind, returning the one it replaced
    pub fn register(&mut self, executor: Arc<dyn JobExecutor>) -> Option<Arc<dyn JobExecutor>> {
        self.executors.insert(executor.kind(), executor)
    }

    pub fn with(mut self, executor: Arc<dyn JobExecutor>) -> Self {
        self.register(executor);
        self
    }

    pub fn get(&self, kind: JobKind) -> Option<Arc<dyn JobExecutor>> {
        self.executors.get(&kind).cloned()
    }

    /// Registered kinds in a stable order
    pub fn kinds(&self) -> Vec<JobKind> {
        let mut kinds: Vec<JobKind> = self.executors.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

/// Validates a new run and stores it as `pending` without scheduling it
pub fn create_job(store: &dyn RunStore, run: &NewRun) -> Result<i64, SchedulerError> {
    validate_job(run.kind, &run.query, run.max_depth, run.config.as_ref())?;
    let run_id = store.create_run(run)?;
    tracing::info!(run_id, kind = %run.kind, query = %run.query, "created pending job");
    Ok(run_id)
}

enum Begin {
    Run,
    /// A newer task owns the id
    Replaced,
    /// Stopped while waiting for a worker
    Cancelled,
}

struct Inner {
    controller: Arc<JobController>,
    store: Arc<dyn RunStore>,
    registry: ExecutorRegistry,
    pool: Arc<Semaphore>,
    tasks: Mutex<HashMap<String, TaskEntry>>,
    next_generation: AtomicU64,
    accepting: AtomicBool,
    idle: Notify,
}

impl Inner {
    fn tasks(&self) -> MutexGuard<'_, HashMap<String, TaskEntry>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, task_id: &str, generation: u64) -> Begin {
        let mut tasks = self.tasks();
        match tasks.get_mut(task_id) {
            Some(entry) if entry.generation == generation => {
                if entry.descriptor.state == TaskState::Scheduled {
                    entry.descriptor.state = TaskState::Running;
                    entry.descriptor.started_at = Some(Utc::now());
                    Begin::Run
                } else {
                    Begin::Cancelled
                }
            }
            _ => Begin::Replaced,
        }
    }

    /// Moves a task from `from` to `to`; any other state is left alone
    fn set_state_from(&self, task_id: &str, from: TaskState, to: TaskState) {
        if let Some(entry) = self.tasks().get_mut(task_id) {
            if entry.descriptor.state == from {
                entry.descriptor.state = to;
            }
        }
    }

    fn finish(&self, task_id: &str, generation: u64, state: TaskState) {
        if let Some(entry) = self.tasks().get_mut(task_id) {
            if entry.generation == generation {
                entry.descriptor.state = state;
                entry.live = false;
                entry.handle = None;
            }
        }
        self.idle.notify_waiters();
    }

    /// Drops a task that never got a worker, leaving its run untouched
    fn forget(&self, task_id: &str, generation: u64) {
        let removed = {
            let mut tasks = self.tasks();
            let owned = tasks
                .get(task_id)
                .map_or(false, |entry| entry.generation == generation);
            owned && tasks.remove(task_id).is_some()
        };
        if removed {
            self.controller.cleanup(task_id);
        }
        self.idle.notify_waiters();
    }

    fn active_count(&self) -> usize {
        self.tasks().values().filter(|entry| entry.live).count()
    }
}

/// Owns the worker pool and the lifecycle of every scheduled job
///
/// Cloning is cheap; clones share the same pool and task table.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

impl JobScheduler {
    /// Creates a scheduler with `max_workers` concurrent jobs
    pub fn new(
        max_workers: usize,
        controller: Arc<JobController>,
        store: Arc<dyn RunStore>,
        registry: ExecutorRegistry,
    ) -> Self {
        let workers = max_workers.max(1);
        tracing::debug!(workers, kinds = ?registry.kinds(), "creating job scheduler");
        Self {
            inner: Arc::new(Inner {
                controller,
                store,
                registry,
                pool: Arc::new(Semaphore::new(workers)),
                tasks: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                accepting: AtomicBool::new(true),
                idle: Notify::new(),
            }),
        }
    }

    pub fn controller(&self) -> &Arc<JobController> {
        &self.inner.controller
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.inner.store
    }

    /// Submits a run record for immediate execution
    ///
    /// Scheduling a task id whose previous task has not started yet replaces
    /// it. If the previous task is running or paused, its id is returned and
    /// nothing new is started.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The task id, `{prefix}_{run_id}`
    /// * `Err(SchedulerError)` - Shut down, or no executor for the kind
    pub fn schedule(&self, job: &JobRecord) -> Result<String, SchedulerError> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(SchedulerError::ShutDown);
        }
        let executor = self
            .inner
            .registry
            .get(job.kind)
            .ok_or(SchedulerError::NoExecutor(job.kind))?;
        let task_id = job.task_id();

        let mut tasks = self.inner.tasks();
        if let Some(existing) = tasks.get_mut(&task_id) {
            match existing.descriptor.state {
                TaskState::Running | TaskState::Paused => {
                    tracing::debug!(task_id = %task_id, "task already running, not rescheduled");
                    return Ok(task_id);
                }
                TaskState::Scheduled => {
                    if let Some(handle) = existing.handle.take() {
                        handle.abort();
                    }
                    tracing::info!(task_id = %task_id, "replacing scheduled task");
                }
                _ => {}
            }
        }

        self.inner.controller.register(&task_id);
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = tokio::spawn(run_task(
            Arc::clone(&self.inner),
            executor,
            task_id.clone(),
            job.id,
            generation,
        ));

        tasks.insert(
            task_id.clone(),
            TaskEntry {
                descriptor: TaskDescriptor {
                    task_id: task_id.clone(),
                    run_id: job.id,
                    kind: job.kind,
                    query: job.query.clone(),
                    scheduled_at: Utc::now(),
                    started_at: None,
                    state: TaskState::Scheduled,
                },
                generation,
                live: true,
                handle: Some(handle),
            },
        );

        tracing::info!(task_id = %task_id, run_id = job.id, kind = %job.kind, "job scheduled");
        Ok(task_id)
    }

    /// Schedules every pending run in the store
    ///
    /// Each registered executor finds its own pending runs, so runs of kinds
    /// without an executor stay pending.
    pub fn start_at_init(&self) -> Result<Vec<String>, SchedulerError> {
        let mut scheduled = Vec::new();

        for kind in self.inner.registry.kinds() {
            let Some(executor) = self.inner.registry.get(kind) else {
                continue;
            };
            for job in executor.find_pending(self.inner.store.as_ref())? {
                scheduled.push(self.schedule(&job)?);
            }
        }

        tracing::info!(count = scheduled.len(), "recovered pending jobs");
        Ok(scheduled)
    }

    /// Validates, stores, and schedules a new run
    pub fn submit(&self, run: NewRun) -> Result<(i64, String), SchedulerError> {
        if self.inner.registry.get(run.kind).is_none() {
            return Err(SchedulerError::NoExecutor(run.kind));
        }
        let run_id = create_job(self.inner.store.as_ref(), &run)?;
        let job = self.inner.store.get_run(run_id)?;
        let task_id = self.schedule(&job)?;
        Ok((run_id, task_id))
    }

    /// Submits a configured crawl described in TOML
    pub fn submit_crawl_toml(&self, content: &str) -> Result<(i64, String), SchedulerError> {
        let spec = parse_crawl_spec(content)?;
        let run = NewRun::configured_crawl(&spec).map_err(ConfigError::from)?;
        self.submit(run)
    }

    fn run_id_of(&self, task_id: &str) -> Option<(i64, TaskState)> {
        self.inner
            .tasks()
            .get(task_id)
            .map(|entry| (entry.descriptor.run_id, entry.descriptor.state))
    }

    /// Parks a running job at its next checkpoint
    ///
    /// Returns `Ok(false)` if the task is unknown or not running.
    pub fn pause_job(&self, task_id: &str) -> Result<bool, SchedulerError> {
        let Some((run_id, _)) = self.run_id_of(task_id) else {
            return Ok(false);
        };
        if !self.inner.controller.pause(task_id) {
            return Ok(false);
        }

        match self.inner.store.transition(run_id, JobStatus::Paused) {
            Ok(_) => {}
            Err(StoreError::InvalidTransition { from, .. }) => {
                tracing::debug!(task_id, %from, "run already finished, pause ignored");
                self.inner.controller.resume(task_id);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        self.inner
            .set_state_from(task_id, TaskState::Running, TaskState::Paused);
        Ok(true)
    }

    /// Releases a paused job
    pub fn resume_job(&self, task_id: &str) -> Result<bool, SchedulerError> {
        let Some((run_id, _)) = self.run_id_of(task_id) else {
            return Ok(false);
        };
        if !self.inner.controller.resume(task_id) {
            return Ok(false);
        }

        match self.inner.store.transition(run_id, JobStatus::Running) {
            Ok(_) => {}
            Err(StoreError::InvalidTransition { from, .. }) => {
                tracing::debug!(task_id, %from, "run already finished, resume ignored");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        self.inner
            .set_state_from(task_id, TaskState::Paused, TaskState::Running);
        Ok(true)
    }

    /// Stops a job; a job still waiting for a worker never starts
    pub fn stop_job(&self, task_id: &str) -> Result<bool, SchedulerError> {
        let Some((run_id, state)) = self.run_id_of(task_id) else {
            return Ok(false);
        };
        if !state.is_active() {
            return Ok(false);
        }

        self.inner.controller.stop(task_id);
        match self.inner.store.transition(run_id, JobStatus::Stopped) {
            Ok(_) => {}
            Err(StoreError::InvalidTransition { from, .. }) => {
                tracing::debug!(task_id, %from, "run already finished, stop ignored");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        self.inner
            .set_state_from(task_id, TaskState::Scheduled, TaskState::Stopped);
        Ok(true)
    }

    pub fn pause_run(&self, run_id: i64) -> Result<bool, SchedulerError> {
        let job = self.inner.store.get_run(run_id)?;
        self.pause_job(&job.task_id())
    }

    pub fn resume_run(&self, run_id: i64) -> Result<bool, SchedulerError> {
        let job = self.inner.store.get_run(run_id)?;
        self.resume_job(&job.task_id())
    }

    pub fn stop_run(&self, run_id: i64) -> Result<bool, SchedulerError> {
        let job = self.inner.store.get_run(run_id)?;
        self.stop_job(&job.task_id())
    }

    pub fn task_state(&self, task_id: &str) -> Option<TaskState> {
        self.run_id_of(task_id).map(|(_, state)| state)
    }

    /// Snapshot of the task table, ordered by run id
    pub fn tasks(&self) -> Vec<TaskDescriptor> {
        let mut tasks: Vec<TaskDescriptor> = self
            .inner
            .tasks()
            .values()
            .map(|entry| entry.descriptor.clone())
            .collect();
        tasks.sort_by_key(|task| task.run_id);
        tasks
    }

    /// Number of spawned tasks that have not exited yet
    pub fn active_count(&self) -> usize {
        self.inner.active_count()
    }

    /// Authoritative status of a run, read from the run store
    pub fn run_status(&self, run_id: i64) -> Result<JobStatus, SchedulerError> {
        Ok(self.inner.store.get_run(run_id)?.status)
    }

    /// Resolves once no task is live
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.active_count() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stops accepting work and closes the worker pool
    ///
    /// Jobs still waiting for a worker exit without touching the store, so
    /// their runs stay `pending` for the next `start_at_init`. Running jobs
    /// are not interrupted and may still be in flight when this returns.
    pub fn shutdown(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        self.inner.pool.close();
        tracing::info!(active = self.active_count(), "scheduler shutting down");
    }

    /// Shuts down, then waits up to `grace` for in-flight jobs
    ///
    /// Returns the number of jobs still running when the grace period ended.
    pub async fn shutdown_timeout(&self, grace: Duration) -> usize {
        self.shutdown();
        if tokio::time::timeout(grace, self.wait_idle()).await.is_err() {
            let remaining = self.active_count();
            tracing::warn!(remaining, "jobs still running after shutdown grace period");
            return remaining;
        }
        0
    }
}

/// Body of one scheduled task
async fn run_task(
    inner: Arc<Inner>,
    executor: Arc<dyn JobExecutor>,
    task_id: String,
    run_id: i64,
    generation: u64,
) {
    let permit = match Arc::clone(&inner.pool).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            tracing::debug!(task_id = %task_id, "worker pool closed, run left pending");
            inner.forget(&task_id, generation);
            return;
        }
    };

    match inner.begin(&task_id, generation) {
        Begin::Run => {}
        Begin::Replaced => return,
        Begin::Cancelled => {
            tracing::info!(task_id = %task_id, "job stopped before it started");
            inner.controller.cleanup(&task_id);
            inner.finish(&task_id, generation, TaskState::Stopped);
            return;
        }
    }

    let state = execute_job(&inner, executor, &task_id, run_id).await;

    inner.controller.cleanup(&task_id);
    inner.finish(&task_id, generation, state);
    drop(permit);
}

/// Runs the executor and writes the run's terminal status
async fn execute_job(
    inner: &Arc<Inner>,
    executor: Arc<dyn JobExecutor>,
    task_id: &str,
    run_id: i64,
) -> TaskState {
    let job = match inner.store.get_run(run_id) {
        Ok(job) => job,
        Err(StoreError::RunNotFound(_)) => {
            let error = JobError::MissingRecord(run_id);
            tracing::error!(task_id, error = %error, "job aborted");
            return TaskState::Failed;
        }
        Err(e) => {
            tracing::error!(task_id, error = %e, "could not load job record");
            return TaskState::Failed;
        }
    };

    if job.status.is_terminal() {
        tracing::info!(task_id, status = %job.status, "run already finished, skipping");
        return TaskState::from(job.status);
    }

    if let Err(e) = inner.store.transition(run_id, JobStatus::Running) {
        tracing::error!(task_id, error = %e, "could not mark run running");
        return match e {
            StoreError::InvalidTransition { from, .. } => TaskState::from(from),
            _ => fail_run(inner, task_id, run_id, &e.to_string()),
        };
    }

    let ctx = JobContext {
        task_id: task_id.to_string(),
        controller: Arc::clone(&inner.controller),
        store: Arc::clone(&inner.store),
    };

    tracing::info!(task_id, run_id, kind = %job.kind, query = %job.query, "job started");
    let result = match tokio::spawn(async move { executor.execute(&ctx, &job).await }).await {
        Ok(result) => result,
        Err(e) => Err(JobError::Panicked(e.to_string())),
    };

    match result {
        Ok(summary) => {
            let status = match summary.outcome {
                JobOutcome::Completed => JobStatus::Completed,
                JobOutcome::Stopped => JobStatus::Stopped,
            };
            tracing::info!(
                task_id,
                status = %status,
                pages_crawled = summary.pages_crawled,
                failed_urls = summary.failed_urls.len(),
                "job finished"
            );

            match inner.store.transition(run_id, status) {
                Ok(record) => TaskState::from(record.status),
                Err(StoreError::InvalidTransition { from, .. }) => {
                    tracing::debug!(task_id, %from, to = %status, "run status already final");
                    TaskState::from(from)
                }
                Err(e) => {
                    tracing::error!(task_id, error = %e, "could not record job outcome");
                    TaskState::Failed
                }
            }
        }
        Err(e) => {
            tracing::error!(task_id, error = %e, "job failed");
            fail_run(inner, task_id, run_id, &e.to_string())
        }
    }
}

fn fail_run(inner: &Inner, task_id: &str, run_id: i64, message: &str) -> TaskState {
    match inner.store.fail_run(run_id, message) {
        Ok(record) => TaskState::from(record.status),
        Err(StoreError::InvalidTransition { from, .. }) => TaskState::from(from),
        Err(e) => {
            tracing::error!(task_id, error = %e, "could not mark run failed");
            TaskState::Failed
        }
    }
}
