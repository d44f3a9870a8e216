//! Per-job cooperative cancellation controller
//!
//! The controller is the only channel through which a running job learns that it
//! has been paused, resumed, or stopped. Jobs poll [`JobController::should_continue`]
//! and park in [`JobController::wait_while_paused`] at their checkpoints; callers on
//! other tasks flip the flags. Every operation on an unknown id is a no-op that
//! returns `false`.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Flags observed by a job at each checkpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFlags {
    pub running: bool,
    pub paused: bool,
}

/// Terminal signal recorded for a job; the first one wins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Stopped,
}

/// Snapshot of a job's control state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlStatus {
    /// Registered but not yet started
    Idle,
    Running,
    Paused,
    Stopped,
    Completed,
    /// Id is not registered
    Unknown,
}

impl ControlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ControlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress counters for one job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStats {
    pub pages_crawled: u64,
    pub bytes_downloaded: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Partial stats update; `None` fields are left untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsUpdate {
    pub pages_crawled: Option<u64>,
    pub bytes_downloaded: Option<u64>,
}

#[derive(Debug)]
struct ControllerEntry {
    flags: watch::Sender<RunFlags>,
    outcome: Option<JobOutcome>,
    last_activity: DateTime<Utc>,
    stats: JobStats,
}

impl ControllerEntry {
    fn new() -> Self {
        let (flags, _) = watch::channel(RunFlags::default());
        Self {
            flags,
            outcome: None,
            last_activity: Utc::now(),
            stats: JobStats::default(),
        }
    }

    fn flags(&self) -> RunFlags {
        *self.flags.borrow()
    }

    fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Clears both flags and records the outcome if none was recorded yet
    fn finish(&mut self, outcome: JobOutcome) {
        self.flags.send_modify(|flags| {
            flags.running = false;
            flags.paused = false;
        });
        if self.outcome.is_none() {
            self.outcome = Some(outcome);
            self.stats.end_time = Some(Utc::now());
        }
        self.touch();
    }

    fn status(&self) -> ControlStatus {
        match self.outcome {
            Some(JobOutcome::Stopped) => ControlStatus::Stopped,
            Some(JobOutcome::Completed) => ControlStatus::Completed,
            None => {
                let flags = self.flags();
                if flags.paused {
                    ControlStatus::Paused
                } else if flags.running {
                    ControlStatus::Running
                } else {
                    ControlStatus::Idle
                }
            }
        }
    }
}

/// Process-wide registry of job control state, keyed by task id
#[derive(Debug, Default)]
pub struct JobController {
    jobs: Mutex<HashMap<String, ControllerEntry>>,
}

impl JobController {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, ControllerEntry>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates the entry for a job if it does not exist yet
    ///
    /// Returns true if a new entry was created. Registering an existing id keeps
    /// its current state.
    pub fn register(&self, job_id: &str) -> bool {
        let mut jobs = self.entries();
        if jobs.contains_key(job_id) {
            return false;
        }
        jobs.insert(job_id.to_string(), ControllerEntry::new());
        tracing::debug!(job_id, "registered job");
        true
    }

    /// Marks a job as running
    ///
    /// Fails for unknown ids and for jobs that already reached a terminal outcome.
    pub fn start(&self, job_id: &str) -> bool {
        let mut jobs = self.entries();
        let Some(entry) = jobs.get_mut(job_id) else {
            tracing::warn!(job_id, "cannot start unregistered job");
            return false;
        };
        if entry.outcome.is_some() {
            tracing::debug!(job_id, status = %entry.status(), "job already finished, not starting");
            return false;
        }
        entry.flags.send_modify(|flags| {
            flags.running = true;
            flags.paused = false;
        });
        if entry.stats.start_time.is_none() {
            entry.stats.start_time = Some(Utc::now());
        }
        entry.touch();
        tracing::info!(job_id, "job started");
        true
    }

    /// Parks a running job at its next checkpoint
    pub fn pause(&self, job_id: &str) -> bool {
        let mut jobs = self.entries();
        let Some(entry) = jobs.get_mut(job_id) else {
            tracing::warn!(job_id, "cannot pause unregistered job");
            return false;
        };
        if !entry.flags().running {
            return false;
        }
        entry.flags.send_modify(|flags| flags.paused = true);
        entry.touch();
        tracing::info!(job_id, "job paused");
        true
    }

    /// Releases a paused job
    pub fn resume(&self, job_id: &str) -> bool {
        let mut jobs = self.entries();
        let Some(entry) = jobs.get_mut(job_id) else {
            tracing::warn!(job_id, "cannot resume unregistered job");
            return false;
        };
        if !entry.flags().paused {
            return false;
        }
        entry.flags.send_modify(|flags| flags.paused = false);
        entry.touch();
        tracing::info!(job_id, "job resumed");
        true
    }

    /// Requests that a job stop at its next checkpoint
    ///
    /// A paused job is woken so it can observe the request.
    pub fn stop(&self, job_id: &str) -> bool {
        let mut jobs = self.entries();
        let Some(entry) = jobs.get_mut(job_id) else {
            tracing::warn!(job_id, "cannot stop unregistered job");
            return false;
        };
        entry.finish(JobOutcome::Stopped);
        tracing::info!(job_id, "job stop requested");
        true
    }

    /// Records a natural completion
    ///
    /// If the job was stopped first, its outcome stays `Stopped`.
    pub fn complete(&self, job_id: &str) -> bool {
        let mut jobs = self.entries();
        let Some(entry) = jobs.get_mut(job_id) else {
            tracing::warn!(job_id, "cannot complete unregistered job");
            return false;
        };
        entry.finish(JobOutcome::Completed);
        tracing::info!(job_id, outcome = ?entry.outcome, "job finished");
        true
    }

    /// Returns true while the job is running (paused or not)
    pub fn should_continue(&self, job_id: &str) -> bool {
        self.entries()
            .get(job_id)
            .map(|entry| entry.flags().running)
            .unwrap_or(false)
    }

    pub fn is_paused(&self, job_id: &str) -> bool {
        self.entries()
            .get(job_id)
            .map(|entry| entry.flags().paused)
            .unwrap_or(false)
    }

    /// Suspends the caller while the job is paused
    ///
    /// Returns true if the job may proceed, false if it was stopped, finished, or
    /// removed while waiting. Returns immediately when the job is not paused.
    pub async fn wait_while_paused(&self, job_id: &str) -> bool {
        let subscription = self
            .entries()
            .get(job_id)
            .map(|entry| entry.flags.subscribe());
        let Some(mut flags) = subscription else {
            return false;
        };

        if flags.borrow().paused {
            tracing::debug!(job_id, "job parked at checkpoint");
        }

        flags
            .wait_for(|f| !f.paused || !f.running)
            .await
            .map(|f| f.running)
            .unwrap_or(false)
    }

    /// Merges counters into the job's stats and refreshes its activity timestamp
    pub fn update_stats(&self, job_id: &str, update: StatsUpdate) -> bool {
        let mut jobs = self.entries();
        let Some(entry) = jobs.get_mut(job_id) else {
            return false;
        };
        if let Some(pages) = update.pages_crawled {
            entry.stats.pages_crawled = pages;
        }
        if let Some(bytes) = update.bytes_downloaded {
            entry.stats.bytes_downloaded = bytes;
        }
        entry.touch();
        true
    }

    pub fn get_status(&self, job_id: &str) -> ControlStatus {
        self.entries()
            .get(job_id)
            .map(ControllerEntry::status)
            .unwrap_or(ControlStatus::Unknown)
    }

    /// Terminal signal recorded for the job, if any
    pub fn outcome(&self, job_id: &str) -> Option<JobOutcome> {
        self.entries().get(job_id).and_then(|entry| entry.outcome)
    }

    pub fn get_stats(&self, job_id: &str) -> Option<JobStats> {
        self.entries().get(job_id).map(|entry| entry.stats.clone())
    }

    pub fn last_activity(&self, job_id: &str) -> Option<DateTime<Utc>> {
        self.entries().get(job_id).map(|entry| entry.last_activity)
    }

    /// Removes the job's entry
    ///
    /// Any task parked in `wait_while_paused` for this job is released with `false`.
    pub fn cleanup(&self, job_id: &str) -> bool {
        let removed = self.entries().remove(job_id).is_some();
        if removed {
            tracing::debug!(job_id, "cleaned up job control state");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_register_is_idempotent() {
        let controller = JobController::new();
        assert!(controller.register("crawl_1"));
        assert!(controller.start("crawl_1"));
        assert!(!controller.register("crawl_1"));
        assert_eq!(controller.get_status("crawl_1"), ControlStatus::Running);
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let controller = JobController::new();
        assert!(!controller.start("nope"));
        assert!(!controller.pause("nope"));
        assert!(!controller.resume("nope"));
        assert!(!controller.stop("nope"));
        assert!(!controller.complete("nope"));
        assert!(!controller.should_continue("nope"));
        assert!(!controller.cleanup("nope"));
        assert_eq!(controller.get_status("nope"), ControlStatus::Unknown);
        assert!(controller.get_stats("nope").is_none());
    }

    #[test]
    fn test_pause_resume_stop_sequence() {
        let controller = JobController::new();
        controller.register("scrape_7");
        assert_eq!(controller.get_status("scrape_7"), ControlStatus::Idle);

        controller.start("scrape_7");
        assert!(controller.pause("scrape_7"));
        assert!(controller.is_paused("scrape_7"));
        assert!(controller.should_continue("scrape_7"));
        assert_eq!(controller.get_status("scrape_7"), ControlStatus::Paused);

        assert!(controller.resume("scrape_7"));
        assert_eq!(controller.get_status("scrape_7"), ControlStatus::Running);

        assert!(controller.stop("scrape_7"));
        assert!(!controller.should_continue("scrape_7"));
        assert_eq!(controller.get_status("scrape_7"), ControlStatus::Stopped);
    }

    #[test]
    fn test_pause_requires_running() {
        let controller = JobController::new();
        controller.register("crawl_2");
        assert!(!controller.pause("crawl_2"));
        assert!(!controller.resume("crawl_2"));
    }

    #[test]
    fn test_stop_is_terminal() {
        let controller = JobController::new();
        controller.register("crawl_3");
        controller.start("crawl_3");
        controller.stop("crawl_3");

        assert!(!controller.start("crawl_3"));
        assert!(controller.complete("crawl_3"));
        assert_eq!(controller.get_status("crawl_3"), ControlStatus::Stopped);
        assert_eq!(controller.outcome("crawl_3"), Some(JobOutcome::Stopped));
    }

    #[test]
    fn test_stats_update_and_end_time() {
        let controller = JobController::new();
        controller.register("crawl_4");
        controller.start("crawl_4");
        controller.update_stats(
            "crawl_4",
            StatsUpdate {
                pages_crawled: Some(3),
                bytes_downloaded: Some(2048),
            },
        );
        controller.update_stats(
            "crawl_4",
            StatsUpdate {
                pages_crawled: Some(4),
                bytes_downloaded: None,
            },
        );

        let stats = controller.get_stats("crawl_4").unwrap();
        assert_eq!(stats.pages_crawled, 4);
        assert_eq!(stats.bytes_downloaded, 2048);
        assert!(stats.start_time.is_some());
        assert!(stats.end_time.is_none());

        controller.complete("crawl_4");
        let stats = controller.get_stats("crawl_4").unwrap();
        assert!(stats.end_time.is_some());
        assert!(stats.end_time >= stats.start_time);
    }

    #[test]
    fn test_update_stats_refreshes_last_activity() {
        let controller = JobController::new();
        controller.register("crawl_8");
        controller.start("crawl_8");
        let before = controller.last_activity("crawl_8").unwrap();

        std::thread::sleep(Duration::from_millis(5));
        assert!(controller.update_stats(
            "crawl_8",
            StatsUpdate {
                pages_crawled: Some(1),
                bytes_downloaded: None,
            },
        ));

        assert!(controller.last_activity("crawl_8").unwrap() > before);
        assert!(controller.last_activity("missing").is_none());
    }

    #[test]
    fn test_full_lifecycle_then_cleanup() {
        let controller = JobController::new();
        assert!(controller.register("crawl_9"));
        assert!(controller.start("crawl_9"));
        assert!(controller.pause("crawl_9"));
        assert!(controller.resume("crawl_9"));
        assert!(controller.complete("crawl_9"));
        assert_eq!(controller.get_status("crawl_9"), ControlStatus::Completed);

        assert!(controller.cleanup("crawl_9"));
        assert_eq!(controller.get_status("crawl_9"), ControlStatus::Unknown);
        assert!(controller.is_empty());
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_when_not_paused() {
        let controller = JobController::new();
        controller.register("crawl_5");
        controller.start("crawl_5");
        assert!(controller.wait_while_paused("crawl_5").await);
        assert!(!controller.wait_while_paused("missing").await);
    }

    #[tokio::test]
    async fn test_stop_wakes_paused_waiter() {
        let controller = Arc::new(JobController::new());
        controller.register("crawl_6");
        controller.start("crawl_6");
        controller.pause("crawl_6");

        let waiter = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.wait_while_paused("crawl_6").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        controller.stop("crawl_6");
        let proceed = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake on stop")
            .unwrap();
        assert!(!proceed);
    }

    #[tokio::test]
    async fn test_resume_wakes_paused_waiter() {
        let controller = Arc::new(JobController::new());
        controller.register("crawl_8");
        controller.start("crawl_8");
        controller.pause("crawl_8");

        let waiter = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.wait_while_paused("crawl_8").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        controller.resume("crawl_8");
        let proceed = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake on resume")
            .unwrap();
        assert!(proceed);
    }

    #[tokio::test]
    async fn test_cleanup_releases_waiter() {
        let controller = Arc::new(JobController::new());
        controller.register("crawl_9");
        controller.start("crawl_9");
        controller.pause("crawl_9");

        let waiter = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.wait_while_paused("crawl_9").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(controller.cleanup("crawl_9"));
        let proceed = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake on cleanup")
            .unwrap();
        assert!(!proceed);
        assert_eq!(controller.get_status("crawl_9"), ControlStatus::Unknown);
    }
}
