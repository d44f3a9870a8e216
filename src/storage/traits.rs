//! Storage traits and error types
//!
//! This module defines the trait interface for run store backends and
//! associated error types.

use crate::state::JobStatus;
use crate::storage::{JobRecord, LinkRecord, NewPage, NewRun, PageRecord};
use thiserror::Error;

/// Errors that can occur during run store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Invalid status transition for run {run_id}: {from} -> {to}")]
    InvalidTransition {
        run_id: i64,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for run store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for run store implementations
///
/// The store is the system of record for job status. Implementations must be
/// safe to share between job tasks.
pub trait RunStore: Send + Sync {
    // ===== Run Management =====

    /// Creates a `pending` run and returns its ID
    fn create_run(&self, run: &NewRun) -> StoreResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StoreResult<JobRecord>;

    /// Gets all runs, oldest first
    fn list_runs(&self) -> StoreResult<Vec<JobRecord>>;

    /// Gets all runs in a status, oldest first
    fn list_runs_by_status(&self, status: JobStatus) -> StoreResult<Vec<JobRecord>>;

    /// Moves a run to a new status
    ///
    /// Rejects moves the status lifecycle does not allow with
    /// `StoreError::InvalidTransition`. Writing the current status is a no-op.
    /// Entering a terminal status sets `completed_at`.
    fn transition(&self, run_id: i64, to: JobStatus) -> StoreResult<JobRecord>;

    /// Moves a run to `failed` and records why
    fn fail_run(&self, run_id: i64, error_message: &str) -> StoreResult<JobRecord>;

    fn set_pages_crawled(&self, run_id: i64, pages: u64) -> StoreResult<()>;

    fn set_pages_total(&self, run_id: i64, pages: u64) -> StoreResult<()>;

    /// Deletes a run along with its pages and links
    fn delete_run(&self, run_id: i64) -> StoreResult<()>;

    // ===== Page Management =====

    /// Stores a page and its outgoing links, returning the page ID
    fn insert_page(&self, run_id: i64, page: &NewPage) -> StoreResult<i64>;

    fn count_pages(&self, run_id: i64) -> StoreResult<u64>;

    /// Gets a run's pages in insertion order
    fn list_pages(&self, run_id: i64) -> StoreResult<Vec<PageRecord>>;

    // ===== Link Management =====

    /// Gets all outgoing links from a page
    fn list_links(&self, page_id: i64) -> StoreResult<Vec<LinkRecord>>;

    /// Counts the links stored under a run
    fn count_links(&self, run_id: i64) -> StoreResult<u64>;
}
