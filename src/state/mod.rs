//! State module for job lifecycle tracking
//!
//! # Components
//!
//! - `JobStatus`: Persisted lifecycle status of a job record
//! - `JobController`: In-memory pause/resume/stop flags and progress counters per job

mod controller;
mod job_status;

// Re-export main types
pub use controller::{ControlStatus, JobController, JobOutcome, JobStats, RunFlags, StatsUpdate};
pub use job_status::JobStatus;
