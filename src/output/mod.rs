//! Output module for run listings and statistics
//!
//! This module handles:
//! - Listing the runs in the run store
//! - Per-run statistics: page counts, depth breakdown, hosts

pub mod stats;

pub use stats::{load_run_statistics, print_run_statistics, print_run_table, RunStatistics};
