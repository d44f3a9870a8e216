//! Breadth-first frontier for a single crawl job
//!
//! This module handles:
//! - The FIFO queue of `(url, depth)` tasks
//! - The visited, queued, and failed sets used for deduplication
//!
//! A frontier is owned by the one task running its job and is never shared.

use std::collections::{HashSet, VecDeque};
use url::Url;

/// A URL waiting to be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTask {
    pub url: Url,
    pub depth: u32,
}

/// FIFO frontier plus the per-job URL sets
///
/// The union of the three sets only ever grows, and a URL is queued at most once.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<CrawlTask>,
    visited: HashSet<String>,
    queued: HashSet<String>,
    failed: HashSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a seed at depth 0
    ///
    /// Returns false for a duplicate seed.
    pub fn seed(&mut self, url: Url) -> bool {
        self.enqueue(url, 0)
    }

    /// Queues a URL unless it was already visited, queued, or failed
    pub fn enqueue(&mut self, url: Url, depth: u32) -> bool {
        if self.is_known(url.as_str()) {
            return false;
        }
        self.queued.insert(url.as_str().to_string());
        self.queue.push_back(CrawlTask { url, depth });
        true
    }

    /// Takes the oldest queued task
    pub fn pop(&mut self) -> Option<CrawlTask> {
        self.queue.pop_front()
    }

    /// Records a URL as visited
    ///
    /// Returns false if it had already been visited.
    pub fn mark_visited(&mut self, url: &Url) -> bool {
        self.visited.insert(url.as_str().to_string())
    }

    /// Records a URL (or an unparseable seed string) as failed
    pub fn mark_failed(&mut self, url: &str) {
        self.failed.insert(url.to_string());
    }

    pub fn is_known(&self, url: &str) -> bool {
        self.visited.contains(url) || self.queued.contains(url) || self.failed.contains(url)
    }

    /// Number of tasks still waiting
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Number of distinct URLs this job has seen
    pub fn discovered_count(&self) -> usize {
        let mut all: HashSet<&str> = self.queued.iter().map(String::as_str).collect();
        all.extend(self.visited.iter().map(String::as_str));
        all.extend(self.failed.iter().map(String::as_str));
        all.len()
    }

    /// Visited URLs in sorted order
    pub fn visited(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.visited.iter().cloned().collect();
        urls.sort();
        urls
    }
}
