//! Crawler module for web page fetching and traversal
//!
//! This module contains the per-job crawling logic, including:
//! - HTTP fetching behind the `FetchClient` trait, with retry logic
//! - HTML link and document extraction
//! - The breadth-first frontier with its visited/queued/failed sets
//! - The crawl engine that ties them to a job controller

mod engine;
mod fetcher;
mod frontier;
mod parser;

pub use engine::{
    CrawlEngine, CrawlReport, CrawlSettings, EngineError, FailedUrl, PageResult, PageSink,
    SinkError,
};
pub use fetcher::{
    build_http_client, FetchClient, FetchError, FetchOptions, FetchedPage, HttpFetchClient,
    RetryPolicy,
};
pub use frontier::{CrawlTask, Frontier};
pub use parser::{
    DocumentExtractor, ExtractError, ExtractedLink, HtmlExtractor, LinkExtractor, PageDocument,
};
