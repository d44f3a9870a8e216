//! Search seed providers
//!
//! Basic crawls start from a free-text query. A `SeedProvider` turns the query
//! into search hits before the traversal begins; the hits are stored as depth-0
//! pages and their URLs become the crawl seeds.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
    /// Display name of the result's site, when the provider reports one
    pub site: Option<String>,
}

/// Resolves a query into seed URLs
#[async_trait]
pub trait SeedProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<SearchHit>>;
}

/// Returns the same hits for every query
#[derive(Debug, Clone, Default)]
pub struct StaticSeedProvider {
    hits: Vec<SearchHit>,
}

impl StaticSeedProvider {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }

    /// Hits with the URL doubling as title and an empty snippet
    pub fn from_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let hits = urls
            .into_iter()
            .map(|url| {
                let url = url.into();
                SearchHit {
                    title: url.clone(),
                    url,
                    snippet: String::new(),
                    site: None,
                }
            })
            .collect();
        Self { hits }
    }
}

#[async_trait]
impl SeedProvider for StaticSeedProvider {
    async fn search(&self, _query: &str, max_results: usize) -> anyhow::Result<Vec<SearchHit>> {
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }
}

/// Provider for deployments without a search backend
///
/// Every search fails, so basic crawls fail with a clear message instead of
/// completing silently with no pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSearchProvider;

#[async_trait]
impl SeedProvider for NoSearchProvider {
    async fn search(&self, query: &str, _max_results: usize) -> anyhow::Result<Vec<SearchHit>> {
        anyhow::bail!("no search provider is configured (query: {:?})", query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_truncates() {
        let provider = StaticSeedProvider::from_urls(["https://a.com/", "https://b.com/"]);
        let hits = provider.search("anything", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://a.com/");
        assert_eq!(hits[0].title, "https://a.com/");
    }

    #[tokio::test]
    async fn test_no_search_provider_fails() {
        let err = NoSearchProvider.search("rust", 5).await.unwrap_err();
        assert!(err.to_string().contains("no search provider"));
    }
}
