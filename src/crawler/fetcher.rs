//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients from the fetch configuration
//! - Per-request user agent, proxy, and navigation timeout knobs
//! - The retry contract: HTTP error statuses retry on a fixed delay, transport
//!   errors retry with exponential backoff, and one `fetch` call either succeeds
//!   or has exhausted its attempts

use crate::config::FetchConfig;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Proxy};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Knobs forwarded to the fetch client for every page of a job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// CSS selectors a rendering client waits for; the plain HTTP client ignores them
    pub wait_for_selectors: Vec<String>,
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
    pub navigation_timeout: Option<Duration>,
}

/// A successfully fetched page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub final_url: Url,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl FetchedPage {
    pub fn bytes(&self) -> u64 {
        self.body.len() as u64
    }
}

/// Final failure of a fetch after all attempts were used
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("HTTP {status_code} for {url} after {attempts} attempt(s)")]
    Status {
        url: String,
        status_code: u16,
        attempts: u32,
    },

    #[error("request to {url} failed after {attempts} attempt(s): {message}")]
    Transport {
        url: String,
        message: String,
        attempts: u32,
    },

    #[error("cannot build HTTP client: {0}")]
    Client(String),
}

/// Page fetching collaborator used by the crawl engine
#[async_trait]
pub trait FetchClient: Send + Sync {
    async fn fetch(&self, url: &Url, options: &FetchOptions) -> Result<FetchedPage, FetchError>;
}

/// Retry schedule for one fetch call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(retry_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            retry_attempts,
            retry_delay,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_delay())
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_attempts.saturating_add(1)
    }

    /// Delay after an HTTP error status
    pub fn status_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Delay after the transport error of zero-based `attempt`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.retry_delay.saturating_mul(factor)
    }
}

/// Builds an HTTP client with the configured timeout and user agent
///
/// # Example
///
/// ```no_run
/// use webintel::config::FetchConfig;
/// use webintel::crawler::build_http_client;
///
/// let client = build_http_client(&FetchConfig::default(), None).unwrap();
/// ```
pub fn build_http_client(config: &FetchConfig, proxy: Option<&str>) -> Result<Client, reqwest::Error> {
    let user_agent = config
        .user_agent
        .clone()
        .unwrap_or_else(|| format!("webintel/{}", env!("CARGO_PKG_VERSION")));

    let mut builder = Client::builder()
        .user_agent(user_agent)
        .timeout(config.timeout())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = proxy {
        builder = builder.proxy(Proxy::all(proxy)?);
    }

    builder.build()
}

enum AttemptError {
    Status(u16),
    Transport(String),
}

/// reqwest-backed [`FetchClient`]
pub struct HttpFetchClient {
    client: Client,
    proxied: Mutex<HashMap<String, Client>>,
    config: FetchConfig,
    policy: RetryPolicy,
}

impl HttpFetchClient {
    pub fn new(config: FetchConfig) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&config, None)?;
        let policy = RetryPolicy::from_config(&config);
        Ok(Self {
            client,
            proxied: Mutex::new(HashMap::new()),
            config,
            policy,
        })
    }

    /// Overrides the retry schedule taken from the config
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<Client, FetchError> {
        let Some(proxy) = proxy else {
            return Ok(self.client.clone());
        };

        let mut proxied = self.proxied.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = proxied.get(proxy) {
            return Ok(client.clone());
        }

        let client = build_http_client(&self.config, Some(proxy))
            .map_err(|e| FetchError::Client(e.to_string()))?;
        proxied.insert(proxy.to_string(), client.clone());
        Ok(client)
    }

    async fn attempt(
        &self,
        client: &Client,
        url: &Url,
        options: &FetchOptions,
    ) -> Result<FetchedPage, AttemptError> {
        let mut request = client.get(url.as_str());
        if let Some(agent) = &options.user_agent {
            request = request.header(USER_AGENT, agent);
        }
        if let Some(timeout) = options.navigation_timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(AttemptError::Status(status.as_u16()));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        Ok(FetchedPage {
            final_url,
            status_code: status.as_u16(),
            content_type,
            body,
        })
    }
}

#[async_trait]
impl FetchClient for HttpFetchClient {
    async fn fetch(&self, url: &Url, options: &FetchOptions) -> Result<FetchedPage, FetchError> {
        let client = self.client_for(options.proxy.as_deref())?;
        let mut attempt = 0u32;

        loop {
            let retries_left = attempt < self.policy.retry_attempts;

            match self.attempt(&client, url, options).await {
                Ok(page) => return Ok(page),
                Err(AttemptError::Status(status_code)) => {
                    if !retries_left {
                        return Err(FetchError::Status {
                            url: url.to_string(),
                            status_code,
                            attempts: attempt + 1,
                        });
                    }
                    let delay = self.policy.status_delay();
                    tracing::warn!(url = %url, status_code, attempt = attempt + 1, ?delay, "HTTP error, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(AttemptError::Transport(message)) => {
                    if !retries_left {
                        return Err(FetchError::Transport {
                            url: url.to_string(),
                            message,
                            attempts: attempt + 1,
                        });
                    }
                    let delay = self.policy.backoff_delay(attempt);
                    tracing::warn!(url = %url, error = %message, attempt = attempt + 1, ?delay, "request failed, backing off");
                    tokio::time::sleep(delay).await;
                }
            }

            attempt += 1;
        }
    }
}
