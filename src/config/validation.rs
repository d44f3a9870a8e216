use crate::config::types::{CollectionSpec, Config, CrawlDefaults, CrawlSpec, FetchConfig};
use crate::storage::JobKind;
use crate::url::normalize_url;
use crate::ConfigError;
use serde_json::Value;

/// Deepest crawl accepted at job creation
pub const MAX_CRAWL_DEPTH: u32 = 10;

/// Validates the entire application configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.scheduler.max_workers < 1 || config.scheduler.max_workers > 64 {
        return Err(ConfigError::Validation(format!(
            "max_workers must be between 1 and 64, got {}",
            config.scheduler.max_workers
        )));
    }

    validate_fetch_config(&config.fetch)?;
    validate_crawl_defaults(&config.crawl)?;

    if config.storage.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates fetch client configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "timeout_secs must be >= 1, got {}",
            config.timeout_secs
        )));
    }

    if let Some(agent) = &config.user_agent {
        if agent.trim().is_empty() {
            return Err(ConfigError::Validation(
                "user_agent cannot be blank".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates defaults for query-seeded crawls
fn validate_crawl_defaults(config: &CrawlDefaults) -> Result<(), ConfigError> {
    if config.default_max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "default_max_pages must be >= 1, got {}",
            config.default_max_pages
        )));
    }

    validate_wait_time(config.default_wait_time_secs)?;

    if config.search_results < 1 {
        return Err(ConfigError::Validation(format!(
            "search_results must be >= 1, got {}",
            config.search_results
        )));
    }

    Ok(())
}

/// Validates a crawl spec
///
/// `require_seeds` is set for configured crawls, which cannot fall back to search.
pub fn validate_crawl_spec(spec: &CrawlSpec, require_seeds: bool) -> Result<(), ConfigError> {
    if spec.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages must be >= 1, got {}",
            spec.max_pages
        )));
    }

    validate_depth(spec.max_depth)?;
    validate_wait_time(spec.wait_time)?;

    if require_seeds && spec.start_urls.is_empty() {
        return Err(ConfigError::Validation(
            "a configured crawl needs at least one start URL".to_string(),
        ));
    }

    for seed in &spec.start_urls {
        normalize_url(seed, None).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid start URL '{}': {}", seed, e))
        })?;
    }

    for domain in spec.allowed_domains.iter().flatten() {
        validate_domain_pattern(domain)?;
    }

    Ok(())
}

/// Validates a content collection spec
pub fn validate_collection_spec(spec: &CollectionSpec) -> Result<(), ConfigError> {
    if spec.content_query.trim().is_empty() {
        return Err(ConfigError::Validation(
            "content_query cannot be empty".to_string(),
        ));
    }

    if spec.sources.is_empty() {
        return Err(ConfigError::Validation(
            "a collection needs at least one source".to_string(),
        ));
    }

    if spec.max_items_per_source < 1 {
        return Err(ConfigError::Validation(format!(
            "max_items_per_source must be >= 1, got {}",
            spec.max_items_per_source
        )));
    }

    Ok(())
}

/// Validates a job before its record is created
///
/// Malformed jobs are rejected here so they never reach an executor.
pub fn validate_job(
    kind: JobKind,
    query: &str,
    max_depth: u32,
    payload: Option<&Value>,
) -> Result<(), ConfigError> {
    validate_depth(max_depth)?;

    match kind {
        JobKind::BasicCrawl => {
            if query.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "a basic crawl needs a non-empty query".to_string(),
                ));
            }
            if let Some(payload) = payload {
                let spec: CrawlSpec = serde_json::from_value(payload.clone())?;
                validate_crawl_spec(&spec, false)?;
            }
        }
        JobKind::ConfiguredCrawl => {
            let payload = payload.ok_or_else(|| {
                ConfigError::Validation("a configured crawl needs a crawl spec".to_string())
            })?;
            let spec: CrawlSpec = serde_json::from_value(payload.clone())?;
            validate_crawl_spec(&spec, true)?;
        }
        JobKind::ContentCollection => {
            let payload = payload.ok_or_else(|| {
                ConfigError::Validation("a collection job needs a collection spec".to_string())
            })?;
            let spec: CollectionSpec = serde_json::from_value(payload.clone())?;
            validate_collection_spec(&spec)?;
        }
    }

    Ok(())
}

fn validate_depth(max_depth: u32) -> Result<(), ConfigError> {
    if max_depth > MAX_CRAWL_DEPTH {
        return Err(ConfigError::Validation(format!(
            "max_depth must be <= {}, got {}",
            MAX_CRAWL_DEPTH, max_depth
        )));
    }
    Ok(())
}

fn validate_wait_time(seconds: f64) -> Result<(), ConfigError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(ConfigError::Validation(format!(
            "wait time must be a finite number of seconds >= 0, got {}",
            seconds
        )));
    }
    Ok(())
}

/// Validates an allow-list entry
///
/// Entries are matched by containment, so bare labels ("example") and dotted
/// suffixes (".gov") are accepted as well as full domains.
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);

    if domain.trim().is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}
