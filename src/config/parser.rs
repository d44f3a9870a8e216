use crate::config::types::{Config, CrawlSpec};
use crate::config::validation::{validate, validate_crawl_spec};
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use webintel::config::load_config;
///
/// let config = load_config(Path::new("webintel.toml")).unwrap();
/// println!("Workers: {}", config.scheduler.max_workers);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so runs can be correlated with the config that produced them.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Parses and validates a crawl job described in TOML
///
/// ```
/// use webintel::config::parse_crawl_spec;
///
/// let spec = parse_crawl_spec(r#"
/// query = "docs"
/// start_urls = ["https://example.com/docs"]
/// max_depth = 1
/// "#).unwrap();
/// assert_eq!(spec.max_pages, 100);
/// ```
pub fn parse_crawl_spec(content: &str) -> Result<CrawlSpec, ConfigError> {
    let spec: CrawlSpec = toml::from_str(content)?;
    validate_crawl_spec(&spec, true)?;
    Ok(spec)
}

/// Loads a crawl job file
pub fn load_crawl_spec(path: &Path) -> Result<CrawlSpec, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_crawl_spec(&content)
}
