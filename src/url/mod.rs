//! URL handling module for WebIntel
//!
//! This module provides link normalization, host extraction, allow-list
//! matching, and the per-job link admission policy.

mod domain;
mod matcher;
mod normalize;

use serde::{Deserialize, Serialize};
use url::Url;

// Re-export main functions
pub use domain::{authority, extract_host, same_authority};
pub use matcher::{contains_domain, matches_suffix};
pub use normalize::normalize_url;

/// How entries of an allow-list are compared with a link's host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainMatch {
    /// The allowed string occurs in the host on label boundaries
    #[default]
    Contains,
    /// The host is the allowed domain or one of its subdomains
    Suffix,
}

impl DomainMatch {
    pub fn matches(&self, host: &str, allowed: &str) -> bool {
        match self {
            Self::Contains => contains_domain(host, allowed),
            Self::Suffix => matches_suffix(host, allowed),
        }
    }
}

/// Decides which discovered links a job may follow
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPolicy {
    /// Lowercase allow-list; empty allows every host
    pub allowed_domains: Vec<String>,
    pub follow_external_links: bool,
    pub domain_match: DomainMatch,
}

impl LinkPolicy {
    pub fn new(
        allowed_domains: &[String],
        follow_external_links: bool,
        domain_match: DomainMatch,
    ) -> Self {
        Self {
            allowed_domains: allowed_domains
                .iter()
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            follow_external_links,
            domain_match,
        }
    }

    /// Returns true if the link's host passes the allow-list
    pub fn is_allowed_domain(&self, link: &Url) -> bool {
        if self.allowed_domains.is_empty() {
            return true;
        }
        let Some(host) = extract_host(link) else {
            return false;
        };
        self.allowed_domains
            .iter()
            .any(|allowed| self.domain_match.matches(&host, allowed))
    }

    /// Returns true if a link found on `page` should be followed
    ///
    /// The external-link policy is applied before the allow-list.
    pub fn admits(&self, page: &Url, link: &Url) -> bool {
        if !self.follow_external_links && !same_authority(page, link) {
            return false;
        }
        self.is_allowed_domain(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_empty_allow_list_allows_all() {
        let policy = LinkPolicy::new(&[], true, DomainMatch::Contains);
        assert!(policy.is_allowed_domain(&url("https://anything.org/")));
    }

    #[test]
    fn test_contains_policy() {
        let policy = LinkPolicy::new(&["Example.com".to_string()], true, DomainMatch::Contains);
        assert!(policy.is_allowed_domain(&url("https://sub.example.com/")));
        assert!(policy.is_allowed_domain(&url("https://example.com/")));
        assert!(!policy.is_allowed_domain(&url("https://notexample.com/")));
    }

    #[test]
    fn test_suffix_policy() {
        let policy = LinkPolicy::new(&["example.com".to_string()], true, DomainMatch::Suffix);
        assert!(policy.is_allowed_domain(&url("https://sub.example.com/")));
        assert!(!policy.is_allowed_domain(&url("https://example.com.cdn.net/")));
    }

    #[test]
    fn test_external_links_dropped_before_allow_list() {
        let policy = LinkPolicy::new(&["other.com".to_string()], false, DomainMatch::Contains);
        let page = url("https://example.com/a");

        // Allowed by the list, but external
        assert!(!policy.admits(&page, &url("https://other.com/b")));
        // Internal, but not on the list
        assert!(!policy.admits(&page, &url("https://example.com/b")));
    }

    #[test]
    fn test_external_links_followed_when_enabled() {
        let policy = LinkPolicy::new(&[], true, DomainMatch::Contains);
        let page = url("https://example.com/a");
        assert!(policy.admits(&page, &url("https://other.com/b")));
    }

    #[test]
    fn test_port_is_part_of_host_comparison() {
        let policy = LinkPolicy::new(&[], false, DomainMatch::Contains);
        let page = url("http://127.0.0.1:8080/");
        assert!(policy.admits(&page, &url("http://127.0.0.1:8080/next")));
        assert!(!policy.admits(&page, &url("http://127.0.0.1:9090/next")));
    }

    #[test]
    fn test_domain_match_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            mode: DomainMatch,
        }
        let w: Wrapper = toml::from_str("mode = \"suffix\"").unwrap();
        assert_eq!(w.mode, DomainMatch::Suffix);
    }
}
