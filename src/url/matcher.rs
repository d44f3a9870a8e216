/// Checks if `allowed` occurs inside `host` aligned to label boundaries
///
/// The allowed string may sit anywhere in the host as long as it starts and ends
/// on a `.` or the end of the host:
///
/// - "example.com" matches "example.com", "sub.example.com", "example.com.cdn.net"
/// - "example.com" does not match "notexample.com" or "example.community"
///
/// An allowed string that itself starts or ends with `.` (".gov") supplies its
/// own boundary on that side.
///
/// # Examples
///
/// ```
/// use webintel::url::contains_domain;
///
/// assert!(contains_domain("blog.example.com", "example.com"));
/// assert!(!contains_domain("notexample.com", "example.com"));
/// ```
pub fn contains_domain(host: &str, allowed: &str) -> bool {
    if allowed.is_empty() {
        return false;
    }

    let bytes = host.as_bytes();
    let open_left = allowed.starts_with('.');
    let open_right = allowed.ends_with('.');

    host.match_indices(allowed).any(|(start, _)| {
        let end = start + allowed.len();
        let left_ok = open_left || start == 0 || bytes[start - 1] == b'.';
        let right_ok = open_right || end == host.len() || bytes[end] == b'.';
        left_ok && right_ok
    })
}

/// Checks if `host` is `allowed` itself or one of its subdomains
///
/// # Examples
///
/// ```
/// use webintel::url::matches_suffix;
///
/// assert!(matches_suffix("example.com", "example.com"));
/// assert!(matches_suffix("api.v2.example.com", "example.com"));
/// assert!(!matches_suffix("example.com.cdn.net", "example.com"));
/// ```
pub fn matches_suffix(host: &str, allowed: &str) -> bool {
    let base = allowed.strip_prefix("*.").unwrap_or(allowed);
    if base.is_empty() {
        return false;
    }
    host == base || host.ends_with(&format!(".{}", base))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_exact_and_subdomain() {
        assert!(contains_domain("example.com", "example.com"));
        assert!(contains_domain("sub.example.com", "example.com"));
        assert!(contains_domain("deep.sub.example.com", "example.com"));
    }

    #[test]
    fn test_contains_in_middle_of_host() {
        assert!(contains_domain("example.com.cdn.net", "example.com"));
        assert!(contains_domain("www.example.co.uk", "example"));
    }

    #[test]
    fn test_contains_rejects_partial_labels() {
        assert!(!contains_domain("notexample.com", "example.com"));
        assert!(!contains_domain("example.community", "example.com"));
        assert!(!contains_domain("myexample.org", "example"));
    }

    #[test]
    fn test_contains_dotted_pattern() {
        assert!(contains_domain("agency.gov", ".gov"));
        assert!(!contains_domain("agency.govt.nz", ".gov"));
    }

    #[test]
    fn test_contains_empty() {
        assert!(!contains_domain("example.com", ""));
        assert!(!contains_domain("", "example.com"));
    }

    #[test]
    fn test_suffix_matches_bare_and_subdomains() {
        assert!(matches_suffix("example.com", "example.com"));
        assert!(matches_suffix("blog.example.com", "example.com"));
        assert!(matches_suffix("api.v2.example.com", "*.example.com"));
    }

    #[test]
    fn test_suffix_rejects_others() {
        assert!(!matches_suffix("notexample.com", "example.com"));
        assert!(!matches_suffix("example.com.cdn.net", "example.com"));
        assert!(!matches_suffix("example.org", "example.com"));
        assert!(!matches_suffix("example.com", ""));
    }

    #[test]
    fn test_suffix_multiple_dots_in_base() {
        assert!(matches_suffix("co.uk", "co.uk"));
        assert!(matches_suffix("blog.example.co.uk", "co.uk"));
        assert!(!matches_suffix("co.jp", "co.uk"));
    }
}
