use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use webintel::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM:8080/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the authority used for same-site comparisons: host plus explicit port
///
/// Default ports are not part of the authority, so `https://a.com` and
/// `https://a.com:443` compare equal.
pub fn authority(url: &Url) -> Option<String> {
    let host = extract_host(url)?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Returns true if both URLs share the same authority
pub fn same_authority(a: &Url, b: &Url) -> bool {
    match (authority(a), authority(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_host_lowercase() {
        let url = Url::parse("https://Blog.Example.COM/post").unwrap();
        assert_eq!(extract_host(&url), Some("blog.example.com".to_string()));
    }

    #[test]
    fn test_authority_with_port() {
        let url = Url::parse("http://127.0.0.1:8080/page").unwrap();
        assert_eq!(authority(&url), Some("127.0.0.1:8080".to_string()));
    }

    #[test]
    fn test_authority_default_port_omitted() {
        let url = Url::parse("https://example.com:443/").unwrap();
        assert_eq!(authority(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_same_authority() {
        let a = Url::parse("https://example.com/a").unwrap();
        let b = Url::parse("https://EXAMPLE.com/b?x=1").unwrap();
        let c = Url::parse("https://other.com/a").unwrap();
        let d = Url::parse("https://example.com:8443/a").unwrap();

        assert!(same_authority(&a, &b));
        assert!(!same_authority(&a, &c));
        assert!(!same_authority(&a, &d));
    }
}
