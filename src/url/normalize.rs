use crate::UrlError;
use url::{ParseError, Url};

/// Tracking query parameters removed during normalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
];

/// Normalizes a link or seed URL
///
/// # Normalization Steps
///
/// 1. Resolve the input against `base` when it is relative
/// 2. Default the scheme to `https` when the input has none and there is no base
/// 3. Reject anything that is not HTTP(S) or has no host
/// 4. Remove the fragment
/// 5. Remove tracking query parameters; the query is only rewritten when one is
///    present, so applying this function twice yields the same URL
///
/// # Arguments
///
/// * `input` - The raw href or seed string
/// * `base` - The page the link was found on, if any
///
/// # Examples
///
/// ```
/// use webintel::url::normalize_url;
///
/// let url = normalize_url("example.com/page#top", None).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/page");
/// ```
pub fn normalize_url(input: &str, base: Option<&Url>) -> Result<Url, UrlError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(UrlError::Malformed("empty URL".to_string()));
    }

    // Step 1 & 2: Parse, resolving relative input or defaulting the scheme
    let mut url = match Url::parse(input) {
        Ok(url) => url,
        Err(ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base
                .join(input)
                .map_err(|e| UrlError::Parse(e.to_string()))?,
            None if input.starts_with("//") => Url::parse(&format!("https:{}", input))
                .map_err(|e| UrlError::Parse(e.to_string()))?,
            None => Url::parse(&format!("https://{}", input))
                .map_err(|e| UrlError::Parse(e.to_string()))?,
        },
        Err(e) => return Err(UrlError::Parse(e.to_string())),
    };

    // Step 3: Validate scheme and host
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    // Step 4: Remove fragment
    url.set_fragment(None);

    // Step 5: Remove tracking parameters
    if url.query_pairs().any(|(key, _)| is_tracking_param(&key)) {
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
    }

    Ok(url)
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/docs/index.html").unwrap()
    }

    #[test]
    fn test_resolve_relative_link() {
        let result = normalize_url("guide.html", Some(&base())).unwrap();
        assert_eq!(result.as_str(), "https://example.com/docs/guide.html");

        let result = normalize_url("/about", Some(&base())).unwrap();
        assert_eq!(result.as_str(), "https://example.com/about");
    }

    #[test]
    fn test_default_scheme() {
        let result = normalize_url("example.com/page", None).unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");

        let result = normalize_url("//cdn.example.com/lib.js", None).unwrap();
        assert_eq!(result.as_str(), "https://cdn.example.com/lib.js");
    }

    #[test]
    fn test_keeps_http_scheme() {
        let result = normalize_url("http://example.com/page", None).unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn test_remove_fragment() {
        let result = normalize_url("https://example.com/page#section", None).unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");

        let result = normalize_url("#top", Some(&base())).unwrap();
        assert_eq!(result.as_str(), "https://example.com/docs/index.html");
    }

    #[test]
    fn test_remove_tracking_params() {
        let result = normalize_url(
            "https://example.com/page?keep=yes&utm_medium=email&another=value&fbclid=123",
            None,
        )
        .unwrap();
        assert_eq!(
            result.as_str(),
            "https://example.com/page?keep=yes&another=value"
        );
    }

    #[test]
    fn test_all_tracking_params_removed() {
        for param in TRACKING_PARAMS {
            let url = format!("https://example.com/page?{}=value", param);
            let result = normalize_url(&url, None).unwrap();
            assert_eq!(
                result.as_str(),
                "https://example.com/page",
                "Failed to remove {}",
                param
            );
        }
    }

    #[test]
    fn test_other_params_untouched() {
        let result = normalize_url("https://example.com/s?q=a+b&ref=x", None).unwrap();
        assert_eq!(result.as_str(), "https://example.com/s?q=a+b&ref=x");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "https://Example.com/a/../b/?utm_source=x&q=1#frag",
            "example.com",
            "http://example.com:8080/path?gclid=1",
            "https://example.com/search?q=hello%20world&utm_term=t",
            "https://example.com/?",
        ];
        for input in inputs {
            let once = normalize_url(input, None).unwrap();
            let twice = normalize_url(once.as_str(), None).unwrap();
            assert_eq!(once, twice, "not idempotent for {}", input);
        }
    }

    #[test]
    fn test_invalid_scheme() {
        let result = normalize_url("mailto:someone@example.com", None);
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));

        let result = normalize_url("javascript:void(0)", Some(&base()));
        assert!(matches!(result, Err(UrlError::InvalidScheme(_))));
    }

    #[test]
    fn test_empty_input() {
        assert!(normalize_url("   ", None).is_err());
    }
}
