//! HTML extraction for crawled pages
//!
//! This module turns fetched HTML into:
//! - Links to follow, with anchor text and an internal/external flag
//! - A document view: title, visible text, and page metadata

use crate::url::same_authority;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

/// A link found on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedLink {
    /// Absolute URL
    pub url: String,
    pub anchor_text: String,
    /// True when the link stays on the page's host and port
    pub is_internal: bool,
}

/// Text and metadata extracted from a page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageDocument {
    pub title: Option<String>,
    /// Visible body text, whitespace collapsed
    pub text: String,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("empty document at {0}")]
    EmptyDocument(String),
}

/// Link extraction collaborator
pub trait LinkExtractor: Send + Sync {
    fn extract(&self, content: &str, base_url: &Url) -> Vec<ExtractedLink>;
}

/// Document extraction collaborator
pub trait DocumentExtractor: Send + Sync {
    fn extract_document(&self, content: &str, url: &Url) -> Result<PageDocument, ExtractError>;
}

/// scraper-backed extractor for HTML pages
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl LinkExtractor for HtmlExtractor {
    /// Extracts `<a href>` links
    ///
    /// # Link Extraction Rules
    ///
    /// **Exclude:**
    /// - `<a href="..." download>`
    /// - `javascript:`, `mailto:`, `tel:` links
    /// - Data URIs and fragment-only links
    /// - Anything that does not resolve to HTTP(S)
    ///
    /// `rel="nofollow"` links are followed.
    fn extract(&self, content: &str, base_url: &Url) -> Vec<ExtractedLink> {
        let document = Html::parse_document(content);
        let mut links = Vec::new();

        if let Ok(a_selector) = Selector::parse("a[href]") {
            for element in document.select(&a_selector) {
                if element.value().attr("download").is_some() {
                    continue;
                }

                let Some(href) = element.value().attr("href") else {
                    continue;
                };
                let Some(absolute) = resolve_link(href, base_url) else {
                    continue;
                };

                links.push(ExtractedLink {
                    is_internal: same_authority(base_url, &absolute),
                    url: absolute.to_string(),
                    anchor_text: collapse_whitespace(element.text()),
                });
            }
        }

        links
    }
}

impl DocumentExtractor for HtmlExtractor {
    fn extract_document(&self, content: &str, url: &Url) -> Result<PageDocument, ExtractError> {
        if content.trim().is_empty() {
            return Err(ExtractError::EmptyDocument(url.to_string()));
        }

        let document = Html::parse_document(content);
        let mut metadata = Map::new();

        let og = extract_open_graph(&document);
        let title = extract_title(&document).or_else(|| og.get("og:title").cloned());

        if let Some(description) = meta_content(&document, "meta[name='description']") {
            metadata.insert("description".to_string(), Value::String(description));
        }

        if let Some(canonical) = first_attr(&document, "link[rel='canonical'][href]", "href")
            .and_then(|href| url.join(&href).ok())
        {
            metadata.insert("canonical_url".to_string(), Value::String(canonical.to_string()));
        }

        if let Some(lang) = first_attr(&document, "html[lang]", "lang") {
            metadata.insert("language".to_string(), Value::String(lang));
        }

        if !og.is_empty() {
            let properties = og
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect::<Map<String, Value>>();
            metadata.insert("open_graph".to_string(), Value::Object(properties));
        }

        let text = visible_text(&document);
        let word_count = text.split_whitespace().count();
        metadata.insert("word_count".to_string(), Value::from(word_count));

        Ok(PageDocument {
            title,
            text,
            metadata,
        })
    }
}

/// Extracts the page title from the `<title>` element
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(element.text()))
        .filter(|s| !s.is_empty())
}

fn first_attr(document: &Html, selector: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .find_map(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    first_attr(document, selector, "content")
}

/// Collects `og:*` properties; the first occurrence of each wins
fn extract_open_graph(document: &Html) -> std::collections::BTreeMap<String, String> {
    let mut properties = std::collections::BTreeMap::new();
    let Ok(selector) = Selector::parse("meta[property^='og:'][content]") else {
        return properties;
    };

    for element in document.select(&selector) {
        let (Some(property), Some(content)) =
            (element.value().attr("property"), element.value().attr("content"))
        else {
            continue;
        };
        properties
            .entry(property.to_string())
            .or_insert_with(|| content.trim().to_string());
    }

    properties
}

/// Body text outside of script, style, noscript, and template elements
fn visible_text(document: &Html) -> String {
    let root = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element());

    let mut words: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ElementRef::wrap(ancestor).map_or(false, |element| {
                matches!(
                    element.value().name(),
                    "script" | "style" | "noscript" | "template"
                )
            })
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }

    words.join(" ")
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves a link href to an absolute HTTP(S) URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    base_url
        .join(href)
        .ok()
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    fn links(html: &str) -> Vec<ExtractedLink> {
        HtmlExtractor.extract(html, &base_url())
    }

    fn document(html: &str) -> PageDocument {
        HtmlExtractor.extract_document(html, &base_url()).unwrap()
    }

    #[test]
    fn test_extract_title() {
        let doc = document(r#"<html><head><title>  Test   Page  </title></head><body></body></html>"#);
        assert_eq!(doc.title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_title_falls_back_to_open_graph() {
        let doc = document(
            r#"<html><head><meta property="og:title" content="OG Title"></head><body></body></html>"#,
        );
        assert_eq!(doc.title, Some("OG Title".to_string()));
    }

    #[test]
    fn test_no_title() {
        let doc = document(r#"<html><head></head><body>text</body></html>"#);
        assert_eq!(doc.title, None);
    }

    #[test]
    fn test_visible_text_skips_scripts() {
        let doc = document(
            r#"<html><body><h1>Hello</h1><script>var x = 1;</script><style>p{}</style><p>big   world</p></body></html>"#,
        );
        assert_eq!(doc.text, "Hello big world");
        assert_eq!(doc.metadata["word_count"], Value::from(3));
    }

    #[test]
    fn test_metadata() {
        let doc = document(
            r#"<html lang="en"><head>
                <meta name="description" content="A test page">
                <link rel="canonical" href="/canonical">
                <meta property="og:type" content="article">
                <meta property="og:site_name" content="Example">
            </head><body></body></html>"#,
        );
        assert_eq!(doc.metadata["description"], "A test page");
        assert_eq!(doc.metadata["canonical_url"], "https://example.com/canonical");
        assert_eq!(doc.metadata["language"], "en");
        assert_eq!(doc.metadata["open_graph"]["og:type"], "article");
        assert_eq!(doc.metadata["open_graph"]["og:site_name"], "Example");
    }

    #[test]
    fn test_empty_document_is_error() {
        let result = HtmlExtractor.extract_document("  \n ", &base_url());
        assert!(matches!(result, Err(ExtractError::EmptyDocument(_))));
    }

    #[test]
    fn test_extract_absolute_and_relative_links() {
        let found = links(
            r#"<html><body><a href="https://other.com/page">Other</a><a href="other"> Rel  ative </a></body></html>"#,
        );
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].url, "https://other.com/page");
        assert!(!found[0].is_internal);
        assert_eq!(found[1].url, "https://example.com/other");
        assert_eq!(found[1].anchor_text, "Rel ative");
        assert!(found[1].is_internal);
    }

    #[test]
    fn test_skip_special_schemes() {
        let found = links(
            r#"<html><body>
                <a href="javascript:void(0)">js</a>
                <a href="mailto:test@example.com">mail</a>
                <a href="tel:+1234567890">tel</a>
                <a href="data:text/html,hi">data</a>
                <a href="ftp://example.com/file">ftp</a>
            </body></html>"#,
        );
        assert!(found.is_empty());
    }

    #[test]
    fn test_skip_download_and_fragment_links() {
        let found = links(
            r##"<html><body><a href="/file.pdf" download>Download</a><a href="#section">Jump</a></body></html>"##,
        );
        assert!(found.is_empty());
    }

    #[test]
    fn test_follow_nofollow_links() {
        let found = links(r#"<html><body><a href="/page2" rel="nofollow">Link</a></body></html>"#);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "https://example.com/page2");
    }
}
