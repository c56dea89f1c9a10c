//! Icon discovery from a site's index document
//!
//! The resolver downloads the site's root page and scans its `<link>`
//! elements for icon declarations. Candidate extraction and selection are
//! pure functions over the document text so they can be tested without a
//! network.

use scraper::{ElementRef, Html};
use std::sync::Arc;
use tracing::debug;

use crate::errors::ResolveError;
use crate::models::{IconCandidate, ResolvedIconUrl};
use crate::utils::http_client::{HttpClient, HttpResponse};
use crate::utils::url::UrlUtils;

/// `rel` substrings that mark a `<link>` as an icon, matched case-sensitively
const ICON_RELS: [&str; 3] = ["icon", "shortcut", "apple-touch-icon"];

/// Declared size used when `sizes` is absent or unparsable
pub const DEFAULT_DECLARED_SIZE: u32 = 1;

/// Leading number of a `sizes` attribute (`"32x32"` is 32)
pub fn parse_declared_size(sizes: Option<&str>) -> u32 {
    sizes
        .and_then(|s| s.split('x').next())
        .and_then(|width| width.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_DECLARED_SIZE)
}

/// All qualifying icon `<link>` elements, in document order
pub fn parse_icon_candidates(html: &str) -> Vec<IconCandidate> {
    let document = Html::parse_document(html);

    document
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|element| element.value().name() == "link")
        .filter_map(|element| {
            let link = element.value();
            let rel = link.attr("rel")?;
            if !ICON_RELS.iter().any(|icon_rel| rel.contains(icon_rel)) {
                return None;
            }

            let href = link.attr("href").map(str::trim).filter(|h| !h.is_empty())?;
            Some(IconCandidate::new(
                href,
                rel,
                parse_declared_size(link.attr("sizes")),
            ))
        })
        .collect()
}

/// The candidate with the strictly largest declared size; ties keep the first
pub fn select_best_candidate(candidates: &[IconCandidate]) -> Option<&IconCandidate> {
    candidates
        .iter()
        .fold(None, |best: Option<&IconCandidate>, candidate| match best {
            Some(current) if candidate.declared_size <= current.declared_size => Some(current),
            _ => Some(candidate),
        })
}

/// Finds the best icon URL for a site
#[derive(Clone)]
pub struct IconResolver {
    http: Arc<dyn HttpClient>,
    max_document_bytes: usize,
}

impl IconResolver {
    pub fn new(http: Arc<dyn HttpClient>, max_document_bytes: usize) -> Self {
        Self {
            http,
            max_document_bytes,
        }
    }

    /// Resolve the icon URL for a normalized site URL
    ///
    /// A non-success status or an empty page yields the `/favicon.ico`
    /// fallback. Transport failures and non-HTML documents are errors.
    pub async fn resolve(&self, site_url: &str) -> Result<ResolvedIconUrl, ResolveError> {
        let site = UrlUtils::parse_site(site_url)
            .map_err(|reason| ResolveError::invalid_site(site_url, reason))?;

        let response = self.http.get(site.as_str(), self.max_document_bytes).await?;

        let candidates = if response.is_success() && !response.body.is_empty() {
            ensure_html(&response)?;
            if response.truncated {
                debug!(
                    "Index of {} exceeds {} bytes, parsing the prefix",
                    UrlUtils::obfuscate_credentials(site.as_str()),
                    self.max_document_bytes
                );
            }
            let html = String::from_utf8_lossy(&response.body).into_owned();
            parse_icon_candidates(&html)
        } else {
            debug!(
                "Index of {} returned status {} with {} bytes, using fallback",
                UrlUtils::obfuscate_credentials(site.as_str()),
                response.status,
                response.body.len()
            );
            Vec::new()
        };

        let resolved = match select_best_candidate(&candidates) {
            Some(best) => {
                debug!(
                    "Chose icon '{}' (rel '{}', size {}) out of {} candidates",
                    best.href,
                    best.rel,
                    best.declared_size,
                    candidates.len()
                );
                ResolvedIconUrl::Declared {
                    url: UrlUtils::resolve_resource(&site, &best.href),
                    declared_size: best.declared_size,
                }
            }
            None => ResolvedIconUrl::Fallback {
                url: UrlUtils::fallback_icon_url(&site),
            },
        };

        Ok(resolved)
    }
}

/// Reject documents that are clearly not HTML
fn ensure_html(response: &HttpResponse) -> Result<(), ResolveError> {
    match response.content_type.as_deref() {
        Some(content_type) => {
            let lower = content_type.to_ascii_lowercase();
            if lower.contains("html") || lower.contains("xml") {
                Ok(())
            } else {
                Err(ResolveError::NotHtml {
                    content_type: content_type.to_string(),
                })
            }
        }
        None => match infer::get(&response.body) {
            Some(kind) if kind.matcher_type() != infer::MatcherType::Text => {
                Err(ResolveError::NotHtml {
                    content_type: kind.mime_type().to_string(),
                })
            }
            _ => Ok(()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http_client::StaticHttpClient;
    use rstest::rstest;

    const SITE: &str = "https://example.com/";

    fn resolver(client: Arc<StaticHttpClient>) -> IconResolver {
        IconResolver::new(client, 64 * 1024)
    }

    fn html_page(body: &str) -> HttpResponse {
        HttpResponse::new(200, Some("text/html; charset=utf-8"), body.to_string())
    }

    #[rstest]
    #[case(Some("32x32"), 32)]
    #[case(Some("180x180"), 180)]
    #[case(Some("16x16 32x32"), 16)]
    #[case(Some(" 48 x 48"), 48)]
    #[case(Some("any"), 1)]
    #[case(Some(""), 1)]
    #[case(Some("x32"), 1)]
    #[case(None, 1)]
    fn test_parse_declared_size(#[case] sizes: Option<&str>, #[case] expected: u32) {
        assert_eq!(parse_declared_size(sizes), expected);
    }

    #[test]
    fn test_parse_candidates_filters_rel() {
        let html = r#"
            <html><head>
              <link rel="stylesheet" href="/style.css">
              <link rel="icon" href="/a.png" sizes="16x16">
              <link rel="shortcut icon" href="/b.ico">
              <link rel="apple-touch-icon" href="/c.png" sizes="180x180">
              <link rel="ICON" href="/upper.png">
              <link rel="mask-icon" href="/mask.svg">
              <link rel="icon" href="   ">
              <link rel="icon">
            </head><body></body></html>
        "#;

        let candidates = parse_icon_candidates(html);
        let hrefs: Vec<_> = candidates.iter().map(|c| c.href.as_str()).collect();
        assert_eq!(hrefs, vec!["/a.png", "/b.ico", "/c.png", "/mask.svg"]);
        assert_eq!(candidates[0].declared_size, 16);
        assert_eq!(candidates[1].declared_size, 1);
        assert_eq!(candidates[2].declared_size, 180);
        assert_eq!(candidates[1].rel, "shortcut icon");
    }

    #[test]
    fn test_parse_candidates_survives_malformed_markup() {
        let html = r#"<link rel="icon" href="/ok.png" sizes="32x32"><div><<<link rel=icon href=/x.png"#;
        let candidates = parse_icon_candidates(html);
        assert!(candidates.iter().any(|c| c.href == "/ok.png"));
    }

    #[test]
    fn test_select_best_keeps_first_of_equal_size() {
        let candidates = vec![
            IconCandidate::new("/16.png", "icon", 16),
            IconCandidate::new("/shortcut.png", "shortcut icon", 32),
            IconCandidate::new("/apple.png", "apple-touch-icon", 32),
        ];
        assert_eq!(
            select_best_candidate(&candidates).map(|c| c.href.as_str()),
            Some("/shortcut.png")
        );
    }

    #[test]
    fn test_select_best_of_unsized_is_first() {
        let candidates = vec![
            IconCandidate::new("/first.ico", "icon", 1),
            IconCandidate::new("/second.ico", "icon", 1),
        ];
        assert_eq!(
            select_best_candidate(&candidates).map(|c| c.href.as_str()),
            Some("/first.ico")
        );
        assert_eq!(select_best_candidate(&[]), None);
    }

    #[tokio::test]
    async fn test_resolve_picks_largest_declared_icon() {
        let client = Arc::new(StaticHttpClient::new());
        client.respond(
            SITE,
            html_page(
                r#"<head>
                <link rel="icon" href="/16.png" sizes="16x16">
                <link rel="shortcut icon" href="//cdn.example.com/32.png" sizes="32x32">
                <link rel="apple-touch-icon" href="/apple.png" sizes="32x32">
                </head>"#,
            ),
        );

        let resolved = resolver(client).resolve(SITE).await.unwrap();
        assert_eq!(resolved.as_str(), "https://cdn.example.com/32.png");
        assert!(!resolved.is_fallback());
    }

    #[tokio::test]
    async fn test_resolve_without_candidates_falls_back() {
        let client = Arc::new(StaticHttpClient::new());
        client.respond(SITE, html_page("<html><head><title>hi</title></head></html>"));

        let resolved = resolver(client).resolve(SITE).await.unwrap();
        assert_eq!(resolved.as_str(), "https://example.com/favicon.ico");
        assert!(resolved.is_fallback());
    }

    #[rstest]
    #[case(HttpResponse::new(404, Some("text/html"), "<link rel=icon href=/a.png>"))]
    #[case(HttpResponse::new(500, None, ""))]
    #[case(HttpResponse::new(200, Some("text/html"), ""))]
    #[tokio::test]
    async fn test_resolve_unusable_page_falls_back(#[case] response: HttpResponse) {
        let client = Arc::new(StaticHttpClient::new());
        client.respond(SITE, response);

        let resolved = resolver(client).resolve(SITE).await.unwrap();
        assert_eq!(resolved.as_str(), "https://example.com/favicon.ico");
    }

    #[tokio::test]
    async fn test_resolve_rejects_non_html() {
        let client = Arc::new(StaticHttpClient::new());
        client.respond(
            SITE,
            HttpResponse::new(200, Some("application/pdf"), "%PDF-1.7"),
        );

        let result = resolver(client).resolve(SITE).await;
        assert!(matches!(result, Err(ResolveError::NotHtml { .. })));
    }

    #[tokio::test]
    async fn test_resolve_sniffs_binary_without_content_type() {
        let client = Arc::new(StaticHttpClient::new());
        client.respond(
            SITE,
            HttpResponse::new(200, None, vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]),
        );

        let result = resolver(client).resolve(SITE).await;
        assert!(matches!(result, Err(ResolveError::NotHtml { .. })));
    }

    #[tokio::test]
    async fn test_resolve_accepts_untyped_html() {
        let client = Arc::new(StaticHttpClient::new());
        client.respond(
            SITE,
            HttpResponse::new(200, None, r#"<link rel="icon" href="icon.png">"#),
        );

        let resolved = resolver(client).resolve(SITE).await.unwrap();
        assert_eq!(resolved.as_str(), "https://example.com/icon.png");
    }

    #[tokio::test]
    async fn test_resolve_network_failure() {
        let client = Arc::new(StaticHttpClient::new());
        client.time_out(SITE);

        let result = resolver(client).resolve(SITE).await;
        assert!(matches!(result, Err(ResolveError::Http(_))));
    }

    #[rstest]
    #[case("not a url")]
    #[case("ftp://example.com/")]
    #[case("https://exa mple.com/")]
    #[tokio::test]
    async fn test_resolve_malformed_site(#[case] site: &str) {
        let client = Arc::new(StaticHttpClient::new());
        let result = resolver(client.clone()).resolve(site).await;
        assert!(matches!(result, Err(ResolveError::InvalidSite { .. })));
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_parses_truncated_document_prefix() {
        let client = Arc::new(StaticHttpClient::new());
        let mut page = String::from(r#"<head><link rel="icon" href="/early.png">"#);
        page.push_str(&"<!-- padding -->".repeat(100));
        page.push_str(r#"<link rel="icon" href="/late.png" sizes="64x64"></head>"#);
        client.respond(SITE, html_page(&page));

        let resolved = IconResolver::new(client, 128).resolve(SITE).await.unwrap();
        assert_eq!(resolved.as_str(), "https://example.com/early.png");
    }
}
