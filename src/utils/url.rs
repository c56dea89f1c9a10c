//! URL utilities for consistent URL handling
//!
//! Site normalization and icon reference resolution live here so that the
//! resolver, the fetcher and the cache key all agree on the same rules.

use regex::Regex;
use url::Url;

/// Well-known icon path browsers request when a page declares no icon
pub const FALLBACK_ICON_PATH: &str = "favicon.ico";

/// URL utilities for consistent URL handling
pub struct UrlUtils;

impl UrlUtils {
    /// Normalize a user supplied site into a base URL
    ///
    /// A bare hostname gains an `https://` scheme and a trailing `/`. Sites
    /// that already carry an `http://` or `https://` scheme keep it; the
    /// trailing `/` is only added when the path is empty. Normalizing an
    /// already normalized site returns it unchanged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use favicon_cache::utils::url::UrlUtils;
    ///
    /// assert_eq!(UrlUtils::normalize_site("example.com"), "https://example.com/");
    /// assert_eq!(UrlUtils::normalize_site("https://example.com/"), "https://example.com/");
    /// assert_eq!(UrlUtils::normalize_site("http://example.com"), "http://example.com/");
    /// ```
    pub fn normalize_site(site: &str) -> String {
        let trimmed = site.trim();

        let with_scheme = if Self::has_http_scheme(trimmed) {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        match Url::parse(&with_scheme) {
            Ok(parsed) => parsed.to_string(),
            // Unparseable input is kept for the resolver to reject, but still
            // gets the trailing slash of a bare hostname.
            Err(_) => {
                let after_scheme = with_scheme
                    .split_once("://")
                    .map(|(_, rest)| rest)
                    .unwrap_or_default();
                if after_scheme.contains('/') {
                    with_scheme
                } else {
                    format!("{with_scheme}/")
                }
            }
        }
    }

    /// Resolve an icon reference found in a site's index document
    ///
    /// Rules apply in fixed precedence and only the first match fires:
    ///
    /// 1. protocol-relative (`//host/path`) is rewritten to `https://host/path`
    /// 2. absolute path (`/path`) is prepended with the site origin
    /// 3. anything else lacking an `https://` prefix is treated as relative
    ///    to the site root
    ///
    /// # Examples
    ///
    /// ```rust
    /// use favicon_cache::utils::url::UrlUtils;
    /// use url::Url;
    ///
    /// let site = Url::parse("https://example.com/").unwrap();
    /// assert_eq!(
    ///     UrlUtils::resolve_resource(&site, "//cdn.example.com/icon.png"),
    ///     "https://cdn.example.com/icon.png"
    /// );
    /// assert_eq!(UrlUtils::resolve_resource(&site, "/icon.png"), "https://example.com/icon.png");
    /// assert_eq!(UrlUtils::resolve_resource(&site, "icon.png"), "https://example.com/icon.png");
    /// ```
    pub fn resolve_resource(site: &Url, reference: &str) -> String {
        let reference = reference.trim();
        let origin = site.origin().ascii_serialization();

        if let Some(rest) = reference.strip_prefix("//") {
            format!("https://{rest}")
        } else if reference.starts_with('/') {
            format!("{origin}{reference}")
        } else if reference.starts_with("https://") {
            reference.to_string()
        } else {
            format!("{origin}/{reference}")
        }
    }

    /// The `<site>/favicon.ico` fallback for a site
    pub fn fallback_icon_url(site: &Url) -> String {
        format!(
            "{}/{}",
            site.origin().ascii_serialization(),
            FALLBACK_ICON_PATH
        )
    }

    /// Parse a normalized site URL, accepting only http(s) URLs with a host
    pub fn parse_site(site: &str) -> Result<Url, String> {
        let parsed = Url::parse(site).map_err(|e| e.to_string())?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("unsupported scheme '{}'", parsed.scheme()));
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err("missing host".to_string());
        }

        Ok(parsed)
    }

    /// Obfuscate sensitive information in URLs for safe logging
    ///
    /// Usernames and passwords in the authority, and common credential query
    /// parameters, are replaced with asterisks.
    pub fn obfuscate_credentials(url: &str) -> String {
        let mut obfuscated = url.to_string();

        if let Ok(parsed) = Url::parse(url)
            && (!parsed.username().is_empty() || parsed.password().is_some())
        {
            let mut new_url = parsed.clone();
            let _ = new_url.set_username("****");
            let _ = new_url.set_password(Some("****"));
            obfuscated = new_url.to_string();
        }

        let sensitive_params = ["username", "password", "user", "pass", "pwd", "token"];

        for param in &sensitive_params {
            let pattern = format!(r"(?i)([?&]{}=)[^&]*", regex::escape(param));
            if let Ok(re) = Regex::new(&pattern) {
                obfuscated = re.replace_all(&obfuscated, "${1}****").to_string();
            }
        }

        obfuscated
    }

    fn has_http_scheme(url: &str) -> bool {
        let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}
