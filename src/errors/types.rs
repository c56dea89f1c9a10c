//! Error type definitions for the favicon pipeline
//!
//! Each layer gets its own enum so the caller-facing [`FaviconError`] can
//! carry the precise cause of a failed lookup while the cache store keeps its
//! failures to itself.

use thiserror::Error;

/// Top-level application error type
///
/// Only raised while wiring the pipeline together (opening the cache
/// directory, building the HTTP client, loading configuration). Lookups
/// report [`FaviconError`] instead.
#[derive(Error, Debug)]
pub enum AppError {
    /// Cache store could not be opened
    #[error("Cache store error: {0}")]
    Store(#[from] CacheStoreError),

    /// HTTP client could not be constructed
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Failure of a single icon lookup, delivered to the caller's error callback
#[derive(Error, Debug)]
pub enum FaviconError {
    /// The site's index page could not be fetched or was not usable HTML
    #[error("Failed to resolve icon for '{site}': {source}")]
    ResolveFailed {
        site: String,
        #[source]
        source: ResolveError,
    },

    /// The chosen icon could not be fetched or decoded
    #[error("Failed to fetch icon from '{url}': {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: FetchError,
    },
}

/// Index page resolution errors
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Site URL could not be parsed or is not an http(s) URL with a host
    #[error("Invalid site URL '{site}': {reason}")]
    InvalidSite { site: String, reason: String },

    /// Transport failure fetching the index page
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Index page is not an HTML document
    #[error("Index document is not HTML (content type: {content_type})")]
    NotHtml { content_type: String },
}

/// Icon image retrieval errors
#[derive(Error, Debug)]
pub enum FetchError {
    /// Resolved icon URL could not be parsed
    #[error("Invalid icon URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Transport failure fetching the image
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Server answered with a non-success status
    #[error("HTTP status {status}")]
    Status { status: u16 },

    /// Body exceeded the configured image size limit
    #[error("Image body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// Body could not be decoded as a raster image
    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    /// Blocking decode task was cancelled or panicked
    #[error("Image worker failed: {message}")]
    Worker { message: String },
}

/// Transport level HTTP errors
#[derive(Error, Debug)]
pub enum HttpError {
    /// Request exceeded the client's timeout bounds
    #[error("Connection timeout: {url}")]
    Timeout { url: String },

    /// Connection, TLS or body read failure
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// Client construction failed
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

/// Cache store errors
///
/// `Corrupt` is only ever produced while replaying the journal and is
/// consumed by the store's self-healing reset.
#[derive(Error, Debug)]
pub enum CacheStoreError {
    /// Filesystem failure
    #[error("Cache store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Journal or blob files are unreadable or disagree with each other
    #[error("Cache store is corrupt: {reason}")]
    Corrupt { reason: String },

    /// A single blob larger than the whole store
    #[error("Blob of {size} bytes exceeds cache capacity of {capacity} bytes")]
    BlobTooLarge { size: u64, capacity: u64 },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl FaviconError {
    /// Whether the failure happened while resolving the index page
    pub fn is_resolve_failure(&self) -> bool {
        matches!(self, Self::ResolveFailed { .. })
    }

    /// Whether the failure happened while fetching or decoding the icon
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::FetchFailed { .. })
    }
}

impl ResolveError {
    pub fn invalid_site<S: Into<String>, R: Into<String>>(site: S, reason: R) -> Self {
        Self::InvalidSite {
            site: site.into(),
            reason: reason.into(),
        }
    }
}

impl HttpError {
    /// Convert a reqwest error, keeping credentials out of the message
    pub fn from_reqwest(url: &str, error: &reqwest::Error) -> Self {
        let url = crate::utils::url::UrlUtils::obfuscate_credentials(url);
        if error.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Request {
                message: crate::utils::url::UrlUtils::obfuscate_credentials(&error.to_string()),
                url,
            }
        }
    }
}

impl CacheStoreError {
    pub fn corrupt<S: Into<String>>(reason: S) -> Self {
        Self::Corrupt {
            reason: reason.into(),
        }
    }
}
