use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

use crate::errors::HttpError;
use crate::utils::url::UrlUtils;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("favicon-cache/", env!("CARGO_PKG_VERSION"));

/// A fully buffered GET response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
    /// The server sent more than the requested byte limit; `body` holds the prefix
    pub truncated: bool,
}

impl HttpResponse {
    pub fn new(status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: body.into(),
            truncated: false,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[cfg(any(test, feature = "test-util"))]
    fn limited(mut self, limit: usize) -> Self {
        if self.body.len() > limit {
            self.body.truncate(limit);
            self.truncated = true;
        }
        self
    }
}

/// Plain GET access used by the resolver and the image fetcher
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch `url`, buffering at most `limit` bytes of body
    async fn get(&self, url: &str, limit: usize) -> Result<HttpResponse, HttpError>;
}

/// Default implementation of HttpClient using reqwest
pub struct StandardHttpClient {
    client: Client,
}

impl StandardHttpClient {
    /// Create new HTTP client with connection and total request timeouts
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(HttpError::Build)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for StandardHttpClient {
    async fn get(&self, url: &str, limit: usize) -> Result<HttpResponse, HttpError> {
        debug!("Fetching {}", UrlUtils::obfuscate_credentials(url));

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| HttpError::from_reqwest(url, &e))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = BytesMut::new();
        let mut truncated = false;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| HttpError::from_reqwest(url, &e))?
        {
            let remaining = limit.saturating_sub(body.len());
            if chunk.len() > remaining {
                body.extend_from_slice(&chunk[..remaining]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }

        debug!(
            "Fetched {} bytes (status {}, truncated: {}) from {}",
            body.len(),
            status,
            truncated,
            UrlUtils::obfuscate_credentials(url)
        );

        Ok(HttpResponse {
            status,
            content_type,
            body: body.freeze(),
            truncated,
        })
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use static_client::StaticHttpClient;

#[cfg(any(test, feature = "test-util"))]
mod static_client {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum StaticRoute {
        Respond(HttpResponse),
        Timeout,
    }

    /// In-memory HttpClient serving canned responses
    ///
    /// Unknown URLs answer `404` with an empty body. Every request is recorded.
    #[derive(Default)]
    pub struct StaticHttpClient {
        routes: Mutex<HashMap<String, StaticRoute>>,
        requests: Mutex<Vec<String>>,
    }

    impl StaticHttpClient {
        pub fn new() -> Self {
            Self::default()
        }

        /// Serve `response` for `url`, replacing any earlier route
        pub fn respond(&self, url: &str, response: HttpResponse) {
            if let Ok(mut routes) = self.routes.lock() {
                routes.insert(url.to_string(), StaticRoute::Respond(response));
            }
        }

        /// Make requests for `url` fail with a timeout
        pub fn time_out(&self, url: &str) {
            if let Ok(mut routes) = self.routes.lock() {
                routes.insert(url.to_string(), StaticRoute::Timeout);
            }
        }

        /// URLs requested so far, in order
        pub fn requests(&self) -> Vec<String> {
            self.requests
                .lock()
                .map(|r| r.clone())
                .unwrap_or_default()
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().map(|r| r.len()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl HttpClient for StaticHttpClient {
        async fn get(&self, url: &str, limit: usize) -> Result<HttpResponse, HttpError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(url.to_string());
            }

            let routes = self.routes.lock().map_err(|_| HttpError::Request {
                url: url.to_string(),
                message: "route table poisoned".to_string(),
            })?;

            match routes.get(url) {
                Some(StaticRoute::Respond(response)) => Ok(response.clone().limited(limit)),
                Some(StaticRoute::Timeout) => Err(HttpError::Timeout {
                    url: url.to_string(),
                }),
                None => Ok(HttpResponse::new(404, None, Bytes::new())),
            }
        }
    }
}
