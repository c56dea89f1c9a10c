pub mod http_client;
pub mod url;

pub use http_client::{HttpClient, HttpResponse, StandardHttpClient};
#[cfg(any(test, feature = "test-util"))]
pub use http_client::StaticHttpClient;
pub use url::UrlUtils;
