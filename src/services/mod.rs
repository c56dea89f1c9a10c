pub mod favicon_service;
pub mod icon_resolver;
pub mod image_fetcher;

pub use favicon_service::FaviconService;
pub use icon_resolver::IconResolver;
pub use image_fetcher::ImageFetcher;
