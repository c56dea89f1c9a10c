//! Shared fixtures for the integration tests
#![allow(dead_code)]

use favicon_cache::config::Config;
use favicon_cache::services::FaviconService;
use favicon_cache::utils::http_client::{HttpResponse, StaticHttpClient};
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// Edge length the test pipelines scale icons to
pub const TARGET_PX: u32 = 24;

pub fn encoded_image(width: u32, height: u32, color: [u8; 4], format: ImageFormat) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

pub fn png_response(width: u32, height: u32, color: [u8; 4]) -> HttpResponse {
    HttpResponse::new(
        200,
        Some("image/png"),
        encoded_image(width, height, color, ImageFormat::Png),
    )
}

pub fn ico_response(size: u32, color: [u8; 4]) -> HttpResponse {
    HttpResponse::new(
        200,
        Some("image/x-icon"),
        encoded_image(size, size, color, ImageFormat::Ico),
    )
}

pub fn html_response(head: &str) -> HttpResponse {
    HttpResponse::new(
        200,
        Some("text/html; charset=utf-8"),
        format!("<!DOCTYPE html><html><head>{head}</head><body></body></html>"),
    )
}

/// Configuration rooted in `directory` producing `TARGET_PX` icons
pub fn test_config(directory: &Path, capacity_bytes: u64) -> Config {
    let mut config = Config::default();
    config.cache.directory = directory.to_path_buf();
    config.cache.capacity_bytes = capacity_bytes;
    config.icons.logical_size_dip = TARGET_PX as f32;
    config.icons.display_density = 1.0;
    config
}

pub async fn service(
    directory: &Path,
    capacity_bytes: u64,
    client: Arc<StaticHttpClient>,
) -> FaviconService {
    FaviconService::from_config_with_http(&test_config(directory, capacity_bytes), client)
        .await
        .unwrap()
}
