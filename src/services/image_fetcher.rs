use image::imageops::FilterType;
use image::{ImageFormat, ImageReader, Limits};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::config::defaults::DEFAULT_MAX_IMAGE_DIMENSION;
use crate::errors::FetchError;
use crate::models::ScaledImage;
use crate::utils::http_client::HttpClient;
use crate::utils::url::UrlUtils;

/// Convert a logical edge length to device pixels, never returning 0
pub fn target_pixels(logical_size_dip: f32, display_density: f32) -> u32 {
    let pixels = (logical_size_dip * display_density).round();
    if pixels.is_finite() && pixels >= 1.0 {
        pixels as u32
    } else {
        1
    }
}

/// Smallest decoder allocation budget, leaving room for decoder bookkeeping
const MIN_DECODE_ALLOC: u64 = 16 * 1024 * 1024;

/// Decoder limits for untrusted icons no wider or taller than `max_dimension`
///
/// The allocation budget covers one 16-bit RGBA frame of the largest
/// accepted size.
pub fn decode_limits(max_dimension: u32) -> Limits {
    let max_dimension = max_dimension.max(1);
    let mut limits = Limits::default();
    limits.max_image_width = Some(max_dimension);
    limits.max_image_height = Some(max_dimension);
    limits.max_alloc = Some((u64::from(max_dimension).pow(2) * 8).max(MIN_DECODE_ALLOC));
    limits
}

/// Decode any supported raster format and stretch it to `target × target`
///
/// Images declaring more than `max_dimension` pixels on either edge fail
/// with a limits error before their pixels are allocated.
pub fn decode_and_scale(
    bytes: &[u8],
    target: u32,
    max_dimension: u32,
) -> Result<ScaledImage, FetchError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| FetchError::Decode(image::ImageError::IoError(e)))?;
    reader.limits(decode_limits(max_dimension));
    let image = reader.decode()?;

    if image.width() == target && image.height() == target {
        return Ok(image.into_rgba8());
    }
    Ok(image
        .resize_exact(target, target, FilterType::Lanczos3)
        .into_rgba8())
}

/// Lossless encoding used for cached blobs
pub fn encode_png(image: &ScaledImage) -> Result<Vec<u8>, image::ImageError> {
    let mut png_bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)?;
    Ok(png_bytes)
}

/// Decode a cached blob written by [`encode_png`]
pub fn decode_png(bytes: &[u8]) -> Result<ScaledImage, image::ImageError> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.into_rgba8())
}

/// Downloads icon images and normalizes them to a fixed square size
#[derive(Clone)]
pub struct ImageFetcher {
    http: Arc<dyn HttpClient>,
    target_px: u32,
    max_image_bytes: usize,
    max_dimension: u32,
}

impl ImageFetcher {
    pub fn new(http: Arc<dyn HttpClient>, target_px: u32, max_image_bytes: usize) -> Self {
        Self {
            http,
            target_px: target_px.max(1),
            max_image_bytes,
            max_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
        }
    }

    /// Reject icons wider or taller than `max_dimension` pixels
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension.max(1);
        self
    }

    pub fn target_px(&self) -> u32 {
        self.target_px
    }

    /// Download `url` and return it scaled to the target size
    pub async fn fetch(&self, url: &str) -> Result<ScaledImage, FetchError> {
        let parsed = Url::parse(url)?;
        let response = self.http.get(parsed.as_str(), self.max_image_bytes).await?;

        if !response.is_success() {
            return Err(FetchError::Status {
                status: response.status,
            });
        }
        if response.truncated {
            return Err(FetchError::TooLarge {
                limit: self.max_image_bytes,
            });
        }

        debug!(
            "Decoding {} byte icon from {}",
            response.body.len(),
            UrlUtils::obfuscate_credentials(url)
        );

        let (target, max_dimension) = (self.target_px, self.max_dimension);
        let body = response.body;
        tokio::task::spawn_blocking(move || decode_and_scale(&body, target, max_dimension))
            .await
            .map_err(|e| FetchError::Worker {
                message: e.to_string(),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::http_client::{HttpResponse, StaticHttpClient};
    use image::{GrayImage, Rgba, RgbaImage};
    use rstest::rstest;

    fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 255]));
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
        bytes
    }

    fn fetcher(client: Arc<StaticHttpClient>, target: u32) -> ImageFetcher {
        ImageFetcher::new(client, target, 1024 * 1024)
    }

    #[rstest]
    #[case(96.0, 1.0, 96)]
    #[case(96.0, 2.0, 192)]
    #[case(96.0, 1.5, 144)]
    #[case(48.0, 2.625, 126)]
    #[case(0.1, 1.0, 1)]
    #[case(0.0, 3.0, 1)]
    #[case(-5.0, 1.0, 1)]
    #[case(f32::NAN, 1.0, 1)]
    fn test_target_pixels(#[case] dip: f32, #[case] density: f32, #[case] expected: u32) {
        assert_eq!(target_pixels(dip, density), expected);
    }

    #[rstest]
    #[case(ImageFormat::Png, 16, 16)]
    #[case(ImageFormat::Png, 300, 120)]
    #[case(ImageFormat::Ico, 32, 32)]
    #[case(ImageFormat::Bmp, 10, 40)]
    #[case(ImageFormat::Gif, 64, 64)]
    fn test_decode_and_scale_stretches_to_target(
        #[case] format: ImageFormat,
        #[case] width: u32,
        #[case] height: u32,
    ) {
        let scaled = decode_and_scale(&encoded(width, height, format), 48, 4096).unwrap();
        assert_eq!(scaled.dimensions(), (48, 48));
    }

    #[test]
    fn test_decode_rejects_non_image() {
        let result = decode_and_scale(b"<html>not an icon</html>", 48, 4096);
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_oversized_dimensions() {
        // Compresses to a few KiB but declares far more pixels than allowed.
        let wide = GrayImage::new(5000, 64);
        let mut bytes = Vec::new();
        wide.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        assert!(bytes.len() < 64 * 1024);

        let result = decode_and_scale(&bytes, 48, 4096);
        assert!(
            matches!(result, Err(FetchError::Decode(image::ImageError::Limits(_)))),
            "{result:?}"
        );
    }

    #[test]
    fn test_decode_limits_budget() {
        let limits = decode_limits(4096);
        assert_eq!(limits.max_image_width, Some(4096));
        assert_eq!(limits.max_alloc, Some(4096 * 4096 * 8));
        assert_eq!(decode_limits(0).max_image_height, Some(1));
        assert_eq!(decode_limits(32).max_alloc, Some(MIN_DECODE_ALLOC));
    }

    #[rstest]
    #[case(64, 64, 32, false)]
    #[case(32, 32, 32, true)]
    #[case(16, 40, 32, false)]
    fn test_decode_honours_max_dimension(
        #[case] width: u32,
        #[case] height: u32,
        #[case] max_dimension: u32,
        #[case] accepted: bool,
    ) {
        let result = decode_and_scale(&encoded(width, height, ImageFormat::Png), 48, max_dimension);
        assert_eq!(result.is_ok(), accepted);
    }

    #[test]
    fn test_png_round_trip_is_lossless() {
        let scaled = decode_and_scale(&encoded(20, 10, ImageFormat::Png), 32, 4096).unwrap();
        let decoded = decode_png(&encode_png(&scaled).unwrap()).unwrap();
        assert_eq!(decoded, scaled);
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let client = Arc::new(StaticHttpClient::new());
        client.respond(
            "https://example.com/favicon.ico",
            HttpResponse::new(200, Some("image/x-icon"), encoded(16, 16, ImageFormat::Ico)),
        );

        let image = fetcher(client, 96)
            .fetch("https://example.com/favicon.ico")
            .await
            .unwrap();
        assert_eq!(image.dimensions(), (96, 96));
    }

    #[tokio::test]
    async fn test_fetch_status_failure() {
        let client = Arc::new(StaticHttpClient::new());
        let result = fetcher(client, 96)
            .fetch("https://example.com/missing.png")
            .await;
        assert!(matches!(result, Err(FetchError::Status { status: 404 })));
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_body() {
        let client = Arc::new(StaticHttpClient::new());
        client.respond(
            "https://example.com/huge.png",
            HttpResponse::new(200, Some("image/png"), vec![0u8; 2048]),
        );

        let result = ImageFetcher::new(client, 96, 1024)
            .fetch("https://example.com/huge.png")
            .await;
        assert!(matches!(result, Err(FetchError::TooLarge { limit: 1024 })));
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_dimensions() {
        let client = Arc::new(StaticHttpClient::new());
        client.respond(
            "https://example.com/banner.png",
            HttpResponse::new(200, Some("image/png"), encoded(256, 16, ImageFormat::Png)),
        );

        let result = fetcher(client, 96)
            .with_max_dimension(128)
            .fetch("https://example.com/banner.png")
            .await;
        assert!(matches!(result, Err(FetchError::Decode(_))));
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let client = Arc::new(StaticHttpClient::new());
        let result = fetcher(client.clone(), 96).fetch("not a url").await;
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_timeout_surfaces_http_error() {
        let client = Arc::new(StaticHttpClient::new());
        client.time_out("https://slow.example.com/icon.png");
        let result = fetcher(client, 96)
            .fetch("https://slow.example.com/icon.png")
            .await;
        assert!(matches!(result, Err(FetchError::Http(_))));
    }
}
