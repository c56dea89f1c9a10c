/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Cache store defaults
pub const DEFAULT_CACHE_DIRECTORY: &str = "./data/favicons";
pub const DEFAULT_CACHE_CAPACITY_BYTES: u64 = 512_000_000;

// Icon presentation defaults
pub const DEFAULT_LOGICAL_SIZE_DIP: f32 = 96.0;
pub const DEFAULT_DISPLAY_DENSITY: f32 = 1.0;
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024; // 5MB
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 2 * 1024 * 1024; // 2MB
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 4096;

// HTTP client defaults
pub const DEFAULT_CONNECT_TIMEOUT: &str = "10s";
pub const DEFAULT_REQUEST_TIMEOUT: &str = "30s";

// Configuration loading
pub const DEFAULT_CONFIG_FILE: &str = "favicon-cache.toml";
pub const ENV_PREFIX: &str = "FAVICON_CACHE_";
