use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};

pub mod defaults;
pub mod duration_serde;

use defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub icons: IconConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// On-disk icon cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory dedicated to the cache; nothing else should live here
    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,
    /// Upper bound on the total size of stored blobs
    #[serde(default = "default_capacity_bytes")]
    pub capacity_bytes: u64,
}

/// Icon presentation and download limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IconConfig {
    /// Logical icon edge length in density-independent pixels
    #[serde(default = "default_logical_size_dip")]
    pub logical_size_dip: f32,
    /// Device pixels per density-independent pixel
    #[serde(default = "default_display_density")]
    pub display_density: f32,
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
    /// Icons declaring a wider or taller raster are rejected before decoding
    #[serde(default = "default_max_image_dimension")]
    pub max_image_dimension: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(
        default = "default_connect_timeout",
        with = "duration_serde::duration"
    )]
    pub connect_timeout: Duration,
    #[serde(
        default = "default_request_timeout",
        with = "duration_serde::duration"
    )]
    pub request_timeout: Duration,
}

fn default_cache_directory() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIRECTORY)
}

fn default_capacity_bytes() -> u64 {
    DEFAULT_CACHE_CAPACITY_BYTES
}

fn default_logical_size_dip() -> f32 {
    DEFAULT_LOGICAL_SIZE_DIP
}

fn default_display_density() -> f32 {
    DEFAULT_DISPLAY_DENSITY
}

fn default_max_image_bytes() -> usize {
    DEFAULT_MAX_IMAGE_BYTES
}

fn default_max_document_bytes() -> usize {
    DEFAULT_MAX_DOCUMENT_BYTES
}

fn default_max_image_dimension() -> u32 {
    DEFAULT_MAX_IMAGE_DIMENSION
}

fn default_connect_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_CONNECT_TIMEOUT).unwrap_or(Duration::from_secs(10))
}

fn default_request_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_REQUEST_TIMEOUT).unwrap_or(Duration::from_secs(30))
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
            capacity_bytes: default_capacity_bytes(),
        }
    }
}

impl Default for IconConfig {
    fn default() -> Self {
        Self {
            logical_size_dip: default_logical_size_dip(),
            display_density: default_display_density(),
            max_image_bytes: default_max_image_bytes(),
            max_document_bytes: default_max_document_bytes(),
            max_image_dimension: default_max_image_dimension(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and the environment
    ///
    /// Later layers win: built-in defaults, then `path` if it exists, then
    /// `FAVICON_CACHE_*` variables with `__` separating nested keys (for
    /// example `FAVICON_CACHE_CACHE__CAPACITY_BYTES=1000000`).
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        match path {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
            Some(path) => debug!("No config file found at {}", path.display()),
            None => {}
        }

        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| AppError::configuration(e.to_string()))
    }

    /// Load configuration from a TOML file, writing the defaults there if it is missing
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if Path::new(config_file).exists() {
            let contents = std::fs::read_to_string(config_file)
                .with_context(|| format!("failed to read {config_file}"))?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }

    /// Icon edge length in device pixels
    pub fn target_pixels(&self) -> u32 {
        crate::services::image_fetcher::target_pixels(
            self.icons.logical_size_dip,
            self.icons.display_density,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache.directory, PathBuf::from("./data/favicons"));
        assert_eq!(config.cache.capacity_bytes, 512_000_000);
        assert_eq!(config.icons.logical_size_dip, 96.0);
        assert_eq!(config.http.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.http.request_timeout, Duration::from_secs(30));
        assert_eq!(config.target_pixels(), 96);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [cache]
            capacity_bytes = 1024

            [http]
            request_timeout = "5s"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.capacity_bytes, 1024);
        assert_eq!(config.cache.directory, PathBuf::from("./data/favicons"));
        assert_eq!(config.http.request_timeout, Duration::from_secs(5));
        assert_eq!(config.http.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.icons.max_image_bytes, 5 * 1024 * 1024);
        assert_eq!(config.icons.max_image_dimension, 4096);
    }

    #[test]
    fn test_load_layers_file_over_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("favicon-cache.toml");
        std::fs::write(
            &path,
            r#"
            [icons]
            display_density = 2.0
            "#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.icons.display_density, 2.0);
        assert_eq!(config.target_pixels(), 192);
        assert_eq!(config.cache.capacity_bytes, 512_000_000);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(Some(&dir.path().join("missing.toml"))).unwrap();
        assert_eq!(config.icons.logical_size_dip, 96.0);
    }

    #[test]
    fn test_load_rejects_mistyped_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("favicon-cache.toml");
        std::fs::write(
            &path,
            r#"
            [cache]
            capacity_bytes = "plenty"
            "#,
        )
        .unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
        assert!(err.to_string().starts_with("Configuration error"), "{err}");
    }

    #[test]
    fn test_load_from_file_writes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let path_str = path.to_str().unwrap();

        let created = Config::load_from_file(path_str).unwrap();
        assert!(path.exists());

        let reloaded = Config::load_from_file(path_str).unwrap();
        assert_eq!(reloaded.cache.capacity_bytes, created.cache.capacity_bytes);
        assert_eq!(reloaded.http.connect_timeout, created.http.connect_timeout);
    }
}
