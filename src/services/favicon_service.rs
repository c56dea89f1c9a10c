use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache_store::{CacheStats, CacheStore};
use crate::config::Config;
use crate::errors::{AppResult, FaviconError, FaviconResult, StoreResult};
use crate::models::{Fingerprint, ScaledImage};
use crate::services::icon_resolver::IconResolver;
use crate::services::image_fetcher::{self, ImageFetcher};
use crate::utils::http_client::{HttpClient, StandardHttpClient};
use crate::utils::url::UrlUtils;

/// Outcome of a lookup before any write-back
enum Lookup {
    Cached(ScaledImage),
    Fetched { key: Fingerprint, image: ScaledImage },
}

/// Site icon lookups with a fast path through the disk cache
///
/// Cloning is cheap; clones share the same cache and HTTP client.
/// Concurrent lookups for the same site are not coalesced: each may hit
/// the network and the last cache write wins.
#[derive(Clone)]
pub struct FaviconService {
    store: Arc<CacheStore>,
    resolver: IconResolver,
    fetcher: ImageFetcher,
}

impl FaviconService {
    pub fn new(store: Arc<CacheStore>, resolver: IconResolver, fetcher: ImageFetcher) -> Self {
        Self {
            store,
            resolver,
            fetcher,
        }
    }

    /// Build the full pipeline from configuration
    pub async fn from_config(config: &Config) -> AppResult<Self> {
        let http: Arc<dyn HttpClient> = Arc::new(StandardHttpClient::new(
            config.http.connect_timeout,
            config.http.request_timeout,
        )?);
        Self::from_config_with_http(config, http).await
    }

    /// Build the pipeline from configuration around an existing HTTP client
    pub async fn from_config_with_http(
        config: &Config,
        http: Arc<dyn HttpClient>,
    ) -> AppResult<Self> {
        let store = CacheStore::open(&config.cache.directory, config.cache.capacity_bytes).await?;

        Ok(Self::new(
            Arc::new(store),
            IconResolver::new(http.clone(), config.icons.max_document_bytes),
            ImageFetcher::new(http, config.target_pixels(), config.icons.max_image_bytes)
                .with_max_dimension(config.icons.max_image_dimension),
        ))
    }

    /// Look up the icon for `site` on a background task
    ///
    /// `on_success` runs with the cached image, or with a freshly fetched
    /// one before it is written to the cache. `on_error` runs when the
    /// index page or the icon could not be retrieved; nothing is cached
    /// then. The handle completes after the cache write.
    pub fn load<S, E>(&self, site: &str, on_success: S, on_error: E) -> JoinHandle<()>
    where
        S: FnOnce(ScaledImage) + Send + 'static,
        E: FnOnce(FaviconError) + Send + 'static,
    {
        let service = self.clone();
        let site = site.to_string();

        tokio::spawn(async move {
            match service.lookup(&site).await {
                Ok(Lookup::Cached(image)) => on_success(image),
                Ok(Lookup::Fetched { key, image }) => {
                    on_success(image.clone());
                    service.persist(&key, &image).await;
                }
                Err(e) => {
                    debug!("Icon lookup for '{}' failed: {}", site, e);
                    on_error(e);
                }
            }
        })
    }

    /// Deliver the cached icon for `site` on a background task, if there is one
    ///
    /// Never touches the network; a miss is silent.
    pub fn peek<S>(&self, site: &str, on_success: S) -> JoinHandle<()>
    where
        S: FnOnce(ScaledImage) + Send + 'static,
    {
        let service = self.clone();
        let site = site.to_string();

        tokio::spawn(async move {
            if let Some(image) = service.cached_icon(&site).await {
                on_success(image);
            }
        })
    }

    /// Awaitable form of [`load`](Self::load); returns after the cache write
    pub async fn fetch_icon(&self, site: &str) -> FaviconResult<ScaledImage> {
        match self.lookup(site).await? {
            Lookup::Cached(image) => Ok(image),
            Lookup::Fetched { key, image } => {
                self.persist(&key, &image).await;
                Ok(image)
            }
        }
    }

    /// Awaitable form of [`peek`](Self::peek)
    pub async fn cached_icon(&self, site: &str) -> Option<ScaledImage> {
        self.read_cached(&Fingerprint::of_site(site)).await
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.stats().await
    }

    pub async fn clear(&self) -> StoreResult<()> {
        self.store.clear().await
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    async fn lookup(&self, site: &str) -> FaviconResult<Lookup> {
        let normalized = UrlUtils::normalize_site(site);
        let key = Fingerprint::of_normalized(&normalized);

        if let Some(image) = self.read_cached(&key).await {
            debug!("Icon cache hit for {}", UrlUtils::obfuscate_credentials(&normalized));
            return Ok(Lookup::Cached(image));
        }
        debug!("Icon cache miss for {}", UrlUtils::obfuscate_credentials(&normalized));

        let resolved = self.resolver.resolve(&normalized).await.map_err(|source| {
            FaviconError::ResolveFailed {
                site: UrlUtils::obfuscate_credentials(&normalized),
                source,
            }
        })?;

        let image = self
            .fetcher
            .fetch(resolved.as_str())
            .await
            .map_err(|source| FaviconError::FetchFailed {
                url: UrlUtils::obfuscate_credentials(resolved.as_str()),
                source,
            })?;

        Ok(Lookup::Fetched { key, image })
    }

    /// Decode a cached entry; anything unusable is dropped and reported as a miss
    async fn read_cached(&self, key: &Fingerprint) -> Option<ScaledImage> {
        let blob = self.store.get(key).await?;

        let decoded = tokio::task::spawn_blocking(move || {
            let image = image_fetcher::decode_png(&blob);
            (blob, image)
        })
        .await;
        let target = self.fetcher.target_px();

        // A concurrent write may have replaced the entry since it was read.
        match decoded {
            Ok((_, Ok(image))) if image.dimensions() == (target, target) => Some(image),
            Ok((blob, Ok(image))) => {
                debug!(
                    "Cached icon {} is {}x{}, expected {}px; refetching",
                    key,
                    image.width(),
                    image.height(),
                    target
                );
                self.store.remove_if_matches(key, &blob).await;
                None
            }
            Ok((blob, Err(e))) => {
                warn!("Cached icon {} is undecodable, dropping it: {}", key, e);
                self.store.remove_if_matches(key, &blob).await;
                None
            }
            Err(e) => {
                warn!("Decoding cached icon {} failed: {}", key, e);
                None
            }
        }
    }

    /// Write an icon back to the cache; failures are logged, never surfaced
    async fn persist(&self, key: &Fingerprint, image: &ScaledImage) {
        let image = image.clone();
        let png = match tokio::task::spawn_blocking(move || image_fetcher::encode_png(&image)).await
        {
            Ok(Ok(png)) => png,
            Ok(Err(e)) => {
                warn!("Failed to encode icon {} for caching: {}", key, e);
                return;
            }
            Err(e) => {
                warn!("Icon encoder task for {} failed: {}", key, e);
                return;
            }
        };

        match self.store.put(key, &png).await {
            Ok(()) => debug!("Cached icon under {}", key),
            Err(e) => warn!("Failed to cache icon {}: {}", key, e),
        }
    }
}
