//! Cache-fronted weather lookups.
//!
//! `WeatherService` is the only entry point front ends should use. It never
//! caches failures and does not coalesce concurrent misses: two callers
//! missing the same key at once both go upstream, and the last write wins.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::backend::{CacheBackend, CacheError};
use crate::cache::{cache_key, WeatherCache, DEFAULT_TTL};
use crate::clock::Clock;
use crate::error::WeatherError;
use crate::provider::UpstreamClient;
use crate::types::{CacheInfo, CacheStats, EntryInfo, Units, WeatherRecord};

/// Weather lookups through a TTL cache.
///
/// Cheap to clone; clones share the same client and store.
#[derive(Debug, Clone)]
pub struct WeatherService {
    client: Option<Arc<UpstreamClient>>,
    cache: Arc<WeatherCache>,
    ttl: Duration,
}

impl WeatherService {
    /// The client stamps fetched records with `clock`, the same clock that
    /// timestamps cache entries.
    pub fn new(
        client: UpstreamClient,
        backend: Arc<dyn CacheBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let client = client.with_clock(Arc::clone(&clock));
        Self {
            client: Some(Arc::new(client)),
            cache: Arc::new(WeatherCache::new(backend, clock)),
            ttl: DEFAULT_TTL,
        }
    }

    /// Service with no upstream credentials, for cache maintenance.
    ///
    /// Fresh entries are still served; a miss in `get_weather` fails with
    /// [`WeatherError::MissingApiKey`].
    pub fn without_upstream(backend: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            client: None,
            cache: Arc::new(WeatherCache::new(backend, clock)),
            ttl: DEFAULT_TTL,
        }
    }

    /// Override the TTL used for fetched records (capped at 24 hours on write).
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cache(&self) -> &WeatherCache {
        &self.cache
    }

    fn validate_location(location: &str) -> Result<&str, WeatherError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(WeatherError::InvalidLocation);
        }
        Ok(location)
    }

    /// Run a cache operation on the blocking pool. Backends may do file I/O.
    async fn on_cache<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: FnOnce(&WeatherCache) -> Result<T, CacheError> + Send + 'static,
        T: Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || op(&cache))
            .await
            .map_err(|e| CacheError::backend(format!("cache task failed: {}", e)))?
    }

    /// Current weather for a location, from cache when fresh.
    ///
    /// Unrecognized `units` fall back to metric. Cache failures are logged and
    /// the request is served uncached.
    #[instrument(skip(self), level = "info")]
    pub async fn get_weather(
        &self,
        location: &str,
        units: &str,
    ) -> Result<(WeatherRecord, CacheInfo), WeatherError> {
        let location = Self::validate_location(location)?;
        let units = Units::parse_or_default(units);
        let key = cache_key(location, units);

        let read_key = key.clone();
        match self.on_cache(move |cache| cache.get(&read_key)).await {
            Ok(Some(hit)) => {
                tracing::debug!("Cache hit for {}", key);
                return Ok((hit.record, CacheInfo::hit(hit.cached_at, hit.time_left)));
            }
            Ok(None) => tracing::debug!("Cache miss for {}", key),
            Err(e) => tracing::warn!("Weather cache read failed, fetching uncached: {}", e),
        }

        let client = self.client.as_ref().ok_or(WeatherError::MissingApiKey)?;
        let record = client.fetch(location, units).await?;

        let (stored, ttl) = (record.clone(), self.ttl);
        if let Err(e) = self
            .on_cache(move |cache| cache.set_with_ttl(&key, &stored, ttl))
            .await
        {
            tracing::warn!("Weather cache write failed, returning uncached data: {}", e);
        }

        Ok((record, CacheInfo::miss()))
    }

    /// Remove every cached entry. Returns the number removed.
    pub fn clear_all(&self) -> Result<usize, WeatherError> {
        Ok(self.cache.clear_all()?)
    }

    pub fn stats(&self) -> Result<CacheStats, WeatherError> {
        Ok(self.cache.stats()?)
    }

    /// Cache metadata for a (location, units) pair, without fetching.
    pub fn info(&self, location: &str, units: &str) -> Result<Option<EntryInfo>, WeatherError> {
        let location = Self::validate_location(location)?;
        let key = cache_key(location, Units::parse_or_default(units));
        Ok(self.cache.info(&key)?)
    }

    /// Drop the cached entry so the next lookup goes upstream.
    pub fn refresh(&self, location: &str, units: &str) -> Result<bool, WeatherError> {
        let location = Self::validate_location(location)?;
        let key = cache_key(location, Units::parse_or_default(units));
        Ok(self.cache.delete(&key)?)
    }

    pub fn cleanup_expired(&self) -> Result<usize, WeatherError> {
        Ok(self.cache.cleanup_expired()?)
    }

    /// Periodically reclaim expired entries until `cancel` fires.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_sweeper(&self, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        let every = every.max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Weather cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = cache.cleanup_expired() {
                            tracing::warn!("Weather cache sweep failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}
