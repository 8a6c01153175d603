//! Namespaced TTL cache for weather records.
//!
//! `WeatherCache` layers expiry policy over a `CacheBackend`: every key is
//! prefixed with [`CACHE_PREFIX`], every write records absolute `cached_at` /
//! `expires_at` timestamps, and reads drop entries whose deadline has passed.
//! There is no capacity-based eviction; entries leave by expiry, explicit
//! delete, `clear_all`, or `cleanup_expired`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};

use crate::backend::{CacheBackend, CacheEntry, CacheError};
use crate::clock::Clock;
use crate::types::{CacheStats, EntryInfo, Units, WeatherRecord};

/// Prefix that scopes this service's keys inside a shared backend.
pub const CACHE_PREFIX: &str = "weather_block_";

/// TTL for current conditions (15 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Ceiling applied to any requested TTL (24 hours).
pub const MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Kinds of data with different freshness needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    CurrentWeather,
    Forecast,
    LocationSearch,
}

impl CacheKind {
    pub fn ttl(&self) -> Duration {
        match self {
            Self::CurrentWeather => DEFAULT_TTL,
            Self::Forecast => Duration::from_secs(3 * 60 * 60),
            Self::LocationSearch => MAX_TTL,
        }
    }
}

/// Derive the cache key for a (location, units) pair.
///
/// The location is trimmed and lower-cased first, so `"London,UK"` and
/// `" london,uk "` share an entry.
pub fn cache_key(location: &str, units: Units) -> String {
    let normalized = location.trim().to_lowercase();
    let mut hasher = Md5::new();
    hasher.update(normalized.as_bytes());
    hasher.update(b"|");
    hasher.update(units.as_str().as_bytes());
    format!("weather_{:x}", hasher.finalize())
}

/// A record read back from the cache with its timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub record: WeatherRecord,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub time_left: Duration,
}

/// TTL-aware view over a cache backend.
#[derive(Clone)]
pub struct WeatherCache {
    backend: Arc<dyn CacheBackend>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for WeatherCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherCache")
            .field("prefix", &CACHE_PREFIX)
            .finish_non_exhaustive()
    }
}

impl WeatherCache {
    pub fn new(backend: Arc<dyn CacheBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Map a caller key onto the namespaced backend key.
    fn namespaced(key: &str) -> String {
        let sanitized: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        format!("{}{}", CACHE_PREFIX, sanitized)
    }

    /// Store a record with the default TTL.
    pub fn set(&self, key: &str, record: &WeatherRecord) -> Result<CacheEntry, CacheError> {
        self.set_with_ttl(key, record, DEFAULT_TTL)
    }

    /// Store a record with the TTL for its kind of data.
    pub fn set_for_kind(
        &self,
        key: &str,
        record: &WeatherRecord,
        kind: CacheKind,
    ) -> Result<CacheEntry, CacheError> {
        self.set_with_ttl(key, record, kind.ttl())
    }

    /// Store a record, capping `ttl` at [`MAX_TTL`].
    ///
    /// Returns the entry as written.
    pub fn set_with_ttl(
        &self,
        key: &str,
        record: &WeatherRecord,
        ttl: Duration,
    ) -> Result<CacheEntry, CacheError> {
        if ttl.is_zero() {
            return Err(CacheError::InvalidTtl);
        }
        let ttl = ttl.min(MAX_TTL);
        let ttl = chrono::Duration::from_std(ttl).map_err(|_| CacheError::InvalidTtl)?;

        let cached_at = self.clock.now();
        let entry = CacheEntry {
            payload: serde_json::to_vec(record)?,
            cached_at,
            expires_at: cached_at + ttl,
        };

        self.backend.set(&Self::namespaced(key), entry.clone())?;
        tracing::debug!(key, expires_at = %entry.expires_at, "Cached weather record");
        Ok(entry)
    }

    /// Read a live record. Expired or unreadable entries are deleted and
    /// reported as absent.
    ///
    /// Deletion is conditional on the entry still being the one that was
    /// read, so a concurrent write of a fresh record is never evicted.
    pub fn get(&self, key: &str) -> Result<Option<CacheHit>, CacheError> {
        let ns_key = Self::namespaced(key);
        let Some(entry) = self.backend.get(&ns_key)? else {
            return Ok(None);
        };

        let now = self.clock.now();
        if entry.is_expired_at(now) {
            tracing::debug!(key, "Evicting expired cache entry");
            self.backend.delete_if_expires_at(&ns_key, entry.expires_at)?;
            return Ok(None);
        }

        match serde_json::from_slice::<WeatherRecord>(&entry.payload) {
            Ok(record) => Ok(Some(CacheHit {
                record,
                cached_at: entry.cached_at,
                expires_at: entry.expires_at,
                time_left: entry.time_left_at(now),
            })),
            Err(e) => {
                tracing::warn!(key, "Dropping unreadable cache entry: {}", e);
                self.backend.delete_if_expires_at(&ns_key, entry.expires_at)?;
                Ok(None)
            }
        }
    }

    pub fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get(key)?.is_some())
    }

    pub fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.backend.delete(&Self::namespaced(key))
    }

    /// Remove every entry under the namespace. Returns the number removed.
    pub fn clear_all(&self) -> Result<usize, CacheError> {
        let mut cleared = 0;
        for (key, _) in self.backend.scan_prefix(CACHE_PREFIX)? {
            if self.backend.delete(&key)? {
                cleared += 1;
            }
        }
        tracing::info!("Cleared {} weather cache entries", cleared);
        Ok(cleared)
    }

    /// Count and serialized size of live entries. Expired entries still
    /// waiting for eviction are not included.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let now = self.clock.now();
        let (count, total_size_bytes) = self
            .backend
            .scan_prefix(CACHE_PREFIX)?
            .iter()
            .filter(|(_, e)| !e.is_expired_at(now))
            .fold((0, 0), |(count, size), (_, e)| (count + 1, size + e.size_bytes()));
        Ok(CacheStats {
            count,
            total_size_bytes,
        })
    }

    /// Metadata for one key, without touching upstream or evicting.
    pub fn info(&self, key: &str) -> Result<Option<EntryInfo>, CacheError> {
        let now = self.clock.now();
        Ok(self
            .backend
            .get(&Self::namespaced(key))?
            .map(|entry| EntryInfo {
                cached_at: entry.cached_at,
                expires_at: entry.expires_at,
                time_left: entry.time_left_at(now),
                is_expired: entry.is_expired_at(now),
                size_bytes: entry.size_bytes(),
            }))
    }

    /// Delete entries past their deadline that were never re-read.
    pub fn cleanup_expired(&self) -> Result<usize, CacheError> {
        let now = self.clock.now();
        let mut cleaned = 0;
        for (key, entry) in self.backend.scan_prefix(CACHE_PREFIX)? {
            if entry.is_expired_at(now)
                && self.backend.delete_if_expires_at(&key, entry.expires_at)?
            {
                cleaned += 1;
            }
        }
        if cleaned > 0 {
            tracing::info!("Cleaned up {} expired weather cache entries", cleaned);
        }
        Ok(cleaned)
    }
}
