//! Key-value storage behind the weather cache.
//!
//! The `CacheBackend` trait is the seam between `WeatherCache` and wherever
//! entries physically live. Backends know nothing about TTL policy: they store
//! and return `CacheEntry` values by key and can enumerate a key prefix.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;

/// Errors raised by a cache backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache TTL must be greater than zero")]
    InvalidTtl,

    #[error("Cache timestamp out of range: {0}")]
    TimestampOutOfRange(DateTime<Utc>),
}

impl CacheError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Backend(e.to_string())
    }
}

/// A stored value plus its write-time timestamps.
///
/// Backends hand out clones; nothing outside a backend holds a reference into
/// its storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Serialized record
    pub payload: Vec<u8>,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Servable only strictly before `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Remaining lifetime, zero once expired.
    pub fn time_left_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn size_bytes(&self) -> usize {
        self.payload.len()
    }
}

/// Storage for cache entries.
///
/// Implementations must be safe for concurrent use; every method takes `&self`.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Insert or replace.
    fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;

    /// Returns whether a key was removed.
    fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove `key` only while it still holds the entry that expires at
    /// `expires_at`. The check and the removal are one atomic step, so an
    /// entry rewritten by another caller in the meantime is left alone.
    fn delete_if_expires_at(
        &self,
        key: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, CacheError>;

    /// All entries whose key starts with `prefix`.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, CacheEntry)>, CacheError>;
}

/// In-process map guarded by a read-write lock.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl CacheBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.entries.write().insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.write().remove(key).is_some())
    }

    fn delete_if_expires_at(
        &self,
        key: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, CacheError> {
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(entry) if entry.expires_at == expires_at => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, CacheEntry)>, CacheError> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn entry(payload: &[u8], ttl_secs: i64) -> CacheEntry {
        let cached_at = Utc::now();
        CacheEntry {
            payload: payload.to_vec(),
            cached_at,
            expires_at: cached_at + chrono::Duration::seconds(ttl_secs),
        }
    }

    #[test]
    fn test_expiry_is_exclusive_of_deadline() {
        let e = entry(b"{}", 60);
        assert!(!e.is_expired_at(e.expires_at - chrono::Duration::nanoseconds(1)));
        assert!(e.is_expired_at(e.expires_at));
        assert!(e.is_expired_at(e.expires_at + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_time_left_saturates_at_zero() {
        let e = entry(b"{}", 60);
        assert_eq!(e.time_left_at(e.cached_at), Duration::from_secs(60));
        assert_eq!(
            e.time_left_at(e.expires_at + chrono::Duration::seconds(5)),
            Duration::ZERO
        );
    }

    #[test]
    fn test_memory_set_get_delete() {
        let backend = MemoryBackend::new();
        let e = entry(b"payload", 60);

        backend.set("a", e.clone()).unwrap();
        assert_eq!(backend.get("a").unwrap(), Some(e));
        assert!(backend.delete("a").unwrap());
        assert!(!backend.delete("a").unwrap());
        assert!(backend.get("a").unwrap().is_none());
    }

    #[test]
    fn test_memory_conditional_delete_spares_rewritten_entry() {
        let backend = MemoryBackend::new();
        let stale = entry(b"stale", 60);
        let fresh = entry(b"fresh", 900);
        backend.set("a", fresh.clone()).unwrap();

        assert!(!backend.delete_if_expires_at("a", stale.expires_at).unwrap());
        assert_eq!(backend.get("a").unwrap(), Some(fresh.clone()));

        assert!(backend.delete_if_expires_at("a", fresh.expires_at).unwrap());
        assert!(backend.is_empty());
        assert!(!backend.delete_if_expires_at("a", fresh.expires_at).unwrap());
    }

    #[test]
    fn test_memory_returns_copies() {
        let backend = MemoryBackend::new();
        backend.set("a", entry(b"original", 60)).unwrap();

        let mut copy = backend.get("a").unwrap().unwrap();
        copy.payload.clear();

        assert_eq!(backend.get("a").unwrap().unwrap().payload, b"original");
    }

    #[test]
    fn test_memory_scan_prefix() {
        let backend = MemoryBackend::new();
        backend.set("weather_block_a", entry(b"1", 60)).unwrap();
        backend.set("weather_block_b", entry(b"2", 60)).unwrap();
        backend.set("other_c", entry(b"3", 60)).unwrap();

        let mut keys: Vec<String> = backend
            .scan_prefix("weather_block_")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        keys.sort();

        assert_eq!(keys, vec!["weather_block_a", "weather_block_b"]);
        assert_eq!(backend.len(), 3);
    }
}
