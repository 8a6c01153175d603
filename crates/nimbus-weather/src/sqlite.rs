//! SQLite-backed cache storage, so entries survive process restarts.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::backend::{CacheBackend, CacheEntry, CacheError};

/// SQLite store for cache entries.
///
/// Timestamps are kept as nanoseconds since the epoch so the expiry boundary
/// survives a round trip exactly.
///
/// Every call is synchronous file I/O behind a mutex. Async callers should run
/// it off the runtime's worker threads (`WeatherService` uses
/// `tokio::task::spawn_blocking` for this).
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open (or create) a cache database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        let backend = Self {
            conn: Mutex::new(conn),
        };
        backend.init_schema()?;
        Ok(backend)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        let backend = Self {
            conn: Mutex::new(conn),
        };
        backend.init_schema()?;
        Ok(backend)
    }

    fn init_schema(&self) -> Result<(), CacheError> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                payload BLOB NOT NULL,
                cached_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);
            "#,
        )?;
        Ok(())
    }

    fn to_nanos(ts: DateTime<Utc>) -> Result<i64, CacheError> {
        ts.timestamp_nanos_opt()
            .ok_or(CacheError::TimestampOutOfRange(ts))
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<(String, CacheEntry)> {
        let key: String = row.get(0)?;
        let cached_at: i64 = row.get(2)?;
        let expires_at: i64 = row.get(3)?;
        Ok((
            key,
            CacheEntry {
                payload: row.get(1)?,
                cached_at: Utc.timestamp_nanos(cached_at),
                expires_at: Utc.timestamp_nanos(expires_at),
            },
        ))
    }
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend").finish_non_exhaustive()
    }
}

impl CacheBackend for SqliteBackend {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let conn = self.conn.lock();
        let entry = conn
            .query_row(
                "SELECT key, payload, cached_at, expires_at FROM cache_entries WHERE key = ?1",
                params![key],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry.map(|(_, e)| e))
    }

    fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let cached_at = Self::to_nanos(entry.cached_at)?;
        let expires_at = Self::to_nanos(entry.expires_at)?;

        self.conn.lock().execute(
            r#"
            INSERT OR REPLACE INTO cache_entries (key, payload, cached_at, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![key, entry.payload, cached_at, expires_at],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    fn delete_if_expires_at(
        &self,
        key: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, CacheError> {
        let expires_at = Self::to_nanos(expires_at)?;
        let removed = self.conn.lock().execute(
            "DELETE FROM cache_entries WHERE key = ?1 AND expires_at = ?2",
            params![key, expires_at],
        )?;
        Ok(removed > 0)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, CacheEntry)>, CacheError> {
        let conn = self.conn.lock();
        // LIKE would treat '_' in the prefix as a wildcard
        let mut stmt = conn.prepare(
            r#"
            SELECT key, payload, cached_at, expires_at
            FROM cache_entries
            WHERE substr(key, 1, length(?1)) = ?1
            "#,
        )?;

        let rows = stmt.query_map(params![prefix], Self::row_to_entry)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(CacheError::from)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn entry(payload: &[u8]) -> CacheEntry {
        let cached_at = Utc.timestamp_nanos(1_700_000_000_123_456_789);
        CacheEntry {
            payload: payload.to_vec(),
            cached_at,
            expires_at: cached_at + chrono::Duration::minutes(15),
        }
    }

    #[test]
    fn test_store_and_get_entry() {
        let backend = SqliteBackend::in_memory().unwrap();
        let e = entry(b"{\"a\":1}");

        backend.set("weather_block_weather_x", e.clone()).unwrap();
        let got = backend.get("weather_block_weather_x").unwrap().unwrap();

        assert_eq!(got, e);
    }

    #[test]
    fn test_entry_not_found() {
        let backend = SqliteBackend::in_memory().unwrap();
        assert!(backend.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_set_replaces_existing() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.set("k", entry(b"old")).unwrap();
        backend.set("k", entry(b"new")).unwrap();

        assert_eq!(backend.get("k").unwrap().unwrap().payload, b"new");
        assert_eq!(backend.scan_prefix("").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_entry() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.set("k", entry(b"x")).unwrap();

        assert!(backend.delete("k").unwrap());
        assert!(!backend.delete("k").unwrap());
        assert!(backend.get("k").unwrap().is_none());
    }

    #[test]
    fn test_conditional_delete_matches_expiry() {
        let backend = SqliteBackend::in_memory().unwrap();
        let old = entry(b"old");
        let mut new = entry(b"new");
        new.expires_at += chrono::Duration::minutes(15);
        backend.set("k", new.clone()).unwrap();

        assert!(!backend.delete_if_expires_at("k", old.expires_at).unwrap());
        assert_eq!(backend.get("k").unwrap().unwrap().payload, b"new");

        assert!(backend.delete_if_expires_at("k", new.expires_at).unwrap());
        assert!(backend.get("k").unwrap().is_none());
    }

    #[test]
    fn test_scan_prefix_treats_underscore_literally() {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.set("weather_block_a", entry(b"1")).unwrap();
        backend.set("weatherXblockXb", entry(b"2")).unwrap();
        backend.set("other", entry(b"3")).unwrap();

        let found = backend.scan_prefix("weather_block_").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "weather_block_a");
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let backend = SqliteBackend::open(&path).unwrap();
            backend.set("k", entry(b"persisted")).unwrap();
        }

        let backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(backend.get("k").unwrap().unwrap().payload, b"persisted");
    }
}
