//! Weather lookups for Nimbus
//!
//! Fetches current conditions from OpenWeatherMap and keeps them in a
//! short-lived, namespaced TTL cache in front of the rate-limited API.

pub mod backend;
pub mod cache;
pub mod clock;
pub mod error;
pub mod provider;
pub mod service;
pub mod sqlite;
pub mod types;

pub use backend::{CacheBackend, CacheEntry, CacheError, MemoryBackend};
pub use cache::{cache_key, CacheHit, CacheKind, WeatherCache, CACHE_PREFIX, DEFAULT_TTL, MAX_TTL};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::WeatherError;
pub use provider::{icon_url, UpstreamClient, UpstreamOptions};
pub use service::WeatherService;
pub use sqlite::SqliteBackend;
pub use types::*;
