use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Measurement system requested from the provider.
///
/// Part of the cache key: the same location in two unit systems is two entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
    Kelvin,
}

impl Units {
    /// Query-string value sent upstream
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Imperial => "imperial",
            Self::Kelvin => "kelvin",
        }
    }

    /// Exact match against the three recognized values
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "metric" => Some(Self::Metric),
            "imperial" => Some(Self::Imperial),
            "kelvin" => Some(Self::Kelvin),
            _ => None,
        }
    }

    /// Parse units, falling back to metric for anything unrecognized
    pub fn parse_or_default(value: &str) -> Self {
        Self::parse(value).unwrap_or_else(|| {
            tracing::debug!("Unrecognized units '{}', using metric", value);
            Self::default()
        })
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    pub country: String,
}

/// Temperatures in the units that were requested (no conversion applied)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub current: f64,
    pub feels_like: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    pub main: String,
    pub description: String,
    /// Provider icon code, e.g. `02d`
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub speed: f64,
    pub deg: i32,
}

/// Normalized current-weather observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub location: Place,
    pub temperature: Temperature,
    pub weather: Conditions,
    /// Relative humidity, 0-100
    pub humidity: u8,
    /// Sea-level pressure in hPa
    pub pressure: i32,
    pub wind: Wind,
    /// Visibility in meters
    pub visibility: u32,
    pub units: Units,
    pub updated_at: DateTime<Utc>,
}

/// How a `get_weather` result was served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheInfo {
    pub cached: bool,
    pub cached_at: Option<DateTime<Utc>>,
    pub time_left: Option<Duration>,
}

impl CacheInfo {
    pub fn hit(cached_at: DateTime<Utc>, time_left: Duration) -> Self {
        Self {
            cached: true,
            cached_at: Some(cached_at),
            time_left: Some(time_left),
        }
    }

    pub fn miss() -> Self {
        Self::default()
    }
}

/// Aggregate numbers over the live namespace; observability only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub count: usize,
    pub total_size_bytes: usize,
}

/// Metadata for a single cache key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub time_left: Duration,
    pub is_expired: bool,
    pub size_bytes: usize,
}
