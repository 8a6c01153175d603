use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Environment variable that overrides `weather.api_key`.
pub const API_KEY_ENV: &str = "NIMBUS_OPENWEATHER_API_KEY";

/// Unit systems understood by the upstream provider.
pub const KNOWN_UNITS: [&str; 3] = ["metric", "imperial", "kelvin"];

/// Hard ceiling on any cache TTL, in minutes (24 hours).
pub const MAX_TTL_MINUTES: u32 = 24 * 60;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Upstream weather provider settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Cache settings
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// OpenWeatherMap API key (can be set via NIMBUS_OPENWEATHER_API_KEY)
    #[serde(default)]
    pub api_key: String,

    /// Base URL of the current-weather API, without the trailing `/weather`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Units used when the caller does not ask for any
    #[serde(default = "default_units")]
    pub default_units: String,

    /// Upstream request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User-Agent sent to the provider
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "https://api.openweathermap.org/data/2.5".to_string()
}

fn default_units() -> String {
    "metric".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("Nimbus/{} Weather Cache", env!("CARGO_PKG_VERSION"))
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            default_units: default_units(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl WeatherConfig {
    /// Check if an API key is configured (not empty or a placeholder)
    pub fn has_api_key(&self) -> bool {
        let key = self.api_key.trim();
        !key.is_empty() && !key.starts_with("YOUR_")
    }
}

/// Where cache entries live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// Process-local map; entries vanish on exit
    Memory,
    /// SQLite file; entries survive restarts
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Storage backend
    #[serde(default)]
    pub backend: CacheBackendKind,

    /// SQLite file path (defaults to `<config_dir>/weather_cache.db`)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Time-to-live for current weather entries, in minutes
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u32,

    /// Interval of the expired-entry sweep in seconds (0 disables it)
    #[serde(default)]
    pub sweep_interval_secs: u64,
}

fn default_ttl_minutes() -> u32 {
    15
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::default(),
            path: None,
            ttl_minutes: default_ttl_minutes(),
            sweep_interval_secs: 0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nimbus");

        Self {
            config_dir,
            weather: WeatherConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load configuration from an explicit path, writing defaults if missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let mut config = Self::default();
            if let Some(parent) = config_path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(config_path)
            .map_err(ConfigError::from)
            .context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents)
            .map_err(ConfigError::from)
            .context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    /// A missing API key only counts when `needs_upstream` is set.
    pub fn load_validated(needs_upstream: bool) -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate_for(needs_upstream);

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        if !validation.warnings.is_empty() {
            for warning in &validation.warnings {
                tracing::warn!("Config warning: {}", warning);
            }
        }

        Ok((config, validation))
    }

    /// Apply environment overrides using the given lookup
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            tracing::debug!("Using API key from {}", API_KEY_ENV);
            self.weather.api_key = key;
        }
    }

    /// Resolved path of the SQLite cache file
    pub fn cache_path(&self) -> PathBuf {
        self.cache
            .path
            .clone()
            .unwrap_or_else(|| self.config_dir.join("weather_cache.db"))
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        self.validate_for(true)
    }

    /// Validate, skipping the API key check when nothing will call upstream
    pub fn validate_for(&self, needs_upstream: bool) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.weather.base_url, "weather.base_url", &mut result);

        if needs_upstream && !self.weather.has_api_key() {
            result.add_error(
                "weather.api_key",
                format!("API key is not configured (set it in config.toml or {})", API_KEY_ENV),
            );
        }

        if !KNOWN_UNITS.contains(&self.weather.default_units.as_str()) {
            result.add_warning(
                "weather.default_units",
                format!(
                    "Unknown units '{}', metric will be used",
                    self.weather.default_units
                ),
            );
        }

        if self.weather.timeout_secs == 0 {
            result.add_error("weather.timeout_secs", "Timeout must be greater than 0");
        } else if self.weather.timeout_secs > 60 {
            result.add_warning("weather.timeout_secs", "Timeout is unusually long (>60s)");
        }

        if self.cache.ttl_minutes == 0 {
            result.add_error("cache.ttl_minutes", "TTL must be greater than 0");
        } else if self.cache.ttl_minutes > MAX_TTL_MINUTES {
            result.add_warning(
                "cache.ttl_minutes",
                "TTL is more than 24 hours and will be capped",
            );
        }

        if self.cache.backend == CacheBackendKind::Sqlite {
            let path = self.cache_path();
            if path.is_dir() {
                result.add_error(
                    "cache.path",
                    format!("Path is a directory: {}", path.display()),
                );
            }
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                } else if url.scheme() == "http" {
                    result.add_warning(field_name, "API key will be sent over plain http");
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to file
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(ConfigError::from)
            .context("Failed to serialize config")?;

        std::fs::write(config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("nimbus");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn configured() -> Config {
        let mut config = Config::default();
        config.weather.api_key = "abc123".to_string();
        config
    }

    #[test]
    fn test_configured_default_is_valid() {
        let result = configured().validate();
        assert!(result.is_valid(), "Configured default should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_missing_api_key_is_error() {
        let result = Config::default().validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "weather.api_key"));
    }

    #[test]
    fn test_api_key_not_required_for_cache_maintenance() {
        let result = Config::default().validate_for(false);
        assert!(result.is_valid(), "Unexpected errors: {:?}", result.errors);

        let mut config = Config::default();
        config.weather.timeout_secs = 0;
        assert!(!config.validate_for(false).is_valid());
    }

    #[test]
    fn test_placeholder_api_key_is_not_configured() {
        let mut config = Config::default();
        config.weather.api_key = "YOUR_API_KEY".to_string();
        assert!(!config.weather.has_api_key());
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = configured();
        config.weather.base_url = "ftp://api.openweathermap.org".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_invalid_url() {
        let mut config = configured();
        config.weather.base_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "weather.base_url"));
    }

    #[test]
    fn test_unknown_units_is_warning() {
        let mut config = configured();
        config.weather.default_units = "bogus".to_string();
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "weather.default_units"));
    }

    #[test]
    fn test_ttl_bounds() {
        let mut config = configured();
        config.cache.ttl_minutes = 0;
        assert!(!config.validate().is_valid());

        config.cache.ttl_minutes = MAX_TTL_MINUTES + 1;
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "cache.ttl_minutes"));
    }

    #[test]
    fn test_env_override_replaces_api_key() {
        let mut config = Config::default();
        config.apply_env_overrides(|name| {
            (name == API_KEY_ENV).then(|| "from-env".to_string())
        });
        assert_eq!(config.weather.api_key, "from-env");
    }

    #[test]
    fn test_blank_env_override_is_ignored() {
        let mut config = configured();
        config.apply_env_overrides(|_| Some("   ".to_string()));
        assert_eq!(config.weather.api_key, "abc123");
    }

    #[test]
    fn test_load_from_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.config_dir, dir.path().join("nested"));
        assert_eq!(config.cache.ttl_minutes, 15);
        assert_eq!(config.weather.timeout_secs, 10);
    }

    #[test]
    fn test_load_from_fills_missing_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "config_dir = \"/tmp/nimbus\"\n\n[weather]\napi_key = \"k\"\n\n[cache]\nbackend = \"memory\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.weather.api_key, "k");
        assert_eq!(config.weather.default_units, "metric");
        assert_eq!(config.cache.backend, CacheBackendKind::Memory);
        assert_eq!(config.cache_path(), PathBuf::from("/tmp/nimbus/weather_cache.db"));
    }

    #[test]
    fn test_load_from_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "config_dir = [").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_load_from_unreadable_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory exists but cannot be read as a file
        let err = Config::load_from(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
