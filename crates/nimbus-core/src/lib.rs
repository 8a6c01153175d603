//! Shared plumbing for Nimbus: configuration, config errors and logging setup.

pub mod config;
pub mod error;

pub use config::{
    CacheBackendKind, CacheConfig, Config, ValidationResult, WeatherConfig, API_KEY_ENV,
    MAX_TTL_MINUTES,
};
pub use error::ConfigError;

use anyhow::Result;

/// Initialize logging for the process
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Nimbus core initialized");
    Ok(())
}
