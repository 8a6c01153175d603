use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nimbus_core::{CacheBackendKind, Config};
use nimbus_weather::{
    CacheBackend, MemoryBackend, SqliteBackend, SystemClock, UpstreamClient, UpstreamOptions,
    WeatherService,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "nimbus", version, about = "Cached current-weather lookups")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Current weather for a location, served from cache when fresh
    Get {
        location: String,
        /// metric, imperial or kelvin (anything else means metric)
        #[arg(short, long)]
        units: Option<String>,
    },
    /// Cache metadata for a location without fetching
    Info {
        location: String,
        #[arg(short, long)]
        units: Option<String>,
    },
    /// Drop the cached entry for a location
    Refresh {
        location: String,
        #[arg(short, long)]
        units: Option<String>,
    },
    /// Entry count and total size of the cache
    Stats,
    /// Remove every cached entry
    Clear,
    /// Remove expired entries
    Cleanup,
}

fn build_service(config: &Config) -> Result<WeatherService> {
    let backend: Arc<dyn CacheBackend> = match config.cache.backend {
        CacheBackendKind::Memory => Arc::new(MemoryBackend::new()),
        CacheBackendKind::Sqlite => {
            let path = config.cache_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create cache directory")?;
            }
            Arc::new(
                SqliteBackend::open(&path)
                    .with_context(|| format!("Failed to open cache at {}", path.display()))?,
            )
        }
    };

    let clock = Arc::new(SystemClock);
    let service = if config.weather.has_api_key() {
        let client = UpstreamClient::with_options(
            &config.weather.api_key,
            UpstreamOptions {
                base_url: config.weather.base_url.clone(),
                timeout: Duration::from_secs(config.weather.timeout_secs),
                user_agent: config.weather.user_agent.clone(),
            },
        )?;
        WeatherService::new(client, backend, clock)
    } else {
        tracing::debug!("No API key configured, cache commands only");
        WeatherService::without_upstream(backend, clock)
    };

    let ttl = Duration::from_secs(u64::from(config.cache.ttl_minutes) * 60);
    Ok(service.with_ttl(ttl))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    nimbus_core::init()?;
    let cli = Cli::parse();

    let needs_upstream = matches!(cli.command, Command::Get { .. });
    let (config, _warnings) = Config::load_validated(needs_upstream)?;
    let service = build_service(&config)?;

    let cancel = CancellationToken::new();
    let sweeper = (config.cache.sweep_interval_secs > 0).then(|| {
        service.spawn_sweeper(
            Duration::from_secs(config.cache.sweep_interval_secs),
            cancel.clone(),
        )
    });

    let units_or_default =
        |units: Option<String>| units.unwrap_or_else(|| config.weather.default_units.clone());

    let result = match cli.command {
        Command::Get { location, units } => {
            let units = units_or_default(units);
            match service.get_weather(&location, &units).await {
                Ok((record, info)) => print_json(&serde_json::json!({
                    "weather": record,
                    "icon_url": nimbus_weather::icon_url(&record.weather.icon, "2x"),
                    "cache": {
                        "cached": info.cached,
                        "cached_at": info.cached_at,
                        "time_left_secs": info.time_left.map(|d| d.as_secs()),
                    },
                })),
                Err(e) => {
                    tracing::error!("Weather lookup failed: {}", e);
                    Err(anyhow::anyhow!("{}", e.user_message()))
                }
            }
        }
        Command::Info { location, units } => {
            let units = units_or_default(units);
            match service.info(&location, &units)? {
                Some(info) => print_json(&serde_json::json!({
                    "cached_at": info.cached_at,
                    "expires_at": info.expires_at,
                    "time_left_secs": info.time_left.as_secs(),
                    "is_expired": info.is_expired,
                    "size_bytes": info.size_bytes,
                })),
                None => print_json(&serde_json::json!({ "found": false })),
            }
        }
        Command::Refresh { location, units } => {
            let units = units_or_default(units);
            let removed = service.refresh(&location, &units)?;
            print_json(&serde_json::json!({ "refreshed": removed }))
        }
        Command::Stats => print_json(&serde_json::to_value(service.stats()?)?),
        Command::Clear => print_json(&serde_json::json!({ "cleared": service.clear_all()? })),
        Command::Cleanup => {
            print_json(&serde_json::json!({ "cleaned": service.cleanup_expired()? }))
        }
    };

    cancel.cancel();
    if let Some(handle) = sweeper {
        handle.await.context("Cache sweeper panicked")?;
    }

    result
}
