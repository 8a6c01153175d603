//! OpenWeatherMap current-weather client.
//!
//! Stateless: one call to `fetch` is exactly one outbound request. No caching
//! and no retries happen here.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::instrument;

use crate::clock::{Clock, SystemClock};
use crate::error::WeatherError;
use crate::types::{Conditions, Place, Temperature, Units, WeatherRecord, Wind};

pub const API_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";
const ICON_BASE_URL: &str = "https://openweathermap.org/img/wn/";
pub const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = concat!("Nimbus/", env!("CARGO_PKG_VERSION"), " Weather Cache");

/// Connection settings for [`UpstreamClient`].
#[derive(Debug, Clone)]
pub struct UpstreamOptions {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for UpstreamOptions {
    fn default() -> Self {
        Self {
            base_url: API_BASE_URL.to_string(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    main: Option<ApiMain>,
    weather: Option<Vec<ApiCondition>>,
    name: Option<String>,
    sys: Option<ApiSys>,
    wind: Option<ApiWind>,
    visibility: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiMain {
    temp: Option<f64>,
    feels_like: Option<f64>,
    temp_min: Option<f64>,
    temp_max: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiCondition {
    main: Option<String>,
    description: Option<String>,
    icon: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiSys {
    country: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiWind {
    speed: Option<f64>,
    deg: Option<f64>,
}

fn text(value: Option<String>) -> String {
    value.map(|s| s.trim().to_string()).unwrap_or_default()
}

/// Turn a parsed provider payload into a `WeatherRecord`.
///
/// `main`, `weather` and `name` must be present; everything below them
/// defaults to zero or an empty string.
fn normalize(
    payload: serde_json::Value,
    units: Units,
    now: DateTime<Utc>,
) -> Result<WeatherRecord, WeatherError> {
    if !payload.is_object() {
        return Err(WeatherError::InvalidPayload(
            "expected a JSON object".to_string(),
        ));
    }

    let resp: ApiResponse = serde_json::from_value(payload)
        .map_err(|e| WeatherError::InvalidPayload(e.to_string()))?;

    let (Some(main), Some(weather), Some(name)) = (resp.main, resp.weather, resp.name) else {
        return Err(WeatherError::InvalidPayload(
            "missing one of 'main', 'weather', 'name'".to_string(),
        ));
    };

    let condition = weather.into_iter().next().unwrap_or_default();
    let sys = resp.sys.unwrap_or_default();
    let wind = resp.wind.unwrap_or_default();

    Ok(WeatherRecord {
        location: Place {
            name: name.trim().to_string(),
            country: text(sys.country),
        },
        temperature: Temperature {
            current: main.temp.unwrap_or_default(),
            feels_like: main.feels_like.unwrap_or_default(),
            min: main.temp_min.unwrap_or_default(),
            max: main.temp_max.unwrap_or_default(),
        },
        weather: Conditions {
            main: text(condition.main),
            description: text(condition.description),
            icon: text(condition.icon),
        },
        humidity: main.humidity.unwrap_or_default().clamp(0.0, 100.0) as u8,
        pressure: main.pressure.unwrap_or_default() as i32,
        wind: Wind {
            speed: wind.speed.unwrap_or_default(),
            deg: wind.deg.unwrap_or_default() as i32,
        },
        visibility: resp.visibility.unwrap_or_default().max(0.0) as u32,
        units,
        updated_at: now,
    })
}

/// Full URL of a provider weather icon, or an empty string for no icon.
pub fn icon_url(icon_code: &str, size: &str) -> String {
    if icon_code.is_empty() {
        return String::new();
    }
    format!("{}{}@{}.png", ICON_BASE_URL, icon_code, size)
}

/// HTTP client for the provider's current-weather endpoint.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    api_key: String,
    base_url: String,
    clock: Arc<dyn Clock>,
}

impl UpstreamClient {
    /// Client with the default endpoint, timeout and user agent.
    pub fn new(api_key: &str) -> Result<Self, WeatherError> {
        Self::with_options(api_key, UpstreamOptions::default())
    }

    pub fn with_options(api_key: &str, options: UpstreamOptions) -> Result<Self, WeatherError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(WeatherError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent)
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: options.base_url.trim_end_matches('/').to_string(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Stamp fetched records with `clock` instead of the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fetch current weather for a location.
    ///
    /// Callers are expected to pass a non-empty, trimmed location.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch(&self, location: &str, units: Units) -> Result<WeatherRecord, WeatherError> {
        let url = format!("{}/weather", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", location),
                ("appid", self.api_key.as_str()),
                ("units", units.as_str()),
            ])
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Weather API request failed: {}", e);
                WeatherError::Network(e)
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let err = WeatherError::UpstreamStatus {
                code: status.as_u16(),
            };
            tracing::error!("Weather API error: HTTP {} - {}", status.as_u16(), err.user_message());
            return Err(err);
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(WeatherError::EmptyResponse);
        }

        let payload: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
            tracing::error!("Weather API returned invalid JSON: {}", e);
            WeatherError::MalformedResponse(e)
        })?;

        let record = normalize(payload, units, self.clock.now())?;
        tracing::info!(
            "Fetched weather for {} ({})",
            record.location.name,
            units
        );
        Ok(record)
    }
}
