//! Weather service error types.

use thiserror::Error;

use crate::backend::CacheError;

#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("Location cannot be empty")]
    InvalidLocation,

    #[error("OpenWeatherMap API key is not configured")]
    MissingApiKey,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Weather API returned HTTP {code}")]
    UpstreamStatus { code: u16 },

    #[error("Empty response from weather service")]
    EmptyResponse,

    #[error("Malformed JSON from weather service: {0}")]
    MalformedResponse(#[source] serde_json::Error),

    #[error("Invalid weather data: {0}")]
    InvalidPayload(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(#[from] CacheError),
}

impl WeatherError {
    /// User-friendly error message for display.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidLocation => "Location cannot be empty.".to_string(),
            Self::MissingApiKey => "OpenWeatherMap API key is not configured.".to_string(),
            Self::Network(_) => "Failed to connect to weather service.".to_string(),
            Self::UpstreamStatus { code } => match code {
                401 => "Invalid API key. Please check your OpenWeatherMap API key.".to_string(),
                404 => "Location not found. Please check the location name.".to_string(),
                429 => "API rate limit exceeded. Please try again later.".to_string(),
                500 | 502 | 503 => "Weather service is temporarily unavailable.".to_string(),
                other => format!("Weather service error (HTTP {}).", other),
            },
            Self::EmptyResponse => "Empty response from weather service.".to_string(),
            Self::MalformedResponse(_) => "Invalid response from weather service.".to_string(),
            Self::InvalidPayload(_) => "Invalid weather data received.".to_string(),
            Self::CacheUnavailable(_) => "Weather cache is unavailable.".to_string(),
        }
    }

    /// Upstream HTTP status, when the failure came from one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::UpstreamStatus { code } => Some(*code),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether a caller could reasonably retry later.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::UpstreamStatus { code } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}
