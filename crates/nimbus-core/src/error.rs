//! Configuration error types for Nimbus.
//!
//! Errors carry full context for logging; `user_message()` gives a short,
//! non-technical message for whatever front end is calling us.

use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
            ConfigError::Io(_) => "A file operation failed. Please try again.",
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::ParseError(e.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(e: toml::ser::Error) -> Self {
        ConfigError::Invalid(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_user_messages_are_non_empty() {
        let errors = [
            ConfigError::Invalid("x".into()),
            ConfigError::ParseError("x".into()),
            ConfigError::Io(std::io::Error::other("x")),
        ];

        for err in &errors {
            assert!(!err.user_message().is_empty());
        }
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse_err = toml::from_str::<toml::Value>("not = [valid").unwrap_err();
        let err: ConfigError = parse_err.into();
        assert!(matches!(err, ConfigError::ParseError(_)));
        assert!(err.user_message().contains("malformed"));
    }
}
