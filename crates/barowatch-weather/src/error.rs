//! Weather subsystem error types.

use barowatch_core::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Observation store error: {0}")]
    Store(String),

    #[error("Temperature estimator error: {0}")]
    Estimator(String),

    #[error("Monitor scheduler error: {0}")]
    Scheduler(String),

    #[error("Alert dispatch failed: {0}")]
    Dispatch(String),

    #[error("Weather refresh was aborted")]
    RefreshAborted,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl WeatherError {
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    pub fn estimator(message: impl Into<String>) -> Self {
        Self::Estimator(message.into())
    }

    /// User-friendly error message for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Store(_) => "Unable to read weather history. Try again.",
            Self::Estimator(_) => "Historical temperatures are unavailable.",
            Self::Scheduler(_) => "Could not take a new weather reading.",
            Self::Dispatch(_) => "Could not send weather alerts.",
            Self::RefreshAborted => "Weather update was interrupted. Try again.",
            Self::Config(e) => e.user_message(),
        }
    }
}

pub type WeatherResult<T> = Result<T, WeatherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_conversion() {
        let err: WeatherError = ConfigError::Invalid("altimeter".into()).into();
        assert!(matches!(err, WeatherError::Config(_)));
        assert_eq!(
            err.user_message(),
            "Invalid configuration. Check your settings."
        );
    }

    #[test]
    fn test_display_includes_source() {
        let err = WeatherError::store("disk full");
        assert!(err.to_string().contains("disk full"));
    }
}
