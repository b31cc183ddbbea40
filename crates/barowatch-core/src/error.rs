//! Centralized error types for the Barowatch application.
//!
//! Each error keeps its full context for logging and offers a short
//! `user_message()` for display.

use thiserror::Error;

/// Top-level application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Other(e) => e
                .downcast_ref::<ConfigError>()
                .map_or(
                    "An unexpected error occurred. Please try again.",
                    ConfigError::user_message,
                ),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_conversion() {
        let config_err = ConfigError::Invalid("altimeter_mode".into());
        let app_err: AppError = config_err.into();
        assert!(matches!(app_err, AppError::Config(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_user_message_propagation() {
        let app_err = AppError::Config(ConfigError::ParseError("line 3".into()));
        assert_eq!(
            app_err.user_message(),
            "Configuration file is malformed. Check your settings."
        );
    }

    #[test]
    fn test_wrapped_config_error_message() {
        let err = anyhow::Error::from(ConfigError::Invalid("pressure_smoothing".into()))
            .context("Configuration validation failed");
        assert_eq!(
            AppError::from(err).user_message(),
            "Invalid configuration. Check your settings."
        );
        assert_eq!(
            AppError::from(anyhow::anyhow!("boom")).user_message(),
            "An unexpected error occurred. Please try again."
        );
    }

    #[test]
    fn test_display_keeps_context() {
        let err = ConfigError::Invalid("unknown altimeter mode: sonar".into());
        assert!(err.to_string().contains("sonar"));
    }
}
