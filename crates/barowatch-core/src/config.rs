use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;

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

    /// Weather preference defaults
    #[serde(default)]
    pub weather: WeatherConfig,
}

/// Forecast and storm alert sensitivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    /// Pressure change (hPa per 3 hours) that counts as rising or falling.
    pub fn forecast_threshold(self) -> f64 {
        match self {
            Self::High => 0.5,
            Self::Medium => 1.5,
            Self::Low => 2.5,
        }
    }

    /// Pressure change (hPa per 3 hours) that counts as a rapid change.
    pub fn storm_threshold(self) -> f64 {
        match self {
            Self::High => 4.5,
            Self::Medium => 6.0,
            Self::Low => 7.5,
        }
    }
}

impl FromStr for Sensitivity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(ConfigError::Invalid(format!("unknown sensitivity: {}", other))),
        }
    }
}

/// Source of the elevation used for sea-level pressure correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AltimeterMode {
    Gps,
    #[default]
    GpsBarometer,
    Barometer,
    Override,
}

impl FromStr for AltimeterMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gps" => Ok(Self::Gps),
            "gps_barometer" => Ok(Self::GpsBarometer),
            "barometer" => Ok(Self::Barometer),
            "override" => Ok(Self::Override),
            other => Err(ConfigError::Invalid(format!("unknown altimeter mode: {}", other))),
        }
    }
}

/// Weather preferences. The file values seed the preference store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// Run the background weather monitor
    pub monitor_weather: bool,

    /// Suspend the monitor while low power mode is on
    pub low_power_mode: bool,

    /// Monitor polling frequency in minutes
    pub update_frequency_minutes: u32,

    /// Correct barometric pressure to sea level
    pub use_sea_level_pressure: bool,

    /// Pressure smoothing in percent (0-100)
    pub pressure_smoothing: f64,

    /// Factor the temperature into the sea-level correction
    pub adjust_for_temperature: bool,

    pub forecast_sensitivity: Sensitivity,

    pub storm_alert_sensitivity: Sensitivity,

    pub altimeter_mode: AltimeterMode,

    /// Elevation in meters used when `altimeter_mode = "override"`
    pub altitude_override_m: f64,

    /// How much pressure history to keep in the calibrated history
    pub pressure_history_hours: u32,

    /// Thermometer smoothing factor in [0, 1)
    pub temperature_smoothing: f64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            monitor_weather: true,
            low_power_mode: false,
            update_frequency_minutes: 15,
            use_sea_level_pressure: true,
            pressure_smoothing: 15.0,
            adjust_for_temperature: false,
            forecast_sensitivity: Sensitivity::Medium,
            storm_alert_sensitivity: Sensitivity::Medium,
            altimeter_mode: AltimeterMode::GpsBarometer,
            altitude_override_m: 0.0,
            pressure_history_hours: 48,
            temperature_smoothing: 0.0,
        }
    }
}

impl WeatherConfig {
    /// Monitor polling frequency
    pub fn update_frequency(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.update_frequency_minutes) * 60)
    }

    fn validate_into(&self, result: &mut ValidationResult) {
        if self.update_frequency_minutes == 0 {
            result.add_error(
                "weather.update_frequency_minutes",
                "Update frequency must be greater than 0",
            );
        } else if self.update_frequency_minutes > 1440 {
            result.add_warning(
                "weather.update_frequency_minutes",
                "Update frequency is more than 24 hours",
            );
        }

        if !(0.0..=100.0).contains(&self.pressure_smoothing) {
            result.add_error(
                "weather.pressure_smoothing",
                "Pressure smoothing must be between 0 and 100",
            );
        }

        if !(0.0..1.0).contains(&self.temperature_smoothing) {
            result.add_error(
                "weather.temperature_smoothing",
                "Temperature smoothing must be in [0, 1)",
            );
        }

        if self.pressure_history_hours == 0 {
            result.add_error(
                "weather.pressure_history_hours",
                "Pressure history must be at least 1 hour",
            );
        } else if self.pressure_history_hours < 3 {
            result.add_warning(
                "weather.pressure_history_hours",
                "Less than 3 hours of history leaves the tendency steady",
            );
        }

        if !self.altitude_override_m.is_finite() {
            result.add_error("weather.altitude_override_m", "Altitude must be a number");
        } else if self.altimeter_mode == AltimeterMode::Override
            && self.altitude_override_m.abs() > 9000.0
        {
            result.add_warning(
                "weather.altitude_override_m",
                "Altitude override is outside the expected range",
            );
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("barowatch");

        Self {
            config_dir,
            weather: WeatherConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, creating it with defaults if missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let mut config = Self::default();
            if let Some(parent) = config_path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
            .context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        Self::checked(config)
    }

    /// Same as [`Config::load_validated`] for an explicit path
    pub fn load_validated_from(config_path: &Path) -> Result<(Self, ValidationResult)> {
        let config = Self::load_from(config_path)?;
        Self::checked(config)
    }

    fn checked(config: Self) -> Result<(Self, ValidationResult)> {
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()))
                .context("Configuration validation failed");
        }

        if !validation.warnings.is_empty() {
            for warning in &validation.warnings {
                tracing::warn!("Config warning: {}", warning);
            }
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();
        self.weather.validate_into(&mut result);
        result
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("barowatch");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(
            result.is_valid(),
            "Default config should be valid: {:?}",
            result.errors
        );
    }

    #[test]
    fn test_zero_update_frequency() {
        let mut config = Config::default();
        config.weather.update_frequency_minutes = 0;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result
            .errors
            .iter()
            .any(|e| e.field == "weather.update_frequency_minutes"));
    }

    #[test]
    fn test_temperature_smoothing_must_be_below_one() {
        let mut config = Config::default();
        config.weather.temperature_smoothing = 1.0;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("[0, 1)")));
    }

    #[test]
    fn test_short_history_is_warning() {
        let mut config = Config::default();
        config.weather.pressure_history_hours = 2;
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.field == "weather.pressure_history_hours"));
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

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let created = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.weather, WeatherConfig::default());

        let mut changed = created.clone();
        changed.weather.altimeter_mode = AltimeterMode::Override;
        changed.weather.altitude_override_m = 350.0;
        changed.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.weather.altimeter_mode, AltimeterMode::Override);
        assert_eq!(loaded.weather.altitude_override_m, 350.0);
    }

    #[test]
    fn test_unknown_altimeter_mode_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "config_dir = \".\"\n[weather]\naltimeter_mode = \"dowsing\"\n",
        )
        .unwrap();

        assert!(Config::load_validated_from(&path).is_err());
    }

    #[test]
    fn test_partial_weather_section_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "config_dir = \".\"\n[weather]\nforecast_sensitivity = \"high\"\n",
        )
        .unwrap();

        let (config, _) = Config::load_validated_from(&path).unwrap();
        assert_eq!(config.weather.forecast_sensitivity, Sensitivity::High);
        assert_eq!(config.weather.update_frequency_minutes, 15);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!(
            "override".parse::<AltimeterMode>().unwrap(),
            AltimeterMode::Override
        );
        assert_eq!("GPS".parse::<AltimeterMode>().unwrap(), AltimeterMode::Gps);
        assert!("sonar".parse::<AltimeterMode>().is_err());
        assert_eq!("low".parse::<Sensitivity>().unwrap(), Sensitivity::Low);
        assert!("extreme".parse::<Sensitivity>().is_err());
    }

    #[test]
    fn test_sensitivity_thresholds_are_ordered() {
        for s in [Sensitivity::Low, Sensitivity::Medium, Sensitivity::High] {
            assert!(s.forecast_threshold() < s.storm_threshold());
        }
        assert!(Sensitivity::High.forecast_threshold() < Sensitivity::Low.forecast_threshold());
    }
}
