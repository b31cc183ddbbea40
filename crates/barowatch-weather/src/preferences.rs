//! Names of the weather preferences, as delivered by preference change notifications.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceKey {
    MonitorWeather,
    LowPowerMode,
    UpdateFrequency,
    UseSeaLevelPressure,
    PressureSmoothing,
    AdjustForTemperature,
    ForecastSensitivity,
    StormAlertSensitivity,
    AltimeterMode,
    AltitudeOverride,
    PressureHistory,
    TemperatureSmoothing,
}

impl PreferenceKey {
    pub const ALL: [PreferenceKey; 12] = [
        Self::MonitorWeather,
        Self::LowPowerMode,
        Self::UpdateFrequency,
        Self::UseSeaLevelPressure,
        Self::PressureSmoothing,
        Self::AdjustForTemperature,
        Self::ForecastSensitivity,
        Self::StormAlertSensitivity,
        Self::AltimeterMode,
        Self::AltitudeOverride,
        Self::PressureHistory,
        Self::TemperatureSmoothing,
    ];

    /// Config file key
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MonitorWeather => "monitor_weather",
            Self::LowPowerMode => "low_power_mode",
            Self::UpdateFrequency => "update_frequency_minutes",
            Self::UseSeaLevelPressure => "use_sea_level_pressure",
            Self::PressureSmoothing => "pressure_smoothing",
            Self::AdjustForTemperature => "adjust_for_temperature",
            Self::ForecastSensitivity => "forecast_sensitivity",
            Self::StormAlertSensitivity => "storm_alert_sensitivity",
            Self::AltimeterMode => "altimeter_mode",
            Self::AltitudeOverride => "altitude_override_m",
            Self::PressureHistory => "pressure_history_hours",
            Self::TemperatureSmoothing => "temperature_smoothing",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == key)
    }

    /// Settings that feed calibration or forecasting
    pub fn invalidates_weather(&self) -> bool {
        matches!(
            self,
            Self::UseSeaLevelPressure
                | Self::PressureSmoothing
                | Self::AdjustForTemperature
                | Self::ForecastSensitivity
                | Self::StormAlertSensitivity
                | Self::AltimeterMode
                | Self::AltitudeOverride
                | Self::PressureHistory
                | Self::TemperatureSmoothing
        )
    }

    pub fn affects_monitor_state(&self) -> bool {
        matches!(self, Self::MonitorWeather | Self::LowPowerMode)
    }

    pub fn affects_monitor_frequency(&self) -> bool {
        matches!(self, Self::UpdateFrequency)
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_names_round_trip() {
        for key in PreferenceKey::ALL {
            assert_eq!(PreferenceKey::from_key(key.as_str()), Some(key));
        }
        assert_eq!(PreferenceKey::from_key("theme"), None);
    }

    #[test]
    fn test_monitor_keys_do_not_invalidate() {
        assert!(!PreferenceKey::MonitorWeather.invalidates_weather());
        assert!(!PreferenceKey::UpdateFrequency.invalidates_weather());
        assert!(PreferenceKey::MonitorWeather.affects_monitor_state());
        assert!(PreferenceKey::UpdateFrequency.affects_monitor_frequency());
    }

    #[test]
    fn test_calibration_keys_invalidate() {
        for key in [
            PreferenceKey::PressureSmoothing,
            PreferenceKey::UseSeaLevelPressure,
            PreferenceKey::AdjustForTemperature,
            PreferenceKey::ForecastSensitivity,
            PreferenceKey::StormAlertSensitivity,
            PreferenceKey::AltimeterMode,
            PreferenceKey::PressureHistory,
            PreferenceKey::TemperatureSmoothing,
        ] {
            assert!(key.invalidates_weather(), "{}", key);
        }
    }
}
