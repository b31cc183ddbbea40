//! Sea-level pressure correction strategies.
//!
//! ```text
//! P0 = P · (1 - 0.0065·h / 288.15)^-5.255
//! P0 = P · (1 - 0.0065·h / (T + 0.0065·h + 273.15))^-5.257   (temperature aware)
//! ```

use barowatch_core::{AltimeterMode, WeatherConfig};
use chrono::{DateTime, Utc};

use super::kalman::ScalarKalman;
use crate::types::RawObservation;

const LAPSE_RATE: f64 = 0.0065;
const STANDARD_TEMPERATURE_K: f64 = 288.15;

/// Altitude jump (m) treated as a GPS glitch rather than movement
pub const ALTITUDE_OUTLIER_M: f64 = 34.0;
/// Altitude measurement noise (m²)
pub const ALTITUDE_NOISE: f64 = 34.0 * 34.0;
/// How fast true altitude can drift while hiking (m² per hour)
const ALTITUDE_PROCESS_NOISE: f64 = 400.0;
/// How fast sea-level pressure drifts (hPa² per hour)
const PRESSURE_PROCESS_NOISE: f64 = 1.0;
/// Consecutive outliers after which the new altitude is accepted
const MAX_REJECTED_OUTLIERS: u32 = 2;

pub fn sea_level_pressure(pressure: f64, altitude: f64, temperature: Option<f64>) -> f64 {
    let ratio = match temperature {
        Some(t) => 1.0 - LAPSE_RATE * altitude / (t + LAPSE_RATE * altitude + 273.15),
        None => 1.0 - LAPSE_RATE * altitude / STANDARD_TEMPERATURE_K,
    };
    let exponent = if temperature.is_some() {
        -5.257
    } else {
        -5.255
    };
    pressure * ratio.powf(exponent)
}

/// Corrects a time ordered series of readings to sea-level pressure.
/// Returns one pressure per reading.
pub trait SeaLevelCalibration: Send + Sync {
    fn name(&self) -> &'static str;

    fn calibrate(&self, readings: &[RawObservation]) -> Vec<f64>;
}

/// Station pressure, uncorrected
#[derive(Debug, Clone, Copy, Default)]
pub struct RawPressure;

impl SeaLevelCalibration for RawPressure {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn calibrate(&self, readings: &[RawObservation]) -> Vec<f64> {
        readings.iter().map(|r| r.pressure).collect()
    }
}

/// Corrects every reading as if taken at one known elevation
#[derive(Debug, Clone, Copy)]
pub struct FixedElevation {
    pub elevation: f64,
    pub use_temperature: bool,
}

impl SeaLevelCalibration for FixedElevation {
    fn name(&self) -> &'static str {
        "fixed_elevation"
    }

    fn calibrate(&self, readings: &[RawObservation]) -> Vec<f64> {
        readings
            .iter()
            .map(|r| {
                sea_level_pressure(
                    r.pressure,
                    self.elevation,
                    self.use_temperature.then_some(r.temperature),
                )
            })
            .collect()
    }
}

/// Uses the altitude recorded with each reading
#[derive(Debug, Clone, Copy)]
pub struct GpsElevation {
    pub use_temperature: bool,
}

impl SeaLevelCalibration for GpsElevation {
    fn name(&self) -> &'static str {
        "gps_elevation"
    }

    fn calibrate(&self, readings: &[RawObservation]) -> Vec<f64> {
        readings
            .iter()
            .map(|r| {
                sea_level_pressure(
                    r.pressure,
                    r.altitude,
                    self.use_temperature.then_some(r.temperature),
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanSeaLevelSettings {
    pub altitude_outlier_m: f64,
    pub altitude_noise: f64,
    pub pressure_noise: f64,
    pub use_temperature: bool,
}

impl KalmanSeaLevelSettings {
    /// `pressure_smoothing` is the user preference in percent.
    pub fn from_smoothing(pressure_smoothing: f64, use_temperature: bool) -> Self {
        let s = (pressure_smoothing / 100.0).clamp(0.0, 1.0) * 10.0;
        Self {
            altitude_outlier_m: ALTITUDE_OUTLIER_M,
            altitude_noise: ALTITUDE_NOISE,
            pressure_noise: s * s,
            use_temperature,
        }
    }
}

/// Filters the recorded altitude, corrects to sea level, then filters the
/// sea-level pressure.
#[derive(Debug, Clone, Copy)]
pub struct KalmanSeaLevel {
    pub settings: KalmanSeaLevelSettings,
}

impl SeaLevelCalibration for KalmanSeaLevel {
    fn name(&self) -> &'static str {
        "kalman"
    }

    fn calibrate(&self, readings: &[RawObservation]) -> Vec<f64> {
        let mut altitude = ScalarKalman::new(ALTITUDE_PROCESS_NOISE, self.settings.altitude_noise);
        let mut pressure = ScalarKalman::new(PRESSURE_PROCESS_NOISE, self.settings.pressure_noise);
        let mut rejected = 0u32;
        let mut previous_time: Option<DateTime<Utc>> = None;

        readings
            .iter()
            .map(|r| {
                let dt = previous_time
                    .map(|t| (r.time - t).num_seconds() as f64 / 3600.0)
                    .unwrap_or(0.0);
                previous_time = Some(r.time);

                let is_outlier = altitude
                    .estimate()
                    .is_some_and(|est| (r.altitude - est).abs() > self.settings.altitude_outlier_m);

                let filtered_altitude = if is_outlier && rejected < MAX_REJECTED_OUTLIERS {
                    rejected += 1;
                    altitude.predict(dt).unwrap_or(r.altitude)
                } else if is_outlier {
                    rejected = 0;
                    altitude =
                        ScalarKalman::new(ALTITUDE_PROCESS_NOISE, self.settings.altitude_noise);
                    altitude.update(r.altitude, dt)
                } else {
                    rejected = 0;
                    altitude.update(r.altitude, dt)
                };

                let corrected = sea_level_pressure(
                    r.pressure,
                    filtered_altitude,
                    self.settings.use_temperature.then_some(r.temperature),
                );
                pressure.update(corrected, dt)
            })
            .collect()
    }
}

/// Picks the sea-level strategy the weather preferences ask for.
pub fn strategy_for(prefs: &WeatherConfig) -> Box<dyn SeaLevelCalibration> {
    if !prefs.use_sea_level_pressure {
        return Box::new(RawPressure);
    }

    let use_temperature = prefs.adjust_for_temperature;
    match prefs.altimeter_mode {
        AltimeterMode::Override => Box::new(FixedElevation {
            elevation: prefs.altitude_override_m,
            use_temperature,
        }),
        AltimeterMode::Gps => Box::new(GpsElevation { use_temperature }),
        AltimeterMode::GpsBarometer | AltimeterMode::Barometer => Box::new(KalmanSeaLevel {
            settings: KalmanSeaLevelSettings::from_smoothing(
                prefs.pressure_smoothing,
                use_temperature,
            ),
        }),
    }
}
