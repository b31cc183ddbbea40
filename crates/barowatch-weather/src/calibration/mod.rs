//! Calibration of raw barometer readings.
//!
//! Runs temperature smoothing, then humidity smoothing, then sea-level
//! correction. Every step returns one output per input, in the same order.

pub mod kalman;
pub mod sea_level;

pub use sea_level::{
    sea_level_pressure, strategy_for, FixedElevation, GpsElevation, KalmanSeaLevel,
    KalmanSeaLevelSettings, RawPressure, SeaLevelCalibration,
};

use crate::types::{CalibratedObservation, RawObservation};

/// Smoothing applied to humidity when a hygrometer is present
pub const HUMIDITY_SMOOTHING: f64 = 0.1;

const MAX_SMOOTHING: f64 = 0.999;

/// Exponential smoothing over a time ordered series.
///
/// `smoothing` is the weight of the previous smoothed value, clamped to
/// [0, 1). A value of 0 returns the input unchanged.
pub fn smooth_temporal<T>(
    readings: &[T],
    smoothing: f64,
    select: impl Fn(&T) -> f64,
    merge: impl Fn(&T, f64) -> T,
) -> Vec<T> {
    let factor = if smoothing.is_finite() {
        smoothing.clamp(0.0, MAX_SMOOTHING)
    } else {
        0.0
    };

    let mut previous: Option<f64> = None;
    readings
        .iter()
        .map(|reading| {
            let value = select(reading);
            let smoothed = match previous {
                Some(p) => factor * p + (1.0 - factor) * value,
                None => value,
            };
            previous = Some(smoothed);
            merge(reading, smoothed)
        })
        .collect()
}

pub fn calibrate_temperature(readings: &[RawObservation], smoothing: f64) -> Vec<RawObservation> {
    smooth_temporal(
        readings,
        smoothing,
        |r| r.temperature,
        |r, smoothed| RawObservation {
            temperature: smoothed,
            ..r.clone()
        },
    )
}

/// Missing humidity counts as 0 while smoothing, and a smoothed 0 is
/// reported as missing.
pub fn calibrate_humidity(
    readings: &[RawObservation],
    has_hygrometer: bool,
) -> Vec<RawObservation> {
    if !has_hygrometer {
        return readings.to_vec();
    }

    smooth_temporal(
        readings,
        HUMIDITY_SMOOTHING,
        |r| r.humidity.unwrap_or(0.0),
        |r, smoothed| RawObservation {
            humidity: (smoothed != 0.0).then_some(smoothed),
            ..r.clone()
        },
    )
}

pub fn calibrate_pressure(
    readings: &[RawObservation],
    strategy: &dyn SeaLevelCalibration,
) -> Vec<CalibratedObservation> {
    let pressures = strategy.calibrate(readings);
    readings
        .iter()
        .zip(pressures)
        .map(|(reading, pressure)| CalibratedObservation {
            id: reading.id,
            time: reading.time,
            pressure,
            temperature: reading.temperature,
            humidity: reading.humidity,
        })
        .collect()
}

/// Full pipeline in order: temperature, humidity, pressure.
pub fn calibrate(
    readings: &[RawObservation],
    temperature_smoothing: f64,
    has_hygrometer: bool,
    strategy: &dyn SeaLevelCalibration,
) -> Vec<CalibratedObservation> {
    let temperatures = calibrate_temperature(readings, temperature_smoothing);
    let humidity = calibrate_humidity(&temperatures, has_hygrometer);
    calibrate_pressure(&humidity, strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Coordinate;
    use chrono::{Duration, TimeZone, Utc};

    fn obs(i: i64, temperature: f64, humidity: Option<f64>) -> RawObservation {
        RawObservation {
            id: i,
            time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::minutes(15 * i),
            pressure: 1000.0 + i as f64,
            temperature,
            humidity,
            altitude: 0.0,
            location: Coordinate::new(42.0, -71.0),
        }
    }

    #[test]
    fn test_zero_smoothing_is_identity() {
        let readings = vec![obs(0, 10.0, None), obs(1, 20.0, None), obs(2, 5.0, None)];
        let smoothed = calibrate_temperature(&readings, 0.0);
        assert_eq!(smoothed, readings);
    }

    #[test]
    fn test_temperature_smoothing_only_touches_temperature() {
        let readings = vec![obs(0, 10.0, Some(50.0)), obs(1, 20.0, Some(60.0))];
        let smoothed = calibrate_temperature(&readings, 0.5);
        assert_eq!(smoothed[0].temperature, 10.0);
        assert_eq!(smoothed[1].temperature, 15.0);
        assert_eq!(smoothed[1].humidity, Some(60.0));
        assert_eq!(smoothed[1].pressure, readings[1].pressure);
        assert_eq!(smoothed[1].id, 1);
    }

    #[test]
    fn test_smoothing_factor_is_clamped() {
        let readings = vec![obs(0, 10.0, None), obs(1, 20.0, None)];
        let smoothed = calibrate_temperature(&readings, 4.0);
        assert!(smoothed[1].temperature > 10.0);
        assert!(smoothed[1].temperature < 10.1);
    }

    #[test]
    fn test_humidity_passthrough_without_hygrometer() {
        let readings = vec![obs(0, 10.0, Some(40.0)), obs(1, 10.0, Some(0.0))];
        assert_eq!(calibrate_humidity(&readings, false), readings);
    }

    #[test]
    fn test_humidity_smoothed_to_zero_is_absent() {
        let readings = vec![
            obs(0, 10.0, None),
            obs(1, 10.0, Some(0.0)),
            obs(2, 10.0, None),
        ];
        let calibrated = calibrate_humidity(&readings, true);
        assert!(calibrated.iter().all(|r| r.humidity.is_none()));
    }

    #[test]
    fn test_humidity_smoothing() {
        let readings = vec![obs(0, 10.0, Some(50.0)), obs(1, 10.0, Some(60.0))];
        let calibrated = calibrate_humidity(&readings, true);
        assert_eq!(calibrated[0].humidity, Some(50.0));
        let second = calibrated[1].humidity.unwrap();
        assert!((second - 59.0).abs() < 1e-9);
    }

    #[test]
    fn test_calibrate_keeps_one_record_per_reading() {
        let readings: Vec<_> = (0..5).map(|i| obs(i, 12.0, Some(45.0))).collect();
        let calibrated = calibrate(&readings, 0.2, true, &RawPressure);
        assert_eq!(calibrated.len(), readings.len());
        for (raw, cal) in readings.iter().zip(&calibrated) {
            assert_eq!(raw.id, cal.id);
            assert_eq!(raw.time, cal.time);
            assert_eq!(raw.pressure, cal.pressure);
        }
    }
}
