//! Collaborators the weather subsystem depends on.
//!
//! Stores notify writes through `tokio::sync::broadcast`; a lagged receiver
//! is treated the same as a notification.

use async_trait::async_trait;
use barowatch_core::WeatherConfig;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::broadcast;

use crate::error::WeatherResult;
use crate::preferences::PreferenceKey;
use crate::types::{CloudObservation, Coordinate, CurrentWeather, Range, RawObservation, Reading};

/// Barometer readings written by the monitor
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// All readings, in no particular order
    async fn get_all(&self) -> WeatherResult<Vec<RawObservation>>;

    async fn get(&self, id: i64) -> WeatherResult<Option<RawObservation>>;

    /// Fires after every write
    fn subscribe(&self) -> broadcast::Receiver<()>;
}

/// User logged cloud observations
#[async_trait]
pub trait CloudStore: Send + Sync {
    async fn get_all(&self) -> WeatherResult<Vec<CloudObservation>>;

    fn subscribe(&self) -> broadcast::Receiver<()>;
}

/// Historical climate model. Temperatures are Celsius at sea level.
#[async_trait]
pub trait TemperatureEstimator: Send + Sync {
    async fn estimate(&self, location: Coordinate, time: DateTime<Utc>) -> WeatherResult<f64>;

    /// Daily low and high
    async fn estimate_range(
        &self,
        location: Coordinate,
        date: NaiveDate,
    ) -> WeatherResult<Range<f64>>;

    /// Hourly estimates between `start` and `end`, inclusive
    async fn estimate_series(
        &self,
        location: Coordinate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> WeatherResult<Vec<Reading<f64>>>;

    /// Daily low and high for every day of `year`
    async fn estimate_yearly(
        &self,
        location: Coordinate,
        year: i32,
    ) -> WeatherResult<Vec<(NaiveDate, Range<f64>)>>;
}

/// Last known fix from the location subsystem
pub trait LocationProvider: Send + Sync {
    fn location(&self) -> Coordinate;

    /// Meters above sea level
    fn elevation(&self) -> f64;
}

pub trait PreferenceStore: Send + Sync {
    fn weather(&self) -> WeatherConfig;

    fn set_monitor_weather(&self, enabled: bool);

    /// Fires with the key of every changed setting
    fn subscribe(&self) -> broadcast::Receiver<PreferenceKey>;
}

/// Drives the periodic barometer monitor
#[async_trait]
pub trait MonitorScheduler: Send + Sync {
    fn start(&self, frequency: std::time::Duration) -> WeatherResult<()>;

    fn stop(&self) -> WeatherResult<()>;

    /// Take a reading and store it. Alerts are sent by the cycle itself.
    async fn run_monitor_cycle(&self, background: bool) -> WeatherResult<()>;
}

#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn send(&self, weather: &CurrentWeather) -> WeatherResult<()>;
}
