//! Derived weather for Barowatch
//!
//! Turns stored barometer readings and cloud logs into a memoized current
//! weather snapshot: calibration, pressure tendency, forecast, historical
//! temperatures and alerts.

pub mod alerts;
pub mod calibration;
pub mod error;
pub mod forecast;
pub mod memory;
pub mod ports;
pub mod preferences;
pub mod subsystem;
pub mod temperature;
pub mod topic;
pub mod types;

pub use error::{WeatherError, WeatherResult};
pub use forecast::{ForecastEngine, ForecastSettings};
pub use ports::{
    AlertDispatcher, CloudStore, LocationProvider, MonitorScheduler, ObservationStore,
    PreferenceStore, TemperatureEstimator,
};
pub use preferences::PreferenceKey;
pub use subsystem::{Collaborators, WeatherSubsystem};
pub use temperature::{Placement, TemperaturePredictor};
pub use types::*;
