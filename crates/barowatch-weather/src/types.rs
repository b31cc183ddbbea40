use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Geographic location in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const ZERO: Coordinate = Coordinate {
        latitude: 0.0,
        longitude: 0.0,
    };

    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Stores write a zero coordinate when no fix was available.
    pub fn is_zero(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

/// A value at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading<T> {
    pub value: T,
    pub time: DateTime<Utc>,
}

impl<T> Reading<T> {
    pub fn new(value: T, time: DateTime<Utc>) -> Self {
        Self { value, time }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Reading<U> {
        Reading {
            value: f(self.value),
            time: self.time,
        }
    }
}

/// Inclusive range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range<T> {
    pub start: T,
    pub end: T,
}

impl<T> Range<T> {
    pub fn new(start: T, end: T) -> Self {
        Self { start, end }
    }
}

impl Range<f64> {
    /// Smallest range covering every value, `None` when there are none.
    pub fn covering(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values.into_iter().fold(None, |acc, v| match acc {
            None => Some(Range::new(v, v)),
            Some(r) => Some(Range::new(r.start.min(v), r.end.max(v))),
        })
    }
}

/// Reading exactly as the barometer monitor stored it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub id: i64,
    pub time: DateTime<Utc>,
    /// Station pressure in hPa
    pub pressure: f64,
    /// Celsius
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: Option<f64>,
    /// Meters above sea level
    pub altitude: f64,
    pub location: Coordinate,
}

/// Smoothed, sea-level corrected observation. Shares `id` and `time` with its raw reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedObservation {
    pub id: i64,
    pub time: DateTime<Utc>,
    /// Sea-level pressure in hPa
    pub pressure: f64,
    pub temperature: f64,
    pub humidity: Option<f64>,
}

impl CalibratedObservation {
    pub fn pressure_reading(&self) -> Reading<f64> {
        Reading::new(self.pressure, self.time)
    }
}

/// WMO cloud genera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudGenus {
    Cirrus,
    Cirrocumulus,
    Cirrostratus,
    Altocumulus,
    Altostratus,
    Nimbostratus,
    Stratocumulus,
    Stratus,
    Cumulus,
    Cumulonimbus,
}

impl CloudGenus {
    /// Genera that bring precipitation or storms with them
    pub fn is_storm(&self) -> bool {
        matches!(self, Self::Cumulonimbus | Self::Nimbostratus)
    }

    /// High and mid level sheets that tend to precede a warm front
    pub fn is_frontal_precursor(&self) -> bool {
        matches!(self, Self::Cirrus | Self::Cirrostratus | Self::Altostratus)
    }
}

/// A cloud log entry. `genus` is `None` for a logged clear sky.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudObservation {
    pub id: i64,
    pub time: DateTime<Utc>,
    pub genus: Option<CloudGenus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    Clear,
    Overcast,
    Precipitation,
    Rain,
    Snow,
    Wind,
    Storm,
}

impl WeatherCondition {
    /// Most significant first
    pub const PRIORITY: [WeatherCondition; 7] = [
        Self::Storm,
        Self::Wind,
        Self::Snow,
        Self::Rain,
        Self::Precipitation,
        Self::Overcast,
        Self::Clear,
    ];

    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::Overcast => "Overcast",
            Self::Precipitation => "Precipitation",
            Self::Rain => "Rain",
            Self::Snow => "Snow",
            Self::Wind => "Wind",
            Self::Storm => "Storm",
        }
    }
}

/// The condition that best describes a set, `None` for an empty set.
pub fn primary_condition(conditions: &BTreeSet<WeatherCondition>) -> Option<WeatherCondition> {
    WeatherCondition::PRIORITY
        .into_iter()
        .find(|c| conditions.contains(c))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherFront {
    Warm,
    Cold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureCharacteristic {
    FallingFast,
    Falling,
    Steady,
    Rising,
    RisingFast,
}

impl PressureCharacteristic {
    pub fn is_rapid(&self) -> bool {
        matches!(self, Self::FallingFast | Self::RisingFast)
    }

    pub fn is_rising(&self) -> bool {
        matches!(self, Self::Rising | Self::RisingFast)
    }

    pub fn is_falling(&self) -> bool {
        matches!(self, Self::Falling | Self::FallingFast)
    }
}

/// Direction and unsigned rate of pressure change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PressureTendency {
    pub characteristic: PressureCharacteristic,
    pub amount: f64,
}

impl PressureTendency {
    pub fn steady() -> Self {
        Self {
            characteristic: PressureCharacteristic::Steady,
            amount: 0.0,
        }
    }
}

/// One forecast horizon step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub time: DateTime<Utc>,
    pub conditions: BTreeSet<WeatherCondition>,
    pub front: Option<WeatherFront>,
    pub tendency: PressureTendency,
}

/// When the forecast conditions are expected to arrive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrivalTime {
    Now,
    VerySoon,
    Soon,
    Later,
}

impl ArrivalTime {
    /// Offset from now at which the conditions are expected
    pub fn offset(arrival: Option<ArrivalTime>) -> chrono::Duration {
        match arrival {
            None | Some(ArrivalTime::Now) => chrono::Duration::zero(),
            Some(ArrivalTime::VerySoon) => chrono::Duration::hours(1),
            Some(ArrivalTime::Soon) => chrono::Duration::hours(2),
            Some(ArrivalTime::Later) => chrono::Duration::hours(8),
        }
    }
}

/// Elevation adjusted historical temperatures for today, in Celsius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperaturePrediction {
    pub average: f64,
    pub low: f64,
    pub high: f64,
    pub current: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherAlert {
    Storm,
    Cold,
    Hot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherPrediction {
    /// Short term conditions
    pub hourly: BTreeSet<WeatherCondition>,
    /// Long term conditions
    pub daily: BTreeSet<WeatherCondition>,
    pub front: Option<WeatherFront>,
    pub arrival: Option<ArrivalTime>,
    pub temperature: Option<TemperaturePrediction>,
    pub alerts: Vec<WeatherAlert>,
}

impl WeatherPrediction {
    pub fn primary_hourly(&self) -> Option<WeatherCondition> {
        primary_condition(&self.hourly)
    }

    pub fn primary_daily(&self) -> Option<WeatherCondition> {
        primary_condition(&self.daily)
    }
}

/// The memoized snapshot handed to every reader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub prediction: WeatherPrediction,
    /// Amount is in hPa per 3 hours
    pub tendency: PressureTendency,
    pub observation: Option<CalibratedObservation>,
    pub clouds: Option<CloudObservation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureState {
    On,
    Off,
    Unavailable,
}

/// Sensors present on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceCapabilities {
    pub has_barometer: bool,
    pub has_hygrometer: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_condition_priority() {
        let conditions: BTreeSet<_> = [
            WeatherCondition::Overcast,
            WeatherCondition::Storm,
            WeatherCondition::Precipitation,
        ]
        .into_iter()
        .collect();
        assert_eq!(
            primary_condition(&conditions),
            Some(WeatherCondition::Storm)
        );
    }

    #[test]
    fn test_primary_condition_empty() {
        assert_eq!(primary_condition(&BTreeSet::new()), None);
    }

    #[test]
    fn test_range_covering() {
        let range = Range::covering([4.0, -2.0, 7.5]).unwrap();
        assert_eq!(range, Range::new(-2.0, 7.5));
        assert!(Range::covering(Vec::<f64>::new()).is_none());
    }

    #[test]
    fn test_storm_genera() {
        assert!(CloudGenus::Cumulonimbus.is_storm());
        assert!(CloudGenus::Nimbostratus.is_storm());
        assert!(!CloudGenus::Cumulus.is_storm());
    }

    #[test]
    fn test_characteristic_families() {
        assert!(PressureCharacteristic::RisingFast.is_rapid());
        assert!(PressureCharacteristic::FallingFast.is_rapid());
        assert!(!PressureCharacteristic::Falling.is_rapid());
        assert!(PressureCharacteristic::Rising.is_rising());
        assert!(!PressureCharacteristic::Steady.is_falling());
    }

    #[test]
    fn test_arrival_offsets() {
        assert_eq!(ArrivalTime::offset(None), chrono::Duration::zero());
        assert_eq!(
            ArrivalTime::offset(Some(ArrivalTime::Soon)),
            chrono::Duration::hours(2)
        );
        assert_eq!(
            ArrivalTime::offset(Some(ArrivalTime::Later)),
            chrono::Duration::hours(8)
        );
    }

    #[test]
    fn test_conditions_serialize_snake_case() {
        let json = serde_json::to_string(&WeatherCondition::Precipitation).unwrap();
        assert_eq!(json, "\"precipitation\"");
    }
}
