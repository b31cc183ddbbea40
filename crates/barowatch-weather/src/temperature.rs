//! Historical temperature prediction, adjusted to the observer's elevation.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::error::{WeatherError, WeatherResult};
use crate::ports::{LocationProvider, ObservationStore, TemperatureEstimator};
use crate::types::{Coordinate, Range, Reading, TemperaturePrediction};

/// Standard atmosphere lapse rate, °C per meter
pub const LAPSE_RATE: f64 = 0.0065;

/// Moves a temperature from one elevation to another.
pub fn lapse(temperature: f64, from_elevation: f64, to_elevation: f64) -> f64 {
    temperature - LAPSE_RATE * (to_elevation - from_elevation)
}

/// Where temperatures are estimated for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub location: Coordinate,
    /// Meters above sea level
    pub elevation: f64,
}

/// Fills in whichever of location and elevation the caller left out.
///
/// Prefers the newest reading stored at or before `now` and falls back to
/// the live location provider when there is none, or when it was stored
/// without a fix.
pub async fn resolve_placement(
    store: &dyn ObservationStore,
    provider: &dyn LocationProvider,
    location: Option<Coordinate>,
    elevation: Option<f64>,
    now: DateTime<Utc>,
) -> Placement {
    if let (Some(location), Some(elevation)) = (location, elevation) {
        return Placement {
            location,
            elevation,
        };
    }

    let latest = match store.get_all().await {
        Ok(readings) => readings
            .into_iter()
            .filter(|r| r.time <= now)
            .max_by_key(|r| r.time),
        Err(e) => {
            warn!("Falling back to live location: {}", e);
            None
        }
    };

    let (stored_location, stored_elevation) = match latest {
        Some(r) if !r.location.is_zero() => (r.location, r.altitude),
        Some(r) => (provider.location(), r.altitude),
        None => (provider.location(), provider.elevation()),
    };

    Placement {
        location: location.unwrap_or(stored_location),
        elevation: elevation.unwrap_or(stored_elevation),
    }
}

/// Wraps the historical estimator and corrects its sea-level values with the lapse rate.
#[derive(Clone)]
pub struct TemperaturePredictor {
    estimator: Arc<dyn TemperatureEstimator>,
}

impl TemperaturePredictor {
    pub fn new(estimator: Arc<dyn TemperatureEstimator>) -> Self {
        Self { estimator }
    }

    pub async fn forecast(
        &self,
        placement: Placement,
        time: DateTime<Utc>,
    ) -> WeatherResult<Reading<f64>> {
        let sea_level = self.estimator.estimate(placement.location, time).await?;
        Ok(Reading::new(adjust(sea_level, placement), time))
    }

    pub async fn forecasts(
        &self,
        placement: Placement,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> WeatherResult<Vec<Reading<f64>>> {
        let series = self
            .estimator
            .estimate_series(placement.location, start, end)
            .await?;
        Ok(series
            .into_iter()
            .map(|r| r.map(|t| adjust(t, placement)))
            .collect())
    }

    pub async fn range(&self, placement: Placement, date: NaiveDate) -> WeatherResult<Range<f64>> {
        let range = self
            .estimator
            .estimate_range(placement.location, date)
            .await?;
        Ok(adjust_range(range, placement))
    }

    pub async fn ranges(
        &self,
        placement: Placement,
        year: i32,
    ) -> WeatherResult<Vec<(NaiveDate, Range<f64>)>> {
        let days = self
            .estimator
            .estimate_yearly(placement.location, year)
            .await?;
        Ok(days
            .into_iter()
            .map(|(date, range)| (date, adjust_range(range, placement)))
            .collect())
    }

    /// Today's low, high and current temperature. `None` when the estimator fails.
    pub async fn predict(
        &self,
        placement: Placement,
        time: DateTime<Utc>,
    ) -> Option<TemperaturePrediction> {
        let result = async {
            let range = self.range(placement, time.date_naive()).await?;
            let current = self.forecast(placement, time).await?;
            Ok::<_, WeatherError>(TemperaturePrediction {
                average: (range.start + range.end) / 2.0,
                low: range.start,
                high: range.end,
                current: current.value,
            })
        }
        .await;

        match result {
            Ok(prediction) => Some(prediction),
            Err(e) => {
                warn!("Temperature prediction unavailable: {}", e);
                None
            }
        }
    }

    /// Low and high of the hourly estimates between `start` and `end`.
    /// `None` when the estimator fails or has nothing for the window.
    pub async fn range_between(
        &self,
        placement: Placement,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<Range<f64>> {
        match self.forecasts(placement, start, end).await {
            Ok(series) => {
                let range = Range::covering(series.into_iter().map(|r| r.value));
                if range.is_none() {
                    debug!("No temperature estimates between {} and {}", start, end);
                }
                range
            }
            Err(e) => {
                warn!("Temperature range unavailable: {}", e);
                None
            }
        }
    }
}

fn adjust(sea_level: f64, placement: Placement) -> f64 {
    lapse(sea_level, 0.0, placement.elevation)
}

fn adjust_range(range: Range<f64>, placement: Placement) -> Range<f64> {
    Range::new(adjust(range.start, placement), adjust(range.end, placement))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{ConstantEstimator, FixedLocation, MemoryObservationStore};
    use crate::types::RawObservation;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()
    }

    fn placement(elevation: f64) -> Placement {
        Placement {
            location: Coordinate::new(45.0, -122.0),
            elevation,
        }
    }

    #[test]
    fn test_lapse_rate() {
        assert!((lapse(15.0, 0.0, 1000.0) - 8.5).abs() < 1e-9);
        assert!((lapse(8.5, 1000.0, 0.0) - 15.0).abs() < 1e-9);
        assert_eq!(lapse(20.0, 300.0, 300.0), 20.0);
    }

    #[tokio::test]
    async fn test_predict_adjusts_for_elevation() {
        let estimator = ConstantEstimator::new(10.0, 20.0, 18.0);
        let predictor = TemperaturePredictor::new(Arc::new(estimator));
        let prediction = predictor.predict(placement(2000.0), now()).await.unwrap();
        assert!((prediction.low - -3.0).abs() < 1e-9);
        assert!((prediction.high - 7.0).abs() < 1e-9);
        assert!((prediction.current - 5.0).abs() < 1e-9);
        assert!((prediction.average - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_predict_failure_is_none() {
        let predictor = TemperaturePredictor::new(Arc::new(ConstantEstimator::failing()));
        assert!(predictor.predict(placement(0.0), now()).await.is_none());
        let range = predictor.range_between(placement(0.0), now(), now()).await;
        assert!(range.is_none());
        assert!(predictor.forecast(placement(0.0), now()).await.is_err());
    }

    #[tokio::test]
    async fn test_range_between_covers_hourly_estimates() {
        let predictor = TemperaturePredictor::new(Arc::new(ConstantEstimator::new(0.0, 10.0, 6.0)));
        let range = predictor
            .range_between(placement(0.0), now(), now() + Duration::hours(6))
            .await
            .unwrap();
        assert_eq!(range, Range::new(6.0, 6.0));
    }

    #[tokio::test]
    async fn test_ranges_cover_the_year() {
        let predictor = TemperaturePredictor::new(Arc::new(ConstantEstimator::new(0.0, 10.0, 6.0)));
        let days = predictor.ranges(placement(1000.0), 2024).await.unwrap();
        assert_eq!(days.len(), 366);
        assert!((days[0].1.end - 3.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_placement_prefers_latest_reading() {
        let store = MemoryObservationStore::new();
        let provider = FixedLocation::new(Coordinate::new(1.0, 1.0), 50.0);
        for (i, altitude) in [(0, 100.0), (2, 300.0), (1, 200.0)] {
            store.insert(RawObservation {
                id: 0,
                time: now() + Duration::hours(i),
                pressure: 1000.0,
                temperature: 20.0,
                humidity: None,
                altitude,
                location: Coordinate::new(40.0 + i as f64, 8.0),
            });
        }

        let later = now() + Duration::hours(2);
        let resolved = resolve_placement(&store, &provider, None, None, later).await;
        assert_eq!(resolved.location, Coordinate::new(42.0, 8.0));
        assert_eq!(resolved.elevation, 300.0);

        let explicit = resolve_placement(&store, &provider, None, Some(5.0), later).await;
        assert_eq!(explicit.elevation, 5.0);
        assert_eq!(explicit.location, Coordinate::new(42.0, 8.0));
    }

    #[tokio::test]
    async fn test_placement_falls_back_to_live_location() {
        let store = MemoryObservationStore::new();
        let provider = FixedLocation::new(Coordinate::new(1.0, 2.0), 75.0);
        let resolved = resolve_placement(&store, &provider, None, None, now()).await;
        assert_eq!(
            resolved,
            Placement {
                location: Coordinate::new(1.0, 2.0),
                elevation: 75.0,
            }
        );
    }

    #[tokio::test]
    async fn test_placement_ignores_future_readings() {
        let store = MemoryObservationStore::new();
        let provider = FixedLocation::new(Coordinate::new(1.0, 1.0), 50.0);
        for (minutes, altitude) in [(-30, 0.0), (600, 2000.0)] {
            store.insert(RawObservation {
                id: 0,
                time: now() + Duration::minutes(minutes),
                pressure: 1000.0,
                temperature: 20.0,
                humidity: None,
                altitude,
                location: Coordinate::new(40.0, 8.0),
            });
        }

        let resolved = resolve_placement(&store, &provider, None, None, now()).await;
        assert_eq!(resolved.elevation, 0.0);

        let estimator = ConstantEstimator::new(10.0, 20.0, 15.0);
        let predictor = TemperaturePredictor::new(Arc::new(estimator));
        let current = predictor.forecast(resolved, now()).await.unwrap();
        assert_eq!(current.value, 15.0);
    }
}
