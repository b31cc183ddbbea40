//! In-process collaborators, used by the binary and by tests.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use barowatch_core::WeatherConfig;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{WeatherError, WeatherResult};
use crate::ports::{
    AlertDispatcher, CloudStore, LocationProvider, MonitorScheduler, ObservationStore,
    PreferenceStore, TemperatureEstimator,
};
use crate::preferences::PreferenceKey;
use crate::types::{CloudObservation, Coordinate, CurrentWeather, Range, RawObservation, Reading};

const NOTIFY_CAPACITY: usize = 64;

#[derive(Debug)]
pub struct MemoryObservationStore {
    readings: RwLock<Vec<RawObservation>>,
    next_id: AtomicI64,
    failing: AtomicBool,
    changes: broadcast::Sender<()>,
}

impl MemoryObservationStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            readings: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            failing: AtomicBool::new(false),
            changes,
        }
    }

    /// Stores a reading under a fresh id and notifies subscribers. Returns the id.
    pub fn insert(&self, mut reading: RawObservation) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        reading.id = id;
        self.readings.write().push(reading);
        let _ = self.changes.send(());
        id
    }

    pub fn len(&self) -> usize {
        self.readings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Makes every read fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> WeatherResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WeatherError::store("observation store unavailable"));
        }
        Ok(())
    }
}

impl Default for MemoryObservationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObservationStore for MemoryObservationStore {
    async fn get_all(&self) -> WeatherResult<Vec<RawObservation>> {
        self.check()?;
        Ok(self.readings.read().clone())
    }

    async fn get(&self, id: i64) -> WeatherResult<Option<RawObservation>> {
        self.check()?;
        Ok(self.readings.read().iter().find(|r| r.id == id).cloned())
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

#[derive(Debug)]
pub struct MemoryCloudStore {
    clouds: RwLock<Vec<CloudObservation>>,
    next_id: AtomicI64,
    changes: broadcast::Sender<()>,
}

impl MemoryCloudStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            clouds: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            changes,
        }
    }

    pub fn insert(&self, mut cloud: CloudObservation) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        cloud.id = id;
        self.clouds.write().push(cloud);
        let _ = self.changes.send(());
        id
    }
}

impl Default for MemoryCloudStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CloudStore for MemoryCloudStore {
    async fn get_all(&self) -> WeatherResult<Vec<CloudObservation>> {
        Ok(self.clouds.read().clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

/// Same sea-level temperatures every day of the year
#[derive(Debug, Clone)]
pub struct ConstantEstimator {
    low: f64,
    high: f64,
    current: f64,
    failing: bool,
}

impl ConstantEstimator {
    pub fn new(low: f64, high: f64, current: f64) -> Self {
        Self {
            low,
            high,
            current,
            failing: false,
        }
    }

    /// An estimator whose every call fails
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new(0.0, 0.0, 0.0)
        }
    }

    fn check(&self) -> WeatherResult<()> {
        if self.failing {
            return Err(WeatherError::estimator("no climate data"));
        }
        Ok(())
    }

    fn range(&self) -> Range<f64> {
        Range::new(self.low, self.high)
    }
}

#[async_trait]
impl TemperatureEstimator for ConstantEstimator {
    async fn estimate(&self, _location: Coordinate, _time: DateTime<Utc>) -> WeatherResult<f64> {
        self.check()?;
        Ok(self.current)
    }

    async fn estimate_range(
        &self,
        _location: Coordinate,
        _date: NaiveDate,
    ) -> WeatherResult<Range<f64>> {
        self.check()?;
        Ok(self.range())
    }

    async fn estimate_series(
        &self,
        _location: Coordinate,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> WeatherResult<Vec<Reading<f64>>> {
        self.check()?;
        let mut series = Vec::new();
        let mut time = start;
        while time <= end {
            series.push(Reading::new(self.current, time));
            time += Duration::hours(1);
        }
        Ok(series)
    }

    async fn estimate_yearly(
        &self,
        _location: Coordinate,
        year: i32,
    ) -> WeatherResult<Vec<(NaiveDate, Range<f64>)>> {
        self.check()?;
        let first = NaiveDate::from_ymd_opt(year, 1, 1)
            .ok_or_else(|| WeatherError::estimator(format!("invalid year {}", year)))?;
        Ok(first
            .iter_days()
            .take_while(|d| d.year() == year)
            .map(|d| (d, self.range()))
            .collect())
    }
}

#[derive(Debug)]
pub struct FixedLocation {
    location: RwLock<Coordinate>,
    elevation: RwLock<f64>,
}

impl FixedLocation {
    pub fn new(location: Coordinate, elevation: f64) -> Self {
        Self {
            location: RwLock::new(location),
            elevation: RwLock::new(elevation),
        }
    }

    pub fn set(&self, location: Coordinate, elevation: f64) {
        *self.location.write() = location;
        *self.elevation.write() = elevation;
    }
}

impl LocationProvider for FixedLocation {
    fn location(&self) -> Coordinate {
        *self.location.read()
    }

    fn elevation(&self) -> f64 {
        *self.elevation.read()
    }
}

#[derive(Debug)]
pub struct MemoryPreferenceStore {
    config: RwLock<WeatherConfig>,
    changes: broadcast::Sender<PreferenceKey>,
}

impl MemoryPreferenceStore {
    pub fn new(config: WeatherConfig) -> Self {
        let (changes, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            config: RwLock::new(config),
            changes,
        }
    }

    /// Applies `change` and notifies subscribers of `key`.
    pub fn update(&self, key: PreferenceKey, change: impl FnOnce(&mut WeatherConfig)) {
        change(&mut self.config.write());
        debug!("Preference changed: {}", key);
        let _ = self.changes.send(key);
    }
}

impl Default for MemoryPreferenceStore {
    fn default() -> Self {
        Self::new(WeatherConfig::default())
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn weather(&self) -> WeatherConfig {
        self.config.read().clone()
    }

    fn set_monitor_weather(&self, enabled: bool) {
        self.update(PreferenceKey::MonitorWeather, |c| {
            c.monitor_weather = enabled
        });
    }

    fn subscribe(&self) -> broadcast::Receiver<PreferenceKey> {
        self.changes.subscribe()
    }
}

/// Counts monitor cycles instead of reading a sensor
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    cycles: AtomicUsize,
    background_cycles: AtomicUsize,
    running: Mutex<Option<std::time::Duration>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycles(&self) -> usize {
        self.cycles.load(Ordering::SeqCst)
    }

    pub fn background_cycles(&self) -> usize {
        self.background_cycles.load(Ordering::SeqCst)
    }

    /// Frequency the monitor was last started with, `None` when stopped
    pub fn running(&self) -> Option<std::time::Duration> {
        *self.running.lock()
    }
}

#[async_trait]
impl MonitorScheduler for RecordingScheduler {
    fn start(&self, frequency: std::time::Duration) -> WeatherResult<()> {
        *self.running.lock() = Some(frequency);
        Ok(())
    }

    fn stop(&self) -> WeatherResult<()> {
        *self.running.lock() = None;
        Ok(())
    }

    async fn run_monitor_cycle(&self, background: bool) -> WeatherResult<()> {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        if background {
            self.background_cycles.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Keeps every snapshot it was asked to send
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<CurrentWeather>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<CurrentWeather> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl AlertDispatcher for RecordingDispatcher {
    async fn send(&self, weather: &CurrentWeather) -> WeatherResult<()> {
        self.sent.lock().push(weather.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reading(hour: u32) -> RawObservation {
        RawObservation {
            id: 0,
            time: Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap(),
            pressure: 1012.0,
            temperature: 9.0,
            humidity: Some(70.0),
            altitude: 20.0,
            location: Coordinate::new(51.5, -0.1),
        }
    }

    #[tokio::test]
    async fn test_store_assigns_ids_and_notifies() {
        let store = MemoryObservationStore::new();
        let mut rx = store.subscribe();

        let first = store.insert(reading(1));
        let second = store.insert(reading(2));
        assert_ne!(first, second);
        assert!(rx.try_recv().is_ok());

        let fetched = store.get(second).await.unwrap().unwrap();
        assert_eq!(fetched.id, second);
        assert_eq!(store.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_store() {
        let store = MemoryObservationStore::new();
        store.set_failing(true);
        assert!(matches!(store.get_all().await, Err(WeatherError::Store(_))));
        store.set_failing(false);
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_series_is_hourly_and_inclusive() {
        let estimator = ConstantEstimator::new(1.0, 2.0, 1.5);
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let series = estimator
            .estimate_series(Coordinate::ZERO, start, start + Duration::hours(6))
            .await
            .unwrap();
        assert_eq!(series.len(), 7);
    }

    #[test]
    fn test_preference_update_notifies_key() {
        let prefs = MemoryPreferenceStore::default();
        let mut rx = prefs.subscribe();
        prefs.update(PreferenceKey::PressureSmoothing, |c| {
            c.pressure_smoothing = 40.0
        });
        assert_eq!(rx.try_recv().unwrap(), PreferenceKey::PressureSmoothing);
        assert_eq!(prefs.weather().pressure_smoothing, 40.0);
    }
}
