//! Memoized current weather, invalidated by new readings and calibration settings.
//!
//! The snapshot is guarded by its own lock and refreshed by at most one task
//! at a time. Logging a new reading goes through a second, independent lock.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use barowatch_core::WeatherConfig;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alerts::{temperature_alerts, weather_alerts};
use crate::calibration::{self, strategy_for};
use crate::error::{WeatherError, WeatherResult};
use crate::forecast::{estimate_arrival_time, last_cloud, ForecastEngine};
use crate::ports::{
    AlertDispatcher, CloudStore, LocationProvider, MonitorScheduler, ObservationStore,
    PreferenceStore, TemperatureEstimator,
};
use crate::preferences::PreferenceKey;
use crate::temperature::{resolve_placement, Placement, TemperaturePredictor};
use crate::topic::{DistinctTopic, Topic};
use crate::types::{
    ArrivalTime, CalibratedObservation, CloudObservation, Coordinate, CurrentWeather,
    DeviceCapabilities, FeatureState, PressureTendency, Range, RawObservation, Reading,
    WeatherPrediction,
};

/// Hours of temperature estimates considered for precipitation type
const ARRIVAL_WINDOW_HOURS: i64 = 6;

/// Everything the subsystem talks to
#[derive(Clone)]
pub struct Collaborators {
    pub observations: Arc<dyn ObservationStore>,
    pub clouds: Arc<dyn CloudStore>,
    pub estimator: Arc<dyn TemperatureEstimator>,
    pub location: Arc<dyn LocationProvider>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub scheduler: Arc<dyn MonitorScheduler>,
    pub dispatcher: Arc<dyn AlertDispatcher>,
    pub capabilities: DeviceCapabilities,
}

enum Slot {
    Stale,
    Refreshing {
        epoch: u64,
        done: watch::Receiver<Option<Arc<CurrentWeather>>>,
    },
    Valid {
        epoch: u64,
        weather: Arc<CurrentWeather>,
    },
}

pub struct WeatherSubsystem {
    observations: Arc<dyn ObservationStore>,
    clouds: Arc<dyn CloudStore>,
    location: Arc<dyn LocationProvider>,
    preferences: Arc<dyn PreferenceStore>,
    scheduler: Arc<dyn MonitorScheduler>,
    dispatcher: Arc<dyn AlertDispatcher>,
    capabilities: DeviceCapabilities,
    predictor: TemperaturePredictor,

    /// Bumped by every invalidation; a snapshot is valid for the epoch it was computed at
    epoch: AtomicU64,
    slot: Mutex<Slot>,
    refreshes: AtomicUsize,
    update_lock: tokio::sync::Mutex<()>,

    weather_changed: Topic<()>,
    monitor_state: DistinctTopic<FeatureState>,
    monitor_frequency: DistinctTopic<std::time::Duration>,
}

impl WeatherSubsystem {
    pub fn new(collaborators: Collaborators) -> Arc<Self> {
        let prefs = collaborators.preferences.weather();
        let state = monitor_state(&prefs, collaborators.capabilities);
        let frequency = prefs.update_frequency();

        info!(
            "Weather subsystem started (monitor {:?}, every {:?})",
            state, frequency
        );

        Arc::new(Self {
            observations: collaborators.observations,
            clouds: collaborators.clouds,
            location: collaborators.location,
            preferences: collaborators.preferences,
            scheduler: collaborators.scheduler,
            dispatcher: collaborators.dispatcher,
            capabilities: collaborators.capabilities,
            predictor: TemperaturePredictor::new(collaborators.estimator),
            epoch: AtomicU64::new(0),
            slot: Mutex::new(Slot::Stale),
            refreshes: AtomicUsize::new(0),
            update_lock: tokio::sync::Mutex::new(()),
            weather_changed: Topic::new(),
            monitor_state: DistinctTopic::new(state),
            monitor_frequency: DistinctTopic::new(frequency),
        })
    }

    /// Current weather, computing it first if anything changed since the last call.
    ///
    /// Concurrent callers share one computation. The computation runs on its
    /// own task and finishes even if every caller goes away.
    pub async fn get_snapshot(self: &Arc<Self>) -> WeatherResult<Arc<CurrentWeather>> {
        let requested = self.epoch.load(Ordering::SeqCst);

        loop {
            let (refresh_epoch, mut done) = {
                let mut slot = self.slot.lock();
                match &*slot {
                    Slot::Valid { epoch, weather } if *epoch >= requested => {
                        debug!("Weather cache hit");
                        return Ok(Arc::clone(weather));
                    }
                    Slot::Refreshing { epoch, done } => (*epoch, done.clone()),
                    Slot::Valid { .. } | Slot::Stale => {
                        let epoch = self.epoch.load(Ordering::SeqCst);
                        let (tx, rx) = watch::channel(None);
                        *slot = Slot::Refreshing {
                            epoch,
                            done: rx.clone(),
                        };
                        debug!("Refreshing weather at epoch {}", epoch);
                        tokio::spawn(Arc::clone(self).refresh(epoch, tx));
                        (epoch, rx)
                    }
                }
            };

            let finished = done
                .wait_for(Option::is_some)
                .await
                .map(|value| value.clone());

            match finished {
                Ok(Some(weather)) if refresh_epoch >= requested => return Ok(weather),
                // An older refresh finished; the next pass starts a current one
                Ok(_) => continue,
                Err(_) => {
                    error!("Weather refresh ended without a result");
                    let mut slot = self.slot.lock();
                    if let Slot::Refreshing { epoch, .. } = &*slot {
                        if *epoch == refresh_epoch {
                            *slot = Slot::Stale;
                        }
                    }
                    return Err(WeatherError::RefreshAborted);
                }
            }
        }
    }

    async fn refresh(
        self: Arc<Self>,
        epoch: u64,
        done: watch::Sender<Option<Arc<CurrentWeather>>>,
    ) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let weather = Arc::new(self.populate(Utc::now()).await);

        *self.slot.lock() = Slot::Valid {
            epoch,
            weather: Arc::clone(&weather),
        };
        done.send_replace(Some(weather));
    }

    /// Number of times the snapshot has been computed. Diagnostic counter.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Forces the next snapshot to be recomputed.
    pub fn invalidate(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Weather invalidated (epoch {})", epoch);
        self.weather_changed.publish(());
    }

    async fn populate(&self, now: DateTime<Utc>) -> CurrentWeather {
        let prefs = self.preferences.weather();
        let history = self.calibrated_history_at(&prefs, now).await;
        let clouds = self.cloud_history_or_empty().await;
        let pressures: Vec<Reading<f64>> = history
            .iter()
            .map(CalibratedObservation::pressure_reading)
            .collect();

        let engine = ForecastEngine::from_prefs(&prefs);
        let last = history.last().cloned();
        let placement = self
            .placement_for_reading(last.as_ref().map(|o| o.id))
            .await;

        // Precipitation type depends on the temperature when the weather arrives
        let untyped = engine.compute_forecast(&pressures, &clouds, None, now);
        let arrival = estimate_arrival_time(&untyped, &clouds, now);
        let start = now + ArrivalTime::offset(arrival);
        let end = start + Duration::hours(ARRIVAL_WINDOW_HOURS);
        let temperatures = self.predictor.range_between(placement, start, end).await;
        let forecast = engine.compute_forecast(&pressures, &clouds, temperatures, now);

        let tendency = forecast
            .first()
            .map(|f| f.tendency)
            .unwrap_or_else(PressureTendency::steady);
        let hourly = forecast
            .first()
            .map(|f| f.conditions.clone())
            .unwrap_or_default();
        let daily = forecast
            .last()
            .map(|f| f.conditions.clone())
            .unwrap_or_default();
        let front = forecast.first().and_then(|f| f.front);

        let temperature = self.predictor.predict(placement, now).await;
        let mut alerts = weather_alerts(&hourly);
        alerts.extend(temperature_alerts(temperature.as_ref()));

        debug!(
            "Weather computed from {} readings: {:?}, arrival {:?}",
            history.len(), tendency.characteristic, arrival
        );

        CurrentWeather {
            prediction: WeatherPrediction {
                hourly,
                daily,
                front,
                arrival,
                temperature,
                alerts,
            },
            tendency: PressureTendency {
                characteristic: tendency.characteristic,
                amount: tendency.amount * 3.0,
            },
            observation: last,
            clouds: last_cloud(&clouds, now).cloned(),
        }
    }

    /// Readings up to now sorted by time, with missing locations filled from the live fix.
    pub async fn get_raw_history(&self) -> WeatherResult<Vec<RawObservation>> {
        self.raw_history_at(Utc::now()).await
    }

    async fn raw_history_at(&self, now: DateTime<Utc>) -> WeatherResult<Vec<RawObservation>> {
        let mut readings = self.observations.get_all().await?;
        readings.retain(|r| r.time <= now);
        readings.sort_by_key(|r| r.time);

        let live = self.location.location();
        for reading in readings.iter_mut().filter(|r| r.location.is_zero()) {
            reading.location = live;
        }
        Ok(readings)
    }

    /// Calibrated readings within the pressure history window.
    pub async fn get_calibrated_history(&self) -> WeatherResult<Vec<CalibratedObservation>> {
        let prefs = self.preferences.weather();
        let now = Utc::now();
        let raw = self.raw_history_at(now).await?;
        Ok(self.calibrate(&raw, &prefs, now))
    }

    async fn calibrated_history_at(
        &self,
        prefs: &WeatherConfig,
        now: DateTime<Utc>,
    ) -> Vec<CalibratedObservation> {
        match self.raw_history_at(now).await {
            Ok(raw) => self.calibrate(&raw, prefs, now),
            Err(e) => {
                warn!("Weather history unavailable: {}", e);
                Vec::new()
            }
        }
    }

    fn calibrate(
        &self,
        raw: &[RawObservation],
        prefs: &WeatherConfig,
        now: DateTime<Utc>,
    ) -> Vec<CalibratedObservation> {
        let cutoff = now - Duration::hours(i64::from(prefs.pressure_history_hours));
        let start = raw.partition_point(|r| r.time < cutoff);
        let strategy = strategy_for(prefs);
        calibration::calibrate(
            &raw[start..],
            prefs.temperature_smoothing,
            self.capabilities.has_hygrometer,
            strategy.as_ref(),
        )
    }

    pub async fn get_cloud_history(&self) -> WeatherResult<Vec<CloudObservation>> {
        let mut clouds = self.clouds.get_all().await?;
        clouds.sort_by_key(|c| c.time);
        Ok(clouds)
    }

    async fn cloud_history_or_empty(&self) -> Vec<CloudObservation> {
        self.get_cloud_history().await.unwrap_or_else(|e| {
            warn!("Cloud history unavailable: {}", e);
            Vec::new()
        })
    }

    /// Location and altitude the reading was taken at, or the live fix.
    async fn placement_for_reading(&self, id: Option<i64>) -> Placement {
        let reading = match id {
            Some(id) => self.observations.get(id).await.unwrap_or_else(|e| {
                warn!("Reading {} unavailable: {}", id, e);
                None
            }),
            None => None,
        };

        match reading {
            Some(r) => Placement {
                location: if r.location.is_zero() {
                    self.location.location()
                } else {
                    r.location
                },
                elevation: r.altitude,
            },
            None => Placement {
                location: self.location.location(),
                elevation: self.location.elevation(),
            },
        }
    }

    async fn resolve(&self, location: Option<Coordinate>, elevation: Option<f64>) -> Placement {
        resolve_placement(
            self.observations.as_ref(),
            self.location.as_ref(),
            location,
            elevation,
            Utc::now(),
        )
        .await
    }

    pub async fn get_temperature_forecast(
        &self,
        time: DateTime<Utc>,
        location: Option<Coordinate>,
        elevation: Option<f64>,
    ) -> WeatherResult<Reading<f64>> {
        let placement = self.resolve(location, elevation).await;
        self.predictor.forecast(placement, time).await
    }

    pub async fn get_temperature_forecasts(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        location: Option<Coordinate>,
        elevation: Option<f64>,
    ) -> WeatherResult<Vec<Reading<f64>>> {
        let placement = self.resolve(location, elevation).await;
        self.predictor.forecasts(placement, start, end).await
    }

    pub async fn get_temperature_range(
        &self,
        date: NaiveDate,
        location: Option<Coordinate>,
        elevation: Option<f64>,
    ) -> WeatherResult<Range<f64>> {
        let placement = self.resolve(location, elevation).await;
        self.predictor.range(placement, date).await
    }

    pub async fn get_temperature_ranges(
        &self,
        year: i32,
        location: Option<Coordinate>,
        elevation: Option<f64>,
    ) -> WeatherResult<Vec<(NaiveDate, Range<f64>)>> {
        let placement = self.resolve(location, elevation).await;
        self.predictor.ranges(placement, year).await
    }

    pub fn enable_monitor(&self) -> WeatherResult<()> {
        self.preferences.set_monitor_weather(true);
        self.refresh_monitor_state();
        self.scheduler.start(self.get_monitor_frequency())
    }

    pub fn disable_monitor(&self) -> WeatherResult<()> {
        self.preferences.set_monitor_weather(false);
        self.refresh_monitor_state();
        self.scheduler.stop()
    }

    /// Logs a new reading, unless the last one is recent enough, in which
    /// case only the alerts for the current snapshot are sent.
    pub async fn update_weather(self: &Arc<Self>, background: bool) -> WeatherResult<()> {
        let _guard = self.update_lock.lock().await;

        let now = Utc::now();
        let last = self
            .observations
            .get_all()
            .await?
            .into_iter()
            .map(|r| r.time)
            .filter(|t| *t <= now)
            .max();
        let min_interval = Duration::from_std(self.get_monitor_frequency() / 3)
            .map_err(|e| WeatherError::Scheduler(e.to_string()))?;

        if let Some(last) = last {
            if (now - last).abs() < min_interval {
                debug!("Last reading at {} is recent, only sending alerts", last);
                let weather = self.get_snapshot().await?;
                return self.dispatcher.send(&weather).await;
            }
        }

        info!("Running weather monitor (background: {})", background);
        self.scheduler.run_monitor_cycle(background).await
    }

    pub fn get_monitor_state(&self) -> FeatureState {
        self.monitor_state.get()
    }

    pub fn get_monitor_frequency(&self) -> std::time::Duration {
        self.monitor_frequency.get()
    }

    /// Fires on every invalidation, before anything is recomputed
    pub fn subscribe_weather_changed(&self) -> broadcast::Receiver<()> {
        self.weather_changed.subscribe()
    }

    pub fn subscribe_monitor_state(&self) -> broadcast::Receiver<FeatureState> {
        self.monitor_state.subscribe()
    }

    pub fn subscribe_monitor_frequency(&self) -> broadcast::Receiver<std::time::Duration> {
        self.monitor_frequency.subscribe()
    }

    fn refresh_monitor_state(&self) {
        let state = monitor_state(&self.preferences.weather(), self.capabilities);
        if self.monitor_state.publish(state) {
            info!("Weather monitor is now {:?}", state);
        }
    }

    fn refresh_monitor_frequency(&self) {
        let frequency = self.preferences.weather().update_frequency();
        if self.monitor_frequency.publish(frequency) {
            info!("Weather monitor frequency is now {:?}", frequency);
        }
    }

    pub fn on_preference_changed(&self, key: PreferenceKey) {
        if key.invalidates_weather() {
            self.invalidate();
        }
        if key.affects_monitor_state() {
            self.refresh_monitor_state();
        }
        if key.affects_monitor_frequency() {
            self.refresh_monitor_frequency();
        }
    }

    /// Follows store and preference notifications until `cancel` fires.
    pub fn watch(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let mut readings = self.observations.subscribe();
        let mut clouds = self.clouds.subscribe();
        let mut preferences = self.preferences.subscribe();
        let this = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = readings.recv() => {
                        if is_closed(&changed) {
                            break;
                        }
                        this.invalidate();
                    }
                    changed = clouds.recv() => {
                        if is_closed(&changed) {
                            break;
                        }
                        this.invalidate();
                    }
                    changed = preferences.recv() => match changed {
                        Ok(key) => this.on_preference_changed(key),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Missed {} preference changes", skipped);
                            this.on_preference_changed_all();
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!("Weather listener stopped");
        })
    }

    fn on_preference_changed_all(&self) {
        self.invalidate();
        self.refresh_monitor_state();
        self.refresh_monitor_frequency();
    }
}

/// A lagged receiver still means something was written
fn is_closed<T>(result: &Result<T, RecvError>) -> bool {
    matches!(result, Err(RecvError::Closed))
}

pub fn monitor_state(prefs: &WeatherConfig, capabilities: DeviceCapabilities) -> FeatureState {
    if !capabilities.has_barometer {
        FeatureState::Unavailable
    } else if prefs.monitor_weather && !prefs.low_power_mode {
        FeatureState::On
    } else {
        FeatureState::Off
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(has_barometer: bool) -> DeviceCapabilities {
        DeviceCapabilities {
            has_barometer,
            has_hygrometer: false,
        }
    }

    #[test]
    fn test_monitor_state_rules() {
        let mut prefs = WeatherConfig::default();
        let missing = capabilities(false);
        assert_eq!(monitor_state(&prefs, capabilities(true)), FeatureState::On);
        assert_eq!(monitor_state(&prefs, missing), FeatureState::Unavailable);

        prefs.low_power_mode = true;
        assert_eq!(monitor_state(&prefs, capabilities(true)), FeatureState::Off);

        prefs.low_power_mode = false;
        prefs.monitor_weather = false;
        assert_eq!(monitor_state(&prefs, capabilities(true)), FeatureState::Off);
        assert_eq!(monitor_state(&prefs, missing), FeatureState::Unavailable);
    }

    #[test]
    fn test_lagged_is_not_closed() {
        assert!(!is_closed::<()>(&Err(RecvError::Lagged(3))));
        assert!(is_closed::<()>(&Err(RecvError::Closed)));
        assert!(!is_closed(&Ok(())));
    }
}
