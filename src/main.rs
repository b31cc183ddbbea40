use std::sync::Arc;

use anyhow::Result;
use barowatch_core::{AppError, Config};
use barowatch_weather::memory::{
    ConstantEstimator, FixedLocation, MemoryCloudStore, MemoryObservationStore,
    MemoryPreferenceStore, RecordingDispatcher, RecordingScheduler,
};
use barowatch_weather::{
    Collaborators, Coordinate, CurrentWeather, DeviceCapabilities, RawObservation, WeatherSubsystem,
};
use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;

/// Demo station near Zurich
const STATION: Coordinate = Coordinate {
    latitude: 47.37,
    longitude: 8.54,
};
const STATION_ELEVATION_M: f64 = 408.0;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize core
    barowatch_core::init()?;

    let (config, _) = Config::load_validated().map_err(|e| {
        let err = AppError::from(e);
        tracing::error!("{}", err.user_message());
        err
    })?;
    tracing::info!("Config directory: {}", config.config_dir.display());

    let observations = Arc::new(MemoryObservationStore::new());
    seed_readings(&observations);

    let weather = WeatherSubsystem::new(Collaborators {
        observations,
        clouds: Arc::new(MemoryCloudStore::new()),
        estimator: Arc::new(ConstantEstimator::new(9.0, 21.0, 17.0)),
        location: Arc::new(FixedLocation::new(STATION, STATION_ELEVATION_M)),
        preferences: Arc::new(MemoryPreferenceStore::new(config.weather.clone())),
        scheduler: Arc::new(RecordingScheduler::new()),
        dispatcher: Arc::new(RecordingDispatcher::new()),
        capabilities: DeviceCapabilities {
            has_barometer: true,
            has_hygrometer: true,
        },
    });

    let cancel = CancellationToken::new();
    let listener = weather.watch(cancel.clone());

    let snapshot = weather.get_snapshot().await?;
    print_weather(&snapshot);

    // Graceful shutdown
    cancel.cancel();
    listener.await?;
    tracing::info!("Barowatch stopped");

    Ok(())
}

/// A slowly falling barometer over the last six hours
fn seed_readings(store: &MemoryObservationStore) {
    let now = Utc::now();
    for step in 0..=12i32 {
        let minutes_ago = i64::from(12 - step) * 30;
        store.insert(RawObservation {
            id: 0,
            time: now - Duration::minutes(minutes_ago),
            pressure: 966.0 - 0.4 * f64::from(step),
            temperature: 14.0 + 0.2 * f64::from(step),
            humidity: Some(62.0 + f64::from(step)),
            altitude: STATION_ELEVATION_M,
            location: STATION,
        });
    }
}

fn print_weather(weather: &CurrentWeather) {
    let prediction = &weather.prediction;

    println!("Barowatch");
    if let Some(observation) = &weather.observation {
        println!(
            "  Pressure:    {:.1} hPa ({:?}, {:.1} hPa/3h)",
            observation.pressure, weather.tendency.characteristic, weather.tendency.amount
        );
        println!("  Temperature: {:.1} °C", observation.temperature);
    }
    if let Some(now) = prediction.primary_hourly() {
        println!(
            "  Now:         {} ({:?})",
            now.description(), prediction.arrival
        );
    }
    if let Some(later) = prediction.primary_daily() {
        println!("  Later:       {}", later.description());
    }
    if let Some(front) = prediction.front {
        println!("  Front:       {:?}", front);
    }
    if let Some(t) = prediction.temperature {
        println!("  Today:       {:.0} °C to {:.0} °C", t.low, t.high);
    }
    for alert in &prediction.alerts {
        println!("  Alert:       {:?}", alert);
    }
}
