//! Pressure tendency and short/long horizon forecasting.
//!
//! Pressure history is expected to be sea-level corrected and sorted by time.

use std::collections::BTreeSet;

use barowatch_core::WeatherConfig;
use chrono::{DateTime, Duration, Utc};

use crate::types::{
    primary_condition, ArrivalTime, CloudGenus, CloudObservation, ForecastPoint,
    PressureCharacteristic, PressureTendency, Range, Reading, WeatherCondition, WeatherFront,
};

/// Readings newer than this (relative to the newest) feed the tendency slope
pub const TENDENCY_WINDOW_HOURS: i64 = 3;
/// Clouds older than this are ignored
pub const CLOUD_WINDOW_HOURS: i64 = 4;
/// Long horizon forecast step
pub const DAILY_HORIZON_HOURS: i64 = 24;

pub const HIGH_PRESSURE_HPA: f64 = 1022.689;
pub const LOW_PRESSURE_HPA: f64 = 1009.144;

/// Thresholds in hPa per 3 hours
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastSettings {
    pub change_threshold: f64,
    pub storm_threshold: f64,
}

impl ForecastSettings {
    pub fn from_prefs(prefs: &WeatherConfig) -> Self {
        Self {
            change_threshold: prefs.forecast_sensitivity.forecast_threshold(),
            storm_threshold: prefs.storm_alert_sensitivity.storm_threshold(),
        }
    }
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self::from_prefs(&WeatherConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PressureSystem {
    High,
    Normal,
    Low,
}

impl PressureSystem {
    fn of(pressure: f64) -> Self {
        if pressure > HIGH_PRESSURE_HPA {
            Self::High
        } else if pressure < LOW_PRESSURE_HPA {
            Self::Low
        } else {
            Self::Normal
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ForecastEngine {
    settings: ForecastSettings,
}

impl ForecastEngine {
    pub fn new(settings: ForecastSettings) -> Self {
        Self { settings }
    }

    pub fn from_prefs(prefs: &WeatherConfig) -> Self {
        Self::new(ForecastSettings::from_prefs(prefs))
    }

    pub fn settings(&self) -> ForecastSettings {
        self.settings
    }

    /// Classifies the least-squares slope of the recent window.
    ///
    /// `amount` is the unsigned slope in hPa per hour. Thresholds are
    /// compared against the slope extrapolated to 3 hours.
    pub fn compute_tendency(&self, pressures: &[Reading<f64>]) -> PressureTendency {
        let Some(slope) = recent_slope(pressures) else {
            return PressureTendency::steady();
        };

        let change = slope * 3.0;
        let magnitude = change.abs();
        let characteristic = if magnitude >= self.settings.storm_threshold {
            if change > 0.0 {
                PressureCharacteristic::RisingFast
            } else {
                PressureCharacteristic::FallingFast
            }
        } else if magnitude >= self.settings.change_threshold {
            if change > 0.0 {
                PressureCharacteristic::Rising
            } else {
                PressureCharacteristic::Falling
            }
        } else {
            PressureCharacteristic::Steady
        };

        PressureTendency {
            characteristic,
            amount: slope.abs(),
        }
    }

    /// Returns the short horizon point (at `now`) followed by the long horizon point.
    ///
    /// Without a temperature range precipitation stays untyped.
    pub fn compute_forecast(
        &self,
        pressures: &[Reading<f64>],
        clouds: &[CloudObservation],
        temperatures: Option<Range<f64>>,
        now: DateTime<Utc>,
    ) -> Vec<ForecastPoint> {
        let tendency = self.compute_tendency(pressures);
        let system = pressures.last().map(|r| PressureSystem::of(r.value));
        let cloud = last_cloud(clouds, now);

        let mut hourly = hourly_conditions(tendency.characteristic, system, cloud);
        let mut daily = daily_conditions(tendency.characteristic, system);

        if let Some(range) = temperatures {
            type_precipitation(&mut hourly, range);
            type_precipitation(&mut daily, range);
        }

        let front = system.and_then(|_| front_for(tendency.characteristic));

        vec![
            ForecastPoint {
                time: now,
                conditions: hourly,
                front,
                tendency,
            },
            ForecastPoint {
                time: now + Duration::hours(DAILY_HORIZON_HOURS),
                conditions: daily,
                front: None,
                tendency,
            },
        ]
    }
}

/// Slope in hPa/hour of the readings within the tendency window
fn recent_slope(pressures: &[Reading<f64>]) -> Option<f64> {
    let latest = pressures.last()?;
    let cutoff = latest.time - Duration::hours(TENDENCY_WINDOW_HOURS);
    let window: Vec<(f64, f64)> = pressures
        .iter()
        .filter(|r| r.time >= cutoff && r.value.is_finite())
        .map(|r| {
            let hours = (r.time - latest.time).num_seconds() as f64 / 3600.0;
            (hours, r.value)
        })
        .collect();

    if window.len() < 2 {
        return None;
    }

    let n = window.len() as f64;
    let mean_x = window.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = window.iter().map(|(_, y)| y).sum::<f64>() / n;
    let (cov, var) = window.iter().fold((0.0, 0.0), |(cov, var), (x, y)| {
        (
            cov + (x - mean_x) * (y - mean_y),
            var + (x - mean_x).powi(2),
        )
    });

    if var == 0.0 {
        return None;
    }
    Some(cov / var)
}

/// Most recent cloud observation, if it was logged within the cloud window
pub fn last_cloud(clouds: &[CloudObservation], now: DateTime<Utc>) -> Option<&CloudObservation> {
    clouds
        .iter()
        .max_by_key(|c| c.time)
        .filter(|c| (now - c.time).abs() <= Duration::hours(CLOUD_WINDOW_HOURS))
}

fn hourly_conditions(
    characteristic: PressureCharacteristic,
    system: Option<PressureSystem>,
    cloud: Option<&CloudObservation>,
) -> BTreeSet<WeatherCondition> {
    use WeatherCondition::*;

    let mut conditions = BTreeSet::new();
    let genus = cloud.and_then(|c| c.genus);

    match system {
        Some(system) => match characteristic {
            PressureCharacteristic::FallingFast => {
                conditions.extend([Storm, Precipitation, Overcast]);
            }
            PressureCharacteristic::Falling => {
                conditions.insert(Overcast);
                if system == PressureSystem::Low
                    || genus.is_some_and(|g| g.is_frontal_precursor())
                {
                    conditions.insert(Precipitation);
                }
            }
            PressureCharacteristic::RisingFast => {
                conditions.extend([Wind, Clear]);
            }
            PressureCharacteristic::Rising => {
                conditions.insert(Clear);
            }
            PressureCharacteristic::Steady => match system {
                PressureSystem::High => {
                    conditions.insert(Clear);
                }
                PressureSystem::Low => {
                    conditions.insert(Overcast);
                }
                PressureSystem::Normal => {
                    conditions.insert(if genus.is_some_and(is_overcast_genus) {
                        Overcast
                    } else {
                        Clear
                    });
                }
            },
        },
        None => {
            if let Some(cloud) = cloud {
                conditions.insert(match cloud.genus {
                    Some(g) if is_overcast_genus(g) => Overcast,
                    _ => Clear,
                });
            }
        }
    }

    match genus {
        Some(CloudGenus::Cumulonimbus) => {
            conditions.extend([Storm, Precipitation]);
        }
        Some(CloudGenus::Nimbostratus) => {
            conditions.extend([Precipitation, Overcast]);
        }
        _ => {}
    }

    if conditions.contains(&Precipitation) || conditions.contains(&Storm) {
        conditions.remove(&Clear);
    }
    conditions
}

fn daily_conditions(
    characteristic: PressureCharacteristic,
    system: Option<PressureSystem>,
) -> BTreeSet<WeatherCondition> {
    use WeatherCondition::*;

    let Some(system) = system else {
        return BTreeSet::new();
    };

    let conditions: &[WeatherCondition] = match characteristic {
        c if c.is_falling() => &[Overcast, Precipitation],
        c if c.is_rising() => &[Clear],
        _ => match system {
            PressureSystem::Low => &[Overcast],
            _ => &[Clear],
        },
    };
    conditions.iter().copied().collect()
}

fn is_overcast_genus(genus: CloudGenus) -> bool {
    matches!(
        genus,
        CloudGenus::Stratus
            | CloudGenus::Stratocumulus
            | CloudGenus::Altostratus
            | CloudGenus::Nimbostratus
    )
}

fn type_precipitation(conditions: &mut BTreeSet<WeatherCondition>, range: Range<f64>) {
    if !conditions.contains(&WeatherCondition::Precipitation) {
        return;
    }
    if range.end <= 0.0 {
        conditions.insert(WeatherCondition::Snow);
    } else if range.start > 0.0 {
        conditions.insert(WeatherCondition::Rain);
    } else {
        conditions.insert(WeatherCondition::Rain);
        conditions.insert(WeatherCondition::Snow);
    }
}

fn front_for(characteristic: PressureCharacteristic) -> Option<WeatherFront> {
    match characteristic {
        PressureCharacteristic::FallingFast => Some(WeatherFront::Cold),
        PressureCharacteristic::Falling => Some(WeatherFront::Warm),
        _ => None,
    }
}

/// Arrival bucket for the short horizon conditions. Rules, in order:
///
/// 1. no primary condition: `None`
/// 2. steady pressure with a clear/overcast primary, or storm clouds seen: `Now`
/// 3. storm primary or a rapid tendency: `VerySoon`
/// 4. any other non-steady tendency: `Soon`
/// 5. `Later`
pub fn estimate_arrival_time(
    forecast: &[ForecastPoint],
    clouds: &[CloudObservation],
    now: DateTime<Utc>,
) -> Option<ArrivalTime> {
    let current = forecast.first()?;
    let primary = primary_condition(&current.conditions)?;
    let characteristic = current.tendency.characteristic;

    let storm_clouds_seen = last_cloud(clouds, now)
        .and_then(|c| c.genus)
        .is_some_and(|g| g.is_storm());

    let steady_system = characteristic == PressureCharacteristic::Steady
        && matches!(
            primary,
            WeatherCondition::Clear | WeatherCondition::Overcast
        );

    let arrival = if steady_system || storm_clouds_seen {
        ArrivalTime::Now
    } else if primary == WeatherCondition::Storm || characteristic.is_rapid() {
        ArrivalTime::VerySoon
    } else if characteristic != PressureCharacteristic::Steady {
        ArrivalTime::Soon
    } else {
        ArrivalTime::Later
    };
    Some(arrival)
}
