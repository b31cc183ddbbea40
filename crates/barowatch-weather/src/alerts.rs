use std::collections::BTreeSet;

use crate::types::{TemperaturePrediction, WeatherAlert, WeatherCondition};

/// A daily low at or below this raises a cold alert (°C)
pub const COLD_ALERT_C: f64 = 5.0;
/// A daily high at or above this raises a heat alert (°C)
pub const HOT_ALERT_C: f64 = 32.5;

pub fn weather_alerts(conditions: &BTreeSet<WeatherCondition>) -> Vec<WeatherAlert> {
    if conditions.contains(&WeatherCondition::Storm) {
        vec![WeatherAlert::Storm]
    } else {
        Vec::new()
    }
}

/// Cold takes precedence; at most one temperature alert is raised.
pub fn temperature_alerts(prediction: Option<&TemperaturePrediction>) -> Vec<WeatherAlert> {
    match prediction {
        Some(p) if p.low <= COLD_ALERT_C => vec![WeatherAlert::Cold],
        Some(p) if p.high >= HOT_ALERT_C => vec![WeatherAlert::Hot],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(low: f64, high: f64) -> TemperaturePrediction {
        TemperaturePrediction {
            average: (low + high) / 2.0,
            low,
            high,
            current: high,
        }
    }

    #[test]
    fn test_storm_alert() {
        let stormy: BTreeSet<_> = [WeatherCondition::Storm, WeatherCondition::Wind]
            .into_iter()
            .collect();
        assert_eq!(weather_alerts(&stormy), vec![WeatherAlert::Storm]);

        let wet: BTreeSet<_> = [WeatherCondition::Rain].into_iter().collect();
        assert!(weather_alerts(&wet).is_empty());
    }

    #[test]
    fn test_cold_excludes_hot() {
        assert_eq!(
            temperature_alerts(Some(&prediction(3.0, 33.0))),
            vec![WeatherAlert::Cold]
        );
    }

    #[test]
    fn test_temperature_thresholds_are_inclusive() {
        assert_eq!(
            temperature_alerts(Some(&prediction(5.0, 20.0))),
            vec![WeatherAlert::Cold]
        );
        assert_eq!(
            temperature_alerts(Some(&prediction(15.0, 32.5))),
            vec![WeatherAlert::Hot]
        );
        assert!(temperature_alerts(Some(&prediction(5.1, 32.4))).is_empty());
    }

    #[test]
    fn test_no_prediction_no_alerts() {
        assert!(temperature_alerts(None).is_empty());
    }
}
