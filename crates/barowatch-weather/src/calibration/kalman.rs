//! One dimensional Kalman filter for irregularly sampled series.
//!
//! ```text
//! Predict:  P = P + Q·dt
//! Gain:     K = P / (P + R)
//! Update:   x = x + K·(z - x)
//!           P = (1 - K)·P
//! ```
//!
//! `Q` is the process noise per hour and `R` the measurement noise, so a
//! long gap between readings lets the estimate move further.

#[derive(Debug, Clone)]
pub struct ScalarKalman {
    estimate: Option<f64>,
    covariance: f64,
    process_noise: f64,
    measurement_noise: f64,
}

impl ScalarKalman {
    pub fn new(process_noise: f64, measurement_noise: f64) -> Self {
        Self {
            estimate: None,
            covariance: measurement_noise,
            process_noise: process_noise.max(f64::EPSILON),
            measurement_noise: measurement_noise.max(0.0),
        }
    }

    pub fn estimate(&self) -> Option<f64> {
        self.estimate
    }

    /// Fold in a measurement taken `dt_hours` after the previous one.
    pub fn update(&mut self, measurement: f64, dt_hours: f64) -> f64 {
        let Some(current) = self.estimate else {
            self.estimate = Some(measurement);
            return measurement;
        };

        self.covariance += self.process_noise * dt_hours.max(0.0);
        let total = self.covariance + self.measurement_noise;
        let gain = if total > 0.0 {
            self.covariance / total
        } else {
            1.0
        };
        let next = current + gain * (measurement - current);
        self.covariance *= 1.0 - gain;
        self.estimate = Some(next);
        next
    }

    /// Advance time without a measurement, used for rejected outliers.
    pub fn predict(&mut self, dt_hours: f64) -> Option<f64> {
        self.covariance += self.process_noise * dt_hours.max(0.0);
        self.estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_measurement_initializes() {
        let mut kf = ScalarKalman::new(1.0, 4.0);
        assert_eq!(kf.estimate(), None);
        assert_eq!(kf.update(1012.0, 0.0), 1012.0);
    }

    #[test]
    fn test_zero_measurement_noise_tracks_input() {
        let mut kf = ScalarKalman::new(1.0, 0.0);
        kf.update(10.0, 0.0);
        assert_eq!(kf.update(20.0, 1.0), 20.0);
    }

    #[test]
    fn test_noisy_measurements_are_damped() {
        let mut kf = ScalarKalman::new(0.01, 25.0);
        kf.update(100.0, 0.0);
        let next = kf.update(110.0, 0.25);
        assert!((next - 105.0).abs() < 0.01, "got {}", next);
        let third = kf.update(110.0, 0.25);
        assert!(third > 105.0 && third < 110.0, "got {}", third);
    }

    #[test]
    fn test_converges_on_constant_signal() {
        let mut kf = ScalarKalman::new(0.1, 9.0);
        kf.update(0.0, 0.0);
        let mut last = 0.0;
        for _ in 0..200 {
            last = kf.update(50.0, 0.25);
        }
        assert!((last - 50.0).abs() < 0.5);
    }

    #[test]
    fn test_predict_keeps_estimate() {
        let mut kf = ScalarKalman::new(1.0, 1.0);
        kf.update(3.0, 0.0);
        assert_eq!(kf.predict(2.0), Some(3.0));
    }
}
