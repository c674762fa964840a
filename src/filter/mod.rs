//! Kalman filtering for a 2-D point under constant-velocity motion.
//!
//! - `KalmanFilter` - Statically-sized predict/correct recursion
//! - `KalmanFilterFactory` - Builds the constant-velocity model and seeds the state

mod kalman;
mod factory;

pub use kalman::{KalmanFilter, LinearModel, OBSERVATION_DIM, STATE_DIM};
pub use factory::{constant_velocity_model, KalmanFilterFactory};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Point;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    // ===== Convergence Tests =====

    #[test]
    fn test_converges_on_noiseless_constant_velocity() {
        let factory = KalmanFilterFactory::default();
        let mut filter = factory.create(Point::new(0.0, 0.0)).unwrap();

        let mut errors = Vec::new();
        for t in 1..=300 {
            filter.predict();
            let truth = Vector2::new(3.0 * t as f64, -2.0 * t as f64);
            let estimate = filter.correct(&truth).unwrap();
            errors.push((estimate.fixed_rows::<2>(0) - truth).norm());
        }

        // Early ticks lag behind while velocity is learned, then the error decays
        assert!(errors[299] < 0.01, "final error {} too large", errors[299]);
        assert!(errors[299] < errors[49]);
        assert!(errors[199] < errors[99]);
        assert_relative_eq!(filter.velocity(), Vector2::new(3.0, -2.0), epsilon = 1e-3);
    }

    #[test]
    fn test_covariance_trace_non_increasing_after_correct() {
        // Start well above the steady-state uncertainty
        let factory = KalmanFilterFactory::new(1.0, 1e-4, 10.0, 10.0);
        let mut filter = factory.create(Point::new(50.0, 50.0)).unwrap();

        let mut previous = filter.covariance().trace();
        for _ in 0..200 {
            filter.predict();
            let prior = filter.covariance_pre().trace();
            filter.correct(&Vector2::new(50.0, 50.0)).unwrap();
            let trace = filter.covariance().trace();

            assert!(trace <= prior + 1e-12, "correct increased trace: {} > {}", trace, prior);
            assert!(trace <= previous + 1e-9, "trace grew across ticks: {} > {}", trace, previous);
            previous = trace;
        }
    }

    // ===== Scenario Tests =====

    #[test]
    fn test_first_tick_lies_between_start_and_observation() {
        let observation = Vector2::new(102.0, 99.0);
        let start = Point::new(100.0, 100.0);

        let mut distances = Vec::new();
        for r in [10.0, 1.0, 0.01] {
            let factory = KalmanFilterFactory::new(1.0, 1e-4, r, 0.1);
            let mut filter = factory.create(start).unwrap();

            let predicted = filter.predict();
            assert_relative_eq!(predicted[0], 100.0, epsilon = 1e-12);
            assert_relative_eq!(predicted[1], 100.0, epsilon = 1e-12);

            let corrected = filter.correct(&observation).unwrap();
            assert!(corrected[0] > 100.0 && corrected[0] < 102.0);
            assert!(corrected[1] < 100.0 && corrected[1] > 99.0);

            distances.push((corrected.fixed_rows::<2>(0) - observation).norm());
        }

        // Smaller observation noise pulls the estimate closer to the observation
        assert!(distances[0] > distances[1]);
        assert!(distances[1] > distances[2]);
    }

    #[test]
    fn test_default_first_tick_values() {
        let mut filter = KalmanFilterFactory::default().create(Point::new(100.0, 100.0)).unwrap();
        filter.predict();
        let corrected = filter.correct(&Vector2::new(102.0, 99.0)).unwrap();

        // P⁻ = 0.2001 on position, K = 0.2001 / 10.2001
        let k = 0.2001 / 10.2001;
        assert_relative_eq!(corrected[0], 100.0 + 2.0 * k, epsilon = 1e-9);
        assert_relative_eq!(corrected[1], 100.0 - k, epsilon = 1e-9);
    }
}
