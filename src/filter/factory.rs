//! Constant-velocity model construction.

use nalgebra::{Matrix2, Matrix2x4, Matrix4, Vector2, Vector4};
use serde::{Deserialize, Serialize};

use super::kalman::{KalmanFilter, LinearModel};
use crate::{Error, Point, Result};

/// Build a constant-velocity model for a 2-D point.
///
/// ```text
/// F = [ 1 0 dt 0  ]    H = [ 1 0 0 0 ]
///     [ 0 1 0  dt ]        [ 0 1 0 0 ]
///     [ 0 0 1  0  ]
///     [ 0 0 0  1  ]
/// ```
///
/// # Arguments
/// * `dt` - Tick interval, in the unit velocities are expressed in
/// * `process_noise` - Diagonal of Q
/// * `observation_noise` - Diagonal of R
pub fn constant_velocity_model(dt: f64, process_noise: f64, observation_noise: f64) -> LinearModel {
    LinearModel {
        transition: Matrix4::new(
            1.0, 0.0, dt, 0.0,
            0.0, 1.0, 0.0, dt,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ),
        process_noise: Matrix4::identity() * process_noise,
        observation: Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        ),
        observation_noise: Matrix2::identity() * observation_noise,
    }
}

/// Factory for constant-velocity Kalman filters.
///
/// The tracking loop holds one of these in its configuration and creates the
/// filter once the starting position is known.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanFilterFactory {
    /// Tick interval used by the transition matrix
    pub dt: f64,
    /// Process noise variance (Q diagonal)
    pub process_noise: f64,
    /// Observation noise variance (R diagonal)
    pub observation_noise: f64,
    /// Initial state variance (P diagonal)
    pub initial_covariance: f64,
}

impl KalmanFilterFactory {
    /// Create a new factory with the specified parameters.
    ///
    /// # Arguments
    /// * `dt` - Tick interval
    /// * `process_noise` - Process noise variance
    /// * `observation_noise` - Observation noise variance
    /// * `initial_covariance` - Initial state variance
    pub fn new(dt: f64, process_noise: f64, observation_noise: f64, initial_covariance: f64) -> Self {
        Self {
            dt,
            process_noise,
            observation_noise,
            initial_covariance,
        }
    }

    /// Check that all parameters describe a usable filter.
    pub fn validate(&self) -> Result<()> {
        if !(self.dt > 0.0) {
            return Err(Error::InvalidConfig(format!("dt must be positive, got {}", self.dt)));
        }
        if !(self.process_noise >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "process_noise must be non-negative, got {}",
                self.process_noise
            )));
        }
        if !(self.observation_noise > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "observation_noise must be positive, got {}",
                self.observation_noise
            )));
        }
        if !(self.initial_covariance >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "initial_covariance must be non-negative, got {}",
                self.initial_covariance
            )));
        }
        Ok(())
    }

    /// The model this factory builds filters with.
    pub fn model(&self) -> LinearModel {
        constant_velocity_model(self.dt, self.process_noise, self.observation_noise)
    }

    /// Create a filter at `initial` with zero velocity.
    pub fn create(&self, initial: Point) -> Result<KalmanFilter> {
        self.validate()?;
        let position: Vector2<f64> = initial.into();
        KalmanFilter::new(
            self.model(),
            Vector4::new(position[0], position[1], 0.0, 0.0),
            Matrix4::identity() * self.initial_covariance,
        )
    }
}

impl Default for KalmanFilterFactory {
    fn default() -> Self {
        Self::new(1.0, 1e-4, 10.0, 0.1)
    }
}
