//! Linear discrete-time Kalman filter with a 4-D state and 2-D observation.
//!
//! All matrices are statically sized. Shape errors can only enter through
//! [`KalmanFilter::from_dynamic`], which validates its inputs once.

use nalgebra::{Cholesky, DMatrix, DVector, Matrix2, Matrix2x4, Matrix4, Matrix4x2, Vector2, Vector4};

use crate::{Error, Result};

/// State dimension: `[x, y, vx, vy]`.
pub const STATE_DIM: usize = 4;
/// Observation dimension: `[x, y]`.
pub const OBSERVATION_DIM: usize = 2;

/// The fixed matrices of a linear dynamical model.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearModel {
    /// State transition matrix (F)
    pub transition: Matrix4<f64>,
    /// Process noise covariance (Q)
    pub process_noise: Matrix4<f64>,
    /// Observation matrix (H)
    pub observation: Matrix2x4<f64>,
    /// Observation noise covariance (R)
    pub observation_noise: Matrix2<f64>,
}

/// Kalman filter over a constant-size state.
///
/// Holds both the a-priori (`*_pre`) and a-posteriori (`*_post`) estimates.
/// Each tick is one [`predict`](Self::predict) followed by one
/// [`correct`](Self::correct); the filter itself does not enforce this.
#[derive(Clone, Debug)]
pub struct KalmanFilter {
    model: LinearModel,
    /// A-priori state (x⁻)
    state_pre: Vector4<f64>,
    /// A-posteriori state (x⁺)
    state_post: Vector4<f64>,
    /// A-priori covariance (P⁻)
    covariance_pre: Matrix4<f64>,
    /// A-posteriori covariance (P⁺)
    covariance_post: Matrix4<f64>,
    /// Gain from the last successful correction (K)
    gain: Matrix4x2<f64>,
}

impl KalmanFilter {
    /// Create a filter from a model and an initial estimate.
    ///
    /// Both the a-priori and a-posteriori slots are seeded with the initial
    /// estimate, so `correct` may be called before the first `predict`.
    ///
    /// # Errors
    /// `NotPositiveDefinite` if the observation noise covariance is not
    /// strictly positive-definite.
    pub fn new(
        model: LinearModel,
        initial_state: Vector4<f64>,
        initial_covariance: Matrix4<f64>,
    ) -> Result<Self> {
        if Cholesky::new(model.observation_noise).is_none() {
            return Err(Error::NotPositiveDefinite(format!(
                "observation noise covariance {:?}",
                model.observation_noise.as_slice()
            )));
        }

        Ok(Self {
            model,
            state_pre: initial_state,
            state_post: initial_state,
            covariance_pre: initial_covariance,
            covariance_post: initial_covariance,
            gain: Matrix4x2::zeros(),
        })
    }

    /// Create a filter from dynamically-shaped matrices.
    ///
    /// # Errors
    /// `DimensionMismatch` if any input does not have the shape required by a
    /// 4-D state and 2-D observation, then the same errors as [`Self::new`].
    pub fn from_dynamic(
        transition: &DMatrix<f64>,
        process_noise: &DMatrix<f64>,
        observation: &DMatrix<f64>,
        observation_noise: &DMatrix<f64>,
        initial_state: &DVector<f64>,
        initial_covariance: &DMatrix<f64>,
    ) -> Result<Self> {
        check_shape("transition", transition, STATE_DIM, STATE_DIM)?;
        check_shape("process_noise", process_noise, STATE_DIM, STATE_DIM)?;
        check_shape("observation", observation, OBSERVATION_DIM, STATE_DIM)?;
        check_shape("observation_noise", observation_noise, OBSERVATION_DIM, OBSERVATION_DIM)?;
        check_shape("initial_covariance", initial_covariance, STATE_DIM, STATE_DIM)?;
        if initial_state.len() != STATE_DIM {
            return Err(Error::DimensionMismatch {
                matrix: "initial_state",
                expected: format!("{}", STATE_DIM),
                got: format!("{}", initial_state.len()),
            });
        }

        // DMatrix iterates column-major, which is also what from_iterator fills.
        let model = LinearModel {
            transition: Matrix4::from_iterator(transition.iter().copied()),
            process_noise: Matrix4::from_iterator(process_noise.iter().copied()),
            observation: Matrix2x4::from_iterator(observation.iter().copied()),
            observation_noise: Matrix2::from_iterator(observation_noise.iter().copied()),
        };

        Self::new(
            model,
            Vector4::from_iterator(initial_state.iter().copied()),
            Matrix4::from_iterator(initial_covariance.iter().copied()),
        )
    }

    /// Propagate the estimate one tick forward.
    ///
    /// `x⁻ = F x⁺`, `P⁻ = F P⁺ Fᵀ + Q`. The prediction is also copied into
    /// the a-posteriori slot so that a skipped correction leaves it as the
    /// current estimate.
    ///
    /// # Returns
    /// The a-priori state; its first two components are the predicted position.
    pub fn predict(&mut self) -> Vector4<f64> {
        let f = &self.model.transition;

        self.state_pre = f * self.state_post;
        self.covariance_pre = f * self.covariance_post * f.transpose() + self.model.process_noise;

        self.state_post = self.state_pre;
        self.covariance_post = self.covariance_pre;

        self.state_pre
    }

    /// Incorporate an observation into the a-priori estimate.
    ///
    /// # Returns
    /// The a-posteriori state.
    ///
    /// # Errors
    /// `SingularInnovationCovariance` if `H P⁻ Hᵀ + R` cannot be inverted.
    /// The filter is left unchanged in that case.
    pub fn correct(&mut self, observation: &Vector2<f64>) -> Result<Vector4<f64>> {
        let h = &self.model.observation;

        // y = z - H x⁻
        let innovation = observation - h * self.state_pre;

        // S = H P⁻ Hᵀ + R
        let s = h * self.covariance_pre * h.transpose() + self.model.observation_noise;
        let s_inv = s.try_inverse().ok_or(Error::SingularInnovationCovariance)?;

        // K = P⁻ Hᵀ S⁻¹
        let gain = self.covariance_pre * h.transpose() * s_inv;

        self.state_post = self.state_pre + gain * innovation;

        // P⁺ = (I - K H) P⁻, symmetrized against round-off
        let covariance = (Matrix4::identity() - gain * h) * self.covariance_pre;
        self.covariance_post = (covariance + covariance.transpose()) * 0.5;
        self.gain = gain;

        Ok(self.state_post)
    }

    /// Current (a-posteriori) state.
    pub fn state(&self) -> &Vector4<f64> {
        &self.state_post
    }

    /// Current (a-posteriori) covariance.
    pub fn covariance(&self) -> &Matrix4<f64> {
        &self.covariance_post
    }

    pub fn state_pre(&self) -> &Vector4<f64> {
        &self.state_pre
    }

    pub fn covariance_pre(&self) -> &Matrix4<f64> {
        &self.covariance_pre
    }

    /// Kalman gain of the last successful correction (zero before any).
    pub fn gain(&self) -> &Matrix4x2<f64> {
        &self.gain
    }

    pub fn model(&self) -> &LinearModel {
        &self.model
    }

    /// Estimated position `(x, y)`.
    pub fn position(&self) -> Vector2<f64> {
        self.state_post.fixed_rows::<2>(0).into_owned()
    }

    /// Estimated velocity `(vx, vy)`, in pixels per tick interval.
    pub fn velocity(&self) -> Vector2<f64> {
        self.state_post.fixed_rows::<2>(2).into_owned()
    }
}

fn check_shape(name: &'static str, m: &DMatrix<f64>, rows: usize, cols: usize) -> Result<()> {
    if m.nrows() != rows || m.ncols() != cols {
        return Err(Error::DimensionMismatch {
            matrix: name,
            expected: format!("{}x{}", rows, cols),
            got: format!("{}x{}", m.nrows(), m.ncols()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn constant_velocity(dt: f64, q: f64, r: f64) -> LinearModel {
        LinearModel {
            transition: Matrix4::new(
                1.0, 0.0, dt, 0.0,
                0.0, 1.0, 0.0, dt,
                0.0, 0.0, 1.0, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ),
            process_noise: Matrix4::identity() * q,
            observation: Matrix2x4::new(
                1.0, 0.0, 0.0, 0.0,
                0.0, 1.0, 0.0, 0.0,
            ),
            observation_noise: Matrix2::identity() * r,
        }
    }

    // ===== Construction tests =====

    #[test]
    fn test_kalman_filter_create() {
        let x0 = Vector4::new(1.0, 2.0, 0.0, 0.0);
        let kf = KalmanFilter::new(constant_velocity(1.0, 0.1, 1.0), x0, Matrix4::identity()).unwrap();

        assert_eq!(kf.state(), &x0);
        assert_eq!(kf.state_pre(), &x0);
        assert_eq!(kf.covariance(), &Matrix4::identity());
        assert_eq!(kf.gain(), &Matrix4x2::zeros());
    }

    #[test]
    fn test_kalman_filter_rejects_singular_observation_noise() {
        let mut model = constant_velocity(1.0, 0.1, 1.0);
        model.observation_noise = Matrix2::new(1.0, 0.0, 0.0, 0.0);

        let result = KalmanFilter::new(model, Vector4::zeros(), Matrix4::identity());
        assert!(matches!(result, Err(Error::NotPositiveDefinite(_))));
    }

    #[test]
    fn test_from_dynamic_valid() {
        let model = constant_velocity(1.0, 0.1, 2.0);
        let kf = KalmanFilter::from_dynamic(
            &DMatrix::from_row_slice(4, 4, &[
                1.0, 0.0, 1.0, 0.0,
                0.0, 1.0, 0.0, 1.0,
                0.0, 0.0, 1.0, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ]),
            &(DMatrix::identity(4, 4) * 0.1),
            &DMatrix::from_row_slice(2, 4, &[
                1.0, 0.0, 0.0, 0.0,
                0.0, 1.0, 0.0, 0.0,
            ]),
            &(DMatrix::identity(2, 2) * 2.0),
            &DVector::from_vec(vec![5.0, 6.0, 0.0, 0.0]),
            &DMatrix::identity(4, 4),
        )
        .unwrap();

        assert_eq!(kf.model(), &model);
        assert_relative_eq!(kf.position(), Vector2::new(5.0, 6.0), epsilon = 1e-12);
    }

    #[test]
    fn test_from_dynamic_transition_mismatch() {
        let result = KalmanFilter::from_dynamic(
            &DMatrix::zeros(3, 4),
            &DMatrix::identity(4, 4),
            &DMatrix::zeros(2, 4),
            &DMatrix::identity(2, 2),
            &DVector::zeros(4),
            &DMatrix::identity(4, 4),
        );

        match result {
            Err(Error::DimensionMismatch { matrix, expected, got }) => {
                assert_eq!(matrix, "transition");
                assert_eq!(expected, "4x4");
                assert_eq!(got, "3x4");
            }
            other => panic!("expected DimensionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_from_dynamic_state_mismatch() {
        let result = KalmanFilter::from_dynamic(
            &DMatrix::identity(4, 4),
            &DMatrix::identity(4, 4),
            &DMatrix::zeros(2, 4),
            &DMatrix::identity(2, 2),
            &DVector::zeros(3),
            &DMatrix::identity(4, 4),
        );
        assert!(matches!(result, Err(Error::DimensionMismatch { matrix: "initial_state", .. })));
    }

    // ===== Predict tests =====

    #[test]
    fn test_kalman_filter_predict() {
        let x0 = Vector4::new(1.0, 1.0, 2.0, -1.0);
        let mut kf = KalmanFilter::new(constant_velocity(1.0, 0.1, 1.0), x0, Matrix4::identity()).unwrap();

        let predicted = kf.predict();

        assert_relative_eq!(predicted, Vector4::new(3.0, 0.0, 2.0, -1.0), epsilon = 1e-12);
        // P⁻ = F I Fᵀ + Q: position variance 1 + 1 + 0.1, cross term 1
        let p = kf.covariance_pre();
        assert_relative_eq!(p[(0, 0)], 2.1, epsilon = 1e-12);
        assert_relative_eq!(p[(0, 2)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(p[(2, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(p[(2, 2)], 1.1, epsilon = 1e-12);
        // Prediction is also the current estimate until corrected
        assert_eq!(kf.state(), kf.state_pre());
    }

    // ===== Correct tests =====

    #[test]
    fn test_kalman_filter_correct() {
        let mut model = constant_velocity(1.0, 0.0, 1.0);
        model.observation_noise = Matrix2::identity();
        let p0 = Matrix4::identity() * 10.0;
        let mut kf = KalmanFilter::new(model, Vector4::zeros(), p0).unwrap();

        let corrected = kf.correct(&Vector2::new(5.0, 0.0)).unwrap();

        // K = 10 / (10 + 1) on the observed components
        assert_relative_eq!(corrected[0], 50.0 / 11.0, epsilon = 1e-9);
        assert_relative_eq!(corrected[1], 0.0, epsilon = 1e-12);
        assert_relative_eq!(kf.gain()[(0, 0)], 10.0 / 11.0, epsilon = 1e-9);
        assert_relative_eq!(kf.covariance()[(0, 0)], 10.0 / 11.0, epsilon = 1e-9);
        // Unobserved velocity variance is untouched
        assert_relative_eq!(kf.covariance()[(2, 2)], 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_kalman_filter_singular_innovation_leaves_state() {
        // No prior uncertainty and a tiny R: det(S) underflows to zero
        let mut model = constant_velocity(1.0, 0.0, 1.0);
        model.observation_noise = Matrix2::identity() * 1e-300;
        let mut kf = KalmanFilter::new(model, Vector4::new(1.0, 2.0, 0.0, 0.0), Matrix4::zeros()).unwrap();

        let before = *kf.state();
        let result = kf.correct(&Vector2::new(10.0, 10.0));

        assert!(matches!(result, Err(Error::SingularInnovationCovariance)));
        assert_eq!(kf.state(), &before);
        assert_eq!(kf.covariance(), &Matrix4::zeros());
    }

    // ===== Predict-correct cycle tests =====

    #[test]
    fn test_kalman_filter_tracks_linear_motion() {
        let mut kf = KalmanFilter::new(
            constant_velocity(1.0, 1e-4, 0.1),
            Vector4::zeros(),
            Matrix4::identity(),
        )
        .unwrap();

        for step in 1..=30 {
            kf.predict();
            let z = Vector2::new(step as f64 * 2.0, step as f64 * -1.0);
            kf.correct(&z).unwrap();
        }

        assert_relative_eq!(kf.position(), Vector2::new(60.0, -30.0), epsilon = 0.1);
        assert_relative_eq!(kf.velocity(), Vector2::new(2.0, -1.0), epsilon = 0.05);
    }

    #[test]
    fn test_kalman_filter_covariance_stays_symmetric() {
        let mut kf = KalmanFilter::new(
            constant_velocity(1.0, 1e-4, 10.0),
            Vector4::zeros(),
            Matrix4::identity() * 0.1,
        )
        .unwrap();

        for step in 0..500 {
            kf.predict();
            let t = step as f64 * 0.05;
            kf.correct(&Vector2::new(100.0 * t.cos(), 80.0 * t.sin())).unwrap();

            let p = kf.covariance();
            assert_relative_eq!(*p, p.transpose(), epsilon = 1e-12);
            for i in 0..STATE_DIM {
                assert!(p[(i, i)] >= 0.0, "negative variance at step {}", step);
            }
        }
    }
}
