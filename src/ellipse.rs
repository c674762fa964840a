//! Confidence ellipse of a 2-D position covariance.
//!
//! Pure geometry; the tracking loop does not draw ellipses, but callers that
//! want to visualize the filter's uncertainty can compute one per tick from
//! [`KalmanFilter::covariance`](crate::KalmanFilter::covariance).

use std::f64::consts::TAU;

use nalgebra::{Matrix2, Matrix4};
use serde::{Deserialize, Serialize};

use crate::Point;

/// Scale for a 95% confidence region of a 2-D Gaussian (√5.991).
pub const CHI_SQUARE_95: f64 = 2.4477;

/// An oriented ellipse.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorEllipse {
    pub center: Point,
    /// Half-length of the axis along the dominant eigenvector
    pub half_major: f64,
    pub half_minor: f64,
    /// Orientation of the major axis, in degrees counter-clockwise from +x, in `[0, 360)`
    pub angle: f64,
}

impl ErrorEllipse {
    /// Orientation for renderers that treat positive angles as clockwise.
    pub fn render_angle(&self) -> f64 {
        -self.angle
    }
}

/// Compute the error ellipse of a 2×2 covariance.
///
/// # Arguments
/// * `chi_square` - Confidence scale applied to the axis lengths (e.g. [`CHI_SQUARE_95`])
/// * `mean` - Ellipse center
/// * `covariance` - Symmetric positive-semi-definite covariance
pub fn error_ellipse(chi_square: f64, mean: Point, covariance: &Matrix2<f64>) -> ErrorEllipse {
    let eigen = (*covariance).symmetric_eigen();

    let (major, minor) = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] {
        (0, 1)
    } else {
        (1, 0)
    };

    let v = eigen.eigenvectors.column(major);
    let mut angle = v[1].atan2(v[0]);
    if angle < 0.0 {
        angle += TAU;
    }
    // An eigenvector and its negation describe the same axis; fold 360° to 0°
    let angle = angle.to_degrees() % 360.0;

    // Round-off can push a zero eigenvalue slightly negative
    let half_major = chi_square * eigen.eigenvalues[major].max(0.0).sqrt();
    let half_minor = chi_square * eigen.eigenvalues[minor].max(0.0).sqrt();

    ErrorEllipse {
        center: mean,
        half_major,
        half_minor,
        angle,
    }
}

/// Compute the error ellipse of the position block of a full state covariance.
pub fn position_error_ellipse(chi_square: f64, mean: Point, covariance: &Matrix4<f64>) -> ErrorEllipse {
    let position = covariance.fixed_view::<2, 2>(0, 0).into_owned();
    error_ellipse(chi_square, mean, &position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_axis_aligned_ellipse() {
        let cov = Matrix2::new(
            4.0, 0.0,
            0.0, 1.0,
        );
        let e = error_ellipse(1.0, Point::new(10.0, 20.0), &cov);

        assert_eq!(e.center, Point::new(10.0, 20.0));
        assert_relative_eq!(e.half_major, 2.0, epsilon = 1e-9);
        assert_relative_eq!(e.half_minor, 1.0, epsilon = 1e-9);
        // Major axis lies on the x-axis, either direction
        assert!(e.angle.abs() < 1e-6 || (e.angle - 180.0).abs() < 1e-6, "angle {}", e.angle);
    }

    #[test]
    fn test_vertical_major_axis() {
        let cov = Matrix2::new(
            1.0, 0.0,
            0.0, 9.0,
        );
        let e = error_ellipse(CHI_SQUARE_95, Point::default(), &cov);

        assert_relative_eq!(e.half_major, 3.0 * CHI_SQUARE_95, epsilon = 1e-9);
        assert_relative_eq!(e.half_minor, CHI_SQUARE_95, epsilon = 1e-9);
        assert!((e.angle - 90.0).abs() < 1e-6 || (e.angle - 270.0).abs() < 1e-6, "angle {}", e.angle);
    }

    #[test]
    fn test_rotated_ellipse() {
        // Eigenvalues 3 and 1, dominant eigenvector along (1, 1)
        let cov = Matrix2::new(
            2.0, 1.0,
            1.0, 2.0,
        );
        let e = error_ellipse(1.0, Point::default(), &cov);

        assert_relative_eq!(e.half_major, 3.0_f64.sqrt(), epsilon = 1e-9);
        assert_relative_eq!(e.half_minor, 1.0, epsilon = 1e-9);
        assert!((e.angle - 45.0).abs() < 1e-6 || (e.angle - 225.0).abs() < 1e-6, "angle {}", e.angle);
        assert_relative_eq!(e.render_angle(), -e.angle);
        assert!(e.angle >= 0.0 && e.angle < 360.0);
    }

    #[test]
    fn test_degenerate_covariance() {
        let cov = Matrix2::zeros();
        let e = error_ellipse(CHI_SQUARE_95, Point::new(1.0, 1.0), &cov);
        assert_relative_eq!(e.half_major, 0.0);
        assert_relative_eq!(e.half_minor, 0.0);
    }

    #[test]
    fn test_position_block_of_state_covariance() {
        let mut cov = Matrix4::identity() * 100.0;
        cov[(0, 0)] = 4.0;
        cov[(1, 1)] = 1.0;
        let e = position_error_ellipse(1.0, Point::default(), &cov);

        assert_relative_eq!(e.half_major, 2.0, epsilon = 1e-9);
        assert_relative_eq!(e.half_minor, 1.0, epsilon = 1e-9);
    }
}
