//! # mouse-kalman-rs - Pointer Tracking with a Kalman Filter
//!
//! Tracks the 2-D position and velocity of a moving point (a mouse pointer,
//! usually) with a linear constant-velocity Kalman filter, and renders the raw
//! observation trail next to the filtered estimate trail in real time.
//!
//! ## Features
//!
//! - Statically-sized Kalman filter (4-D state, 2-D observation)
//! - Single-threaded tracking loop with reset and quit handling
//! - Pluggable drawing/input surface (scripted, or OpenCV highgui)
//! - Covariance error-ellipse helper
//!
//! ## Example
//!
//! ```rust,ignore
//! use mouse_kalman_rs::{Point, ScriptStep, ScriptedBackend, TrackerConfig, TrackingLoop};
//! use mouse_kalman_rs::surface::{Backend, InputEvent};
//!
//! let config = TrackerConfig::new();
//! let mut backend = ScriptedBackend::new(vec![
//!     ScriptStep::event(InputEvent::Confirm(Point::new(100.0, 100.0))),
//!     ScriptStep::move_to(Point::new(102.0, 99.0)),
//! ]);
//! let canvas = backend.create_canvas(config.canvas_width, config.canvas_height).unwrap();
//! let mut tracker = TrackingLoop::new(config, canvas).unwrap();
//! let summary = tracker.run().unwrap();
//! ```

pub mod geometry;
pub mod filter;
pub mod ellipse;
pub mod surface;
pub mod tracker;

// Re-exports for convenience
pub use geometry::{Color, Point};
pub use filter::{KalmanFilter, KalmanFilterFactory, LinearModel};
pub use ellipse::{error_ellipse, position_error_ellipse, ErrorEllipse};
pub use surface::{Backend, Canvas, InputEvent};
pub use surface::scripted::{ScriptStep, ScriptedBackend, ScriptedCanvas};
pub use tracker::{SessionSummary, TrackerConfig, TrackingLoop};

// Error types
pub use crate::error::{Error, Result};

mod error {
    use thiserror::Error;

    /// Errors that can occur while building or running a tracker.
    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Dimension mismatch for {matrix}: expected {expected}, got {got}")]
        DimensionMismatch {
            matrix: &'static str,
            expected: String,
            got: String,
        },

        #[error("Matrix is not positive-definite: {0}")]
        NotPositiveDefinite(String),

        #[error("Innovation covariance is singular")]
        SingularInnovationCovariance,

        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        #[error("Surface error: {0}")]
        Surface(String),

        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("JSON error: {0}")]
        Json(#[from] serde_json::Error),
    }

    /// Result type for tracker operations
    pub type Result<T> = std::result::Result<T, Error>;
}
