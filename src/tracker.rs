//! Main tracking loop.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::filter::{KalmanFilter, KalmanFilterFactory};
use crate::surface::{draw_polyline, Canvas, InputEvent};
use crate::{Color, Error, Point, Result};

/// Largest canvas side; window backends take `i32` sizes.
pub const MAX_CANVAS_SIZE: u32 = i32::MAX as u32;

/// Largest tick interval; window backends take an `i32` millisecond delay.
pub const MAX_TICK_INTERVAL_MS: u64 = i32::MAX as u64;

/// Configuration for the tracking loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Canvas width in pixels.
    pub canvas_width: u32,

    /// Canvas height in pixels.
    pub canvas_height: u32,

    /// Input poll timeout per tick; governs the frame rate.
    pub tick_interval_ms: u64,

    /// Factory for the Kalman filter created on confirm.
    pub filter: KalmanFilterFactory,

    /// Half-width of the current-position markers.
    pub cross_size: u32,

    /// Line thickness of both trails.
    pub trail_thickness: u32,

    pub raw_color: Color,
    pub filtered_color: Color,
    pub raw_marker_color: Color,
    pub filtered_marker_color: Color,
}

impl TrackerConfig {
    /// Create a configuration with the default window, timing and filter settings.
    pub fn new() -> Self {
        Self {
            canvas_width: 800,
            canvas_height: 600,
            tick_interval_ms: 30,
            filter: KalmanFilterFactory::default(),
            cross_size: 5,
            trail_thickness: 1,
            raw_color: Color::CYAN,
            filtered_color: Color::ORANGE,
            raw_marker_color: Color::RED,
            filtered_marker_color: Color::WHITE,
        }
    }

    /// Load a configuration from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Check the configuration before a loop is built from it.
    pub fn validate(&self) -> Result<()> {
        if self.canvas_width == 0 || self.canvas_height == 0 {
            return Err(Error::InvalidConfig(format!(
                "canvas size must be non-zero, got {}x{}",
                self.canvas_width, self.canvas_height
            )));
        }
        if self.canvas_width > MAX_CANVAS_SIZE || self.canvas_height > MAX_CANVAS_SIZE {
            return Err(Error::InvalidConfig(format!(
                "canvas size must be at most {}x{}, got {}x{}",
                MAX_CANVAS_SIZE, MAX_CANVAS_SIZE, self.canvas_width, self.canvas_height
            )));
        }
        if self.tick_interval_ms == 0 || self.tick_interval_ms > MAX_TICK_INTERVAL_MS {
            return Err(Error::InvalidConfig(format!(
                "tick_interval_ms must be in 1..={}, got {}",
                MAX_TICK_INTERVAL_MS, self.tick_interval_ms
            )));
        }
        self.filter.validate()
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether the loop has a filter yet.
#[derive(Clone, Debug)]
pub enum TrackingState {
    /// No confirm event received yet.
    Waiting,
    /// Filter constructed and running.
    Tracking(KalmanFilter),
}

/// Points produced by one tracking tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    /// A-priori position.
    pub predicted: Point,
    /// Pointer position used as the observation.
    pub observed: Point,
    /// Position drawn on the filtered trail.
    pub estimated: Point,
    /// False when the correction was skipped and the prediction was used.
    pub corrected: bool,
}

/// What the input poll at the end of a tick asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Reset,
    Quit,
}

/// Result of a finished session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Tracking ticks run (waiting iterations excluded).
    pub ticks: usize,
    pub resets: usize,
    /// Final estimate; `None` if tracking never started.
    pub final_position: Option<Point>,
    pub final_velocity: Option<(f64, f64)>,
}

/// Single-threaded loop feeding pointer observations to a Kalman filter.
///
/// Owns the filter and both trails. Each tracking tick is exactly one
/// predict followed by one correct, then a redraw, then one bounded input
/// poll, which is the only place the loop waits.
pub struct TrackingLoop<C: Canvas> {
    /// Loop configuration.
    config: TrackerConfig,

    canvas: C,

    state: TrackingState,

    /// Raw observations, in tick order.
    raw_history: Vec<Point>,

    /// Filtered estimates, in tick order.
    filtered_history: Vec<Point>,

    /// Last observation, used when the canvas has no pointer position.
    last_pointer: Option<Point>,

    /// Confirm point, observed by the first tracking tick.
    first_observation: Option<Point>,

    last_tick: Option<TickRecord>,

    ticks: usize,
    resets: usize,
}

impl<C: Canvas> TrackingLoop<C> {
    /// Create a loop in the `Waiting` state.
    pub fn new(config: TrackerConfig, canvas: C) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            canvas,
            state: TrackingState::Waiting,
            raw_history: Vec::new(),
            filtered_history: Vec::new(),
            last_pointer: None,
            first_observation: None,
            last_tick: None,
            ticks: 0,
            resets: 0,
        })
    }

    /// Create a loop that is already tracking with the given filter.
    pub fn with_filter(config: TrackerConfig, canvas: C, filter: KalmanFilter) -> Result<Self> {
        let mut tracker = Self::new(config, canvas)?;
        let position = filter.position();
        tracker.last_pointer = Some(Point::new(position[0], position[1]));
        tracker.state = TrackingState::Tracking(filter);
        Ok(tracker)
    }

    /// Run until a quit event.
    pub fn run(&mut self) -> Result<SessionSummary> {
        if !self.is_tracking() {
            info!("right-click on a point to start tracking");
        }

        while self.tick()? != TickOutcome::Quit {}

        let summary = self.summary();
        info!(
            ticks = summary.ticks,
            resets = summary.resets,
            "tracking loop finished"
        );
        Ok(summary)
    }

    /// Advance the loop by one iteration.
    ///
    /// While waiting this shows the blank canvas and polls for a confirm
    /// event. While tracking it runs one predict/correct/draw tick.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        match self.state {
            TrackingState::Waiting => self.wait_tick(),
            TrackingState::Tracking(_) => self.track_tick(),
        }
    }

    /// Clear both trails and the canvas. The filter keeps running.
    pub fn reset(&mut self) -> Result<()> {
        self.raw_history.clear();
        self.filtered_history.clear();
        self.canvas.clear()?;
        self.canvas.present()?;
        self.resets += 1;
        info!(resets = self.resets, "trails cleared");
        Ok(())
    }

    fn wait_tick(&mut self) -> Result<TickOutcome> {
        self.canvas.clear()?;
        self.canvas.present()?;

        match self.poll() {
            Some(InputEvent::Confirm(p)) => {
                self.start(p)?;
                Ok(TickOutcome::Continue)
            }
            Some(InputEvent::Move(p)) => {
                self.last_pointer = Some(p);
                Ok(TickOutcome::Continue)
            }
            Some(InputEvent::Quit) => {
                info!("quit before tracking started");
                Ok(TickOutcome::Quit)
            }
            // Nothing to clear yet
            Some(InputEvent::Reset) | None => Ok(TickOutcome::Continue),
        }
    }

    fn start(&mut self, initial: Point) -> Result<()> {
        let filter = self.config.filter.create(initial)?;
        let model = filter.model();
        info!(x = initial.x, y = initial.y, "initial position");
        info!("process noise covariance:{}", model.process_noise);
        info!("observation noise covariance:{}", model.observation_noise);

        self.last_pointer = Some(initial);
        self.first_observation = Some(initial);
        self.state = TrackingState::Tracking(filter);
        Ok(())
    }

    fn track_tick(&mut self) -> Result<TickOutcome> {
        let TrackingState::Tracking(filter) = &mut self.state else {
            return Ok(TickOutcome::Continue);
        };

        // 1. a-priori estimate
        let prior = filter.predict();
        let predicted = Point::new(prior[0], prior[1]);

        // 2. confirm point on the first tick, then the latest pointer position
        let observed = self
            .first_observation
            .take()
            .or_else(|| self.canvas.pointer_position())
            .or(self.last_pointer)
            .unwrap_or(predicted);
        self.last_pointer = Some(observed);

        // 3. a-posteriori estimate, or the prediction if S is singular
        let record = match filter.correct(&observed.into()) {
            Ok(posterior) => TickRecord {
                predicted,
                observed,
                estimated: Point::new(posterior[0], posterior[1]),
                corrected: true,
            },
            Err(Error::SingularInnovationCovariance) => {
                warn!(tick = self.ticks, "singular innovation covariance, using prediction");
                TickRecord {
                    predicted,
                    observed,
                    estimated: predicted,
                    corrected: false,
                }
            }
            Err(e) => return Err(e),
        };
        debug!(
            tick = self.ticks,
            predicted = ?(record.predicted.x, record.predicted.y),
            estimated = ?(record.estimated.x, record.estimated.y),
            observed = ?(record.observed.x, record.observed.y),
            "tick"
        );

        // 4. trails
        self.raw_history.push(record.observed);
        self.filtered_history.push(record.estimated);
        self.last_tick = Some(record);
        self.ticks += 1;

        // 5. redraw
        self.render(&record)?;

        // 6. input
        match self.poll() {
            Some(InputEvent::Quit) => {
                info!(tick = self.ticks, "quit requested");
                Ok(TickOutcome::Quit)
            }
            Some(InputEvent::Reset) => {
                self.reset()?;
                Ok(TickOutcome::Reset)
            }
            Some(InputEvent::Move(p)) => {
                self.last_pointer = Some(p);
                Ok(TickOutcome::Continue)
            }
            // Already tracking
            Some(InputEvent::Confirm(_)) | None => Ok(TickOutcome::Continue),
        }
    }

    fn render(&mut self, record: &TickRecord) -> Result<()> {
        let c = &self.config;

        self.canvas.clear()?;
        draw_polyline(&mut self.canvas, &self.raw_history, c.raw_color, c.trail_thickness)?;
        draw_polyline(&mut self.canvas, &self.filtered_history, c.filtered_color, c.trail_thickness)?;
        self.canvas.draw_cross(record.observed, c.raw_marker_color, c.cross_size)?;
        self.canvas.draw_cross(record.estimated, c.filtered_marker_color, c.cross_size)?;
        self.canvas.present()
    }

    /// Poll once; a failed poll counts as "no event".
    fn poll(&mut self) -> Option<InputEvent> {
        match self.canvas.poll_input(self.config.tick_interval()) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "input poll failed, skipping");
                None
            }
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let (final_position, final_velocity) = match self.filter() {
            Some(filter) => {
                let p = filter.position();
                let v = filter.velocity();
                (Some(Point::new(p[0], p[1])), Some((v[0], v[1])))
            }
            None => (None, None),
        };
        SessionSummary {
            ticks: self.ticks,
            resets: self.resets,
            final_position,
            final_velocity,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, TrackingState::Tracking(_))
    }

    /// The running filter, once tracking has started.
    pub fn filter(&self) -> Option<&KalmanFilter> {
        match &self.state {
            TrackingState::Tracking(filter) => Some(filter),
            TrackingState::Waiting => None,
        }
    }

    pub fn raw_history(&self) -> &[Point] {
        &self.raw_history
    }

    pub fn filtered_history(&self) -> &[Point] {
        &self.filtered_history
    }

    pub fn last_tick(&self) -> Option<&TickRecord> {
        self.last_tick.as_ref()
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    /// Give the canvas back, e.g. to release the window.
    pub fn into_canvas(self) -> C {
        self.canvas
    }
}
