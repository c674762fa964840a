//! Drawing and input surfaces.
//!
//! The tracking loop only talks to a window through these traits:
//!
//! - [`Backend`] creates a [`Canvas`]
//! - [`Canvas`] reports pointer state and input events, and draws primitives
//!
//! Implementations:
//! - `scripted` - Replays a pointer script and records draw calls (headless)
//! - `highgui` - OpenCV window with mouse and keyboard input (requires OpenCV)

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Color, Point, Result};

pub mod scripted;

#[cfg(feature = "opencv")]
pub mod highgui;

/// Discrete input events delivered by a canvas.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    /// Start tracking at the given position (right click).
    Confirm(Point),
    /// The pointer moved.
    Move(Point),
    /// Clear the trails.
    Reset,
    /// Stop the loop.
    Quit,
}

/// Something that can open a drawable canvas.
pub trait Backend {
    type Canvas: Canvas;

    /// Open a canvas of the given size in pixels.
    fn create_canvas(&mut self, width: u32, height: u32) -> Result<Self::Canvas>;
}

/// A drawable canvas that also owns the input of its window.
pub trait Canvas {
    /// Wait up to `timeout` for the next input event.
    ///
    /// Returns `Ok(None)` when the timeout elapses without an event.
    fn poll_input(&mut self, timeout: Duration) -> Result<Option<InputEvent>>;

    /// Most recent pointer position, if the pointer has been seen.
    fn pointer_position(&self) -> Option<Point>;

    /// Fill the canvas with the background color.
    fn clear(&mut self) -> Result<()>;

    fn draw_line(&mut self, a: Point, b: Point, color: Color, thickness: u32) -> Result<()>;

    /// Draw an `X` of half-width `size` centered on `center`.
    fn draw_cross(&mut self, center: Point, color: Color, size: u32) -> Result<()> {
        let d = size as f64;
        self.draw_line(
            Point::new(center.x - d, center.y - d),
            Point::new(center.x + d, center.y + d),
            color,
            2,
        )?;
        self.draw_line(
            Point::new(center.x + d, center.y - d),
            Point::new(center.x - d, center.y + d),
            color,
            2,
        )
    }

    /// Show everything drawn since the last `clear`.
    fn present(&mut self) -> Result<()>;
}

/// Draw consecutive points as a connected polyline.
pub fn draw_polyline<C: Canvas + ?Sized>(
    canvas: &mut C,
    points: &[Point],
    color: Color,
    thickness: u32,
) -> Result<()> {
    for pair in points.windows(2) {
        canvas.draw_line(pair[0], pair[1], color, thickness)?;
    }
    Ok(())
}
