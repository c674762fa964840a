//! Interactive surface backed by an OpenCV highgui window.
//!
//! Right click confirms the starting position, `c`/`C` clears the trails and
//! ESC/`q`/`Q` quits. The mouse callback runs inside `wait_key`, on the same
//! thread as the loop, and only writes to a shared cell the canvas drains.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opencv::core::{self, Mat, Scalar};
use opencv::{highgui, imgproc};

use super::{Backend, Canvas, InputEvent};
use crate::{Color, Error, Point, Result};

const KEY_ESC: i32 = 27;

fn cv_error(e: opencv::Error) -> Error {
    Error::Surface(format!("OpenCV: {}", e))
}

fn to_cv_point(p: Point) -> core::Point {
    let (x, y) = p.to_pixel();
    core::Point::new(x, y)
}

// OpenCV images are BGR
fn to_cv_color(c: Color) -> Scalar {
    Scalar::new(c.b as f64, c.g as f64, c.r as f64, 0.0)
}

/// Map a `wait_key` code to an input event.
fn key_event(key: i32) -> Option<InputEvent> {
    if key < 0 {
        return None;
    }
    match key & 0xFF {
        KEY_ESC => Some(InputEvent::Quit),
        k if k == 'q' as i32 || k == 'Q' as i32 => Some(InputEvent::Quit),
        k if k == 'c' as i32 || k == 'C' as i32 => Some(InputEvent::Reset),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct MouseState {
    pointer: Option<Point>,
    events: VecDeque<InputEvent>,
}

/// Backend opening named highgui windows.
#[derive(Clone, Debug)]
pub struct HighGuiBackend {
    window_name: String,
}

impl HighGuiBackend {
    pub fn new(window_name: impl Into<String>) -> Self {
        Self {
            window_name: window_name.into(),
        }
    }
}

impl Default for HighGuiBackend {
    fn default() -> Self {
        Self::new("mouse kalman")
    }
}

impl Backend for HighGuiBackend {
    type Canvas = HighGuiCanvas;

    fn create_canvas(&mut self, width: u32, height: u32) -> Result<HighGuiCanvas> {
        highgui::named_window(&self.window_name, highgui::WINDOW_AUTOSIZE).map_err(cv_error)?;

        let mouse = Arc::new(Mutex::new(MouseState::default()));
        let cell = Arc::clone(&mouse);
        let callback = Box::new(move |event: i32, x: i32, y: i32, _flags: i32| {
            // A poisoned lock only means an earlier callback panicked; drop the event
            let Ok(mut state) = cell.lock() else {
                return;
            };
            let p = Point::new(x as f64, y as f64);
            if event == highgui::EVENT_RBUTTONDOWN {
                state.pointer = Some(p);
                state.events.push_back(InputEvent::Confirm(p));
            } else if event == highgui::EVENT_MOUSEMOVE {
                state.pointer = Some(p);
            }
        });
        highgui::set_mouse_callback(&self.window_name, Some(callback)).map_err(cv_error)?;

        let image = blank_image(width, height)?;
        Ok(HighGuiCanvas {
            window_name: self.window_name.clone(),
            width,
            height,
            image,
            mouse,
        })
    }
}

fn blank_image(width: u32, height: u32) -> Result<Mat> {
    let (Ok(cols), Ok(rows)) = (i32::try_from(width), i32::try_from(height)) else {
        return Err(Error::Surface(format!("canvas size {}x{} too large", width, height)));
    };
    Mat::new_rows_cols_with_default(rows, cols, core::CV_8UC3, Scalar::all(0.0)).map_err(cv_error)
}

/// `wait_key` delay for a poll timeout; `wait_key(0)` blocks forever.
fn wait_key_delay(timeout: Duration) -> Result<i32> {
    let ms = i32::try_from(timeout.as_millis())
        .map_err(|_| Error::Surface(format!("poll timeout {:?} too large", timeout)))?;
    Ok(ms.max(1))
}

/// A highgui window plus its backing image.
pub struct HighGuiCanvas {
    window_name: String,
    width: u32,
    height: u32,
    image: Mat,
    mouse: Arc<Mutex<MouseState>>,
}

impl HighGuiCanvas {
    fn next_mouse_event(&self) -> Result<Option<InputEvent>> {
        let mut state = self
            .mouse
            .lock()
            .map_err(|_| Error::Surface("mouse state lock poisoned".to_string()))?;
        Ok(state.events.pop_front())
    }
}

impl Canvas for HighGuiCanvas {
    fn poll_input(&mut self, timeout: Duration) -> Result<Option<InputEvent>> {
        if let Some(event) = self.next_mouse_event()? {
            return Ok(Some(event));
        }

        let key = highgui::wait_key(wait_key_delay(timeout)?).map_err(cv_error)?;
        if let Some(event) = key_event(key) {
            return Ok(Some(event));
        }

        // Mouse callbacks fire during wait_key
        self.next_mouse_event()
    }

    fn pointer_position(&self) -> Option<Point> {
        self.mouse.lock().ok().and_then(|state| state.pointer)
    }

    fn clear(&mut self) -> Result<()> {
        self.image = blank_image(self.width, self.height)?;
        Ok(())
    }

    fn draw_line(&mut self, a: Point, b: Point, color: Color, thickness: u32) -> Result<()> {
        imgproc::line(
            &mut self.image,
            to_cv_point(a),
            to_cv_point(b),
            to_cv_color(color),
            thickness as i32,
            imgproc::LINE_AA,
            0,
        )
        .map_err(cv_error)
    }

    fn present(&mut self) -> Result<()> {
        highgui::imshow(&self.window_name, &self.image).map_err(cv_error)
    }
}

impl Drop for HighGuiCanvas {
    fn drop(&mut self) {
        let _ = highgui::destroy_window(&self.window_name);
    }
}
