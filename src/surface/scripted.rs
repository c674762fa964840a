//! Headless surface that replays a pointer script.
//!
//! Every call to [`Canvas::poll_input`] consumes one [`ScriptStep`]. Once the
//! script runs out the canvas reports [`InputEvent::Quit`], so a scripted
//! session always terminates. Draw calls are recorded per presented frame.

use std::collections::VecDeque;
use std::time::Duration;

use super::{Backend, Canvas, InputEvent};
use crate::{Color, Error, Point, Result};

/// One poll worth of scripted input.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScriptStep {
    /// New pointer position, applied before the event is delivered.
    pub pointer: Option<Point>,
    pub event: Option<InputEvent>,
    /// Make this poll fail instead of delivering anything.
    pub fail: bool,
}

impl ScriptStep {
    /// A poll that times out without anything happening.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Move the pointer without emitting an event.
    pub fn move_to(pointer: Point) -> Self {
        Self {
            pointer: Some(pointer),
            ..Self::default()
        }
    }

    /// Deliver an event. `Confirm` and `Move` also place the pointer.
    pub fn event(event: InputEvent) -> Self {
        let pointer = match event {
            InputEvent::Confirm(p) | InputEvent::Move(p) => Some(p),
            InputEvent::Reset | InputEvent::Quit => None,
        };
        Self {
            pointer,
            event: Some(event),
            fail: false,
        }
    }

    /// A transient input failure.
    pub fn failure() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

/// A recorded draw request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrawCommand {
    Clear,
    Line {
        a: Point,
        b: Point,
        color: Color,
        thickness: u32,
    },
}

/// Draw requests between two calls to `present`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    pub commands: Vec<DrawCommand>,
}

impl Frame {
    pub fn line_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Line { .. }))
            .count()
    }

    /// Number of lines drawn in `color`.
    pub fn lines_with_color(&self, color: Color) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Line { color: line_color, .. } if *line_color == color))
            .count()
    }

    /// Whether nothing but clears was drawn.
    pub fn is_blank(&self) -> bool {
        self.line_count() == 0
    }
}

/// Backend handing out [`ScriptedCanvas`]es.
#[derive(Clone, Debug, Default)]
pub struct ScriptedBackend {
    script: Vec<ScriptStep>,
    unavailable: bool,
}

impl ScriptedBackend {
    pub fn new(script: Vec<ScriptStep>) -> Self {
        Self {
            script,
            unavailable: false,
        }
    }

    /// A backend whose canvas can never be created.
    pub fn unavailable() -> Self {
        Self {
            script: Vec::new(),
            unavailable: true,
        }
    }
}

impl Backend for ScriptedBackend {
    type Canvas = ScriptedCanvas;

    fn create_canvas(&mut self, width: u32, height: u32) -> Result<ScriptedCanvas> {
        if self.unavailable {
            return Err(Error::Surface("scripted canvas unavailable".to_string()));
        }
        if width == 0 || height == 0 {
            return Err(Error::Surface(format!("invalid canvas size {}x{}", width, height)));
        }
        Ok(ScriptedCanvas {
            width,
            height,
            script: std::mem::take(&mut self.script).into(),
            pointer: None,
            pending: Vec::new(),
            frames: Vec::new(),
            polls: 0,
            waited: Duration::ZERO,
        })
    }
}

/// Canvas that replays a script and records what was drawn.
#[derive(Clone, Debug)]
pub struct ScriptedCanvas {
    width: u32,
    height: u32,
    script: VecDeque<ScriptStep>,
    pointer: Option<Point>,
    pending: Vec<DrawCommand>,
    frames: Vec<Frame>,
    polls: usize,
    waited: Duration,
}

impl ScriptedCanvas {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Frames presented so far, oldest first.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of `poll_input` calls so far.
    pub fn polls(&self) -> usize {
        self.polls
    }

    /// Sum of all poll timeouts; the scripted canvas never actually sleeps.
    pub fn waited(&self) -> Duration {
        self.waited
    }

    /// Script steps not consumed yet.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Canvas for ScriptedCanvas {
    fn poll_input(&mut self, timeout: Duration) -> Result<Option<InputEvent>> {
        self.polls += 1;
        self.waited += timeout;

        let Some(step) = self.script.pop_front() else {
            return Ok(Some(InputEvent::Quit));
        };

        if step.fail {
            return Err(Error::Surface(format!("scripted input failure at poll {}", self.polls)));
        }
        if let Some(p) = step.pointer {
            self.pointer = Some(p);
        }
        Ok(step.event)
    }

    fn pointer_position(&self) -> Option<Point> {
        self.pointer
    }

    fn clear(&mut self) -> Result<()> {
        self.pending.clear();
        self.pending.push(DrawCommand::Clear);
        Ok(())
    }

    fn draw_line(&mut self, a: Point, b: Point, color: Color, thickness: u32) -> Result<()> {
        self.pending.push(DrawCommand::Line {
            a,
            b,
            color,
            thickness,
        });
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        self.frames.push(Frame {
            commands: std::mem::take(&mut self.pending),
        });
        Ok(())
    }
}
