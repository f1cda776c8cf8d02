//! Drag-vs-tap recognition on the island.

use serde::{Deserialize, Serialize};

use super::window::dp_to_px;

/// Raw touch input in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TouchEvent {
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up { x: f32, y: f32 },
    Cancel,
}

/// What a touch event amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    /// Nothing to do
    Ignored,
    /// A press started
    Pressed,
    /// The window should move here
    Moved { x: i32, y: i32 },
    /// A drag finished
    DragEnded,
    /// Press and release without dragging
    Tap,
}

#[derive(Debug, Clone, Copy)]
struct Press {
    origin_x: f32,
    origin_y: f32,
    window_x: i32,
    window_y: i32,
    dragging: bool,
}

/// Tracks one press at a time.
#[derive(Debug, Clone)]
pub struct GestureTracker {
    threshold_px: f32,
    press: Option<Press>,
}

impl GestureTracker {
    pub fn new(threshold_dp: f32, density: f32) -> Self {
        Self {
            threshold_px: dp_to_px(threshold_dp, density) as f32,
            press: None,
        }
    }

    pub fn threshold_px(&self) -> f32 {
        self.threshold_px
    }

    /// Feeds one event. `window_pos` is the window position right now.
    pub fn handle(&mut self, event: TouchEvent, window_pos: (i32, i32)) -> GestureOutcome {
        match event {
            TouchEvent::Down { x, y } => {
                self.press = Some(Press {
                    origin_x: x,
                    origin_y: y,
                    window_x: window_pos.0,
                    window_y: window_pos.1,
                    dragging: false,
                });
                GestureOutcome::Pressed
            }
            TouchEvent::Move { x, y } => {
                let Some(press) = self.press.as_mut() else {
                    return GestureOutcome::Ignored;
                };
                let dx = x - press.origin_x;
                let dy = y - press.origin_y;
                if dx.abs() > self.threshold_px || dy.abs() > self.threshold_px {
                    press.dragging = true;
                }
                GestureOutcome::Moved {
                    x: press.window_x + dx.round() as i32,
                    y: press.window_y + dy.round() as i32,
                }
            }
            TouchEvent::Up { .. } => match self.press.take() {
                Some(press) if press.dragging => GestureOutcome::DragEnded,
                Some(_) => GestureOutcome::Tap,
                None => GestureOutcome::Ignored,
            },
            TouchEvent::Cancel => {
                self.press = None;
                GestureOutcome::Ignored
            }
        }
    }
}
