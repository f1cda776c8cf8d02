//! UI-thread side of the island.
//!
//! The overlay service never touches the window directly. It posts
//! [`UiMessage`]s over a crossbeam channel; the UI thread owns an
//! [`OverlayView`] and drains them, keeping a [`ViewFrame`] model of the
//! three child views and presenting it after every change. Touches arrive
//! on the same channel, so input and rendering stay on one thread.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::display::{Face, FONT_REGULAR_DP};
use super::gesture::{GestureOutcome, GestureTracker, TouchEvent};
use super::service::OverlayCommand;
use super::window::{OverlayWindow, WindowSpec};
use crate::host::{resolve_icon, IconRef, PackageResolver};

// ============================================================================
// ViewFrame
// ============================================================================

/// Visibility and vertical scale of one child view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceState {
    pub visible: bool,
    pub scale_y: f32,
}

impl FaceState {
    const SHOWN: FaceState = FaceState {
        visible: true,
        scale_y: 1.0,
    };
    const HIDDEN: FaceState = FaceState {
        visible: false,
        scale_y: 1.0,
    };
}

/// Everything the window needs to draw the island.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewFrame {
    pub time: FaceState,
    pub emoji: FaceState,
    pub icon: FaceState,
    /// Content of the text view
    pub text: String,
    pub text_size_dp: f32,
    /// Content of the emoji view
    pub emoji_text: String,
    /// Icon actually shown after fallbacks
    pub icon_ref: IconRef,
}

impl Default for ViewFrame {
    fn default() -> Self {
        Self {
            time: FaceState::HIDDEN,
            emoji: FaceState::HIDDEN,
            icon: FaceState::SHOWN,
            text: String::new(),
            text_size_dp: FONT_REGULAR_DP,
            emoji_text: String::new(),
            icon_ref: IconRef::Generic,
        }
    }
}

impl ViewFrame {
    pub fn face(&self, face: Face) -> &FaceState {
        match face {
            Face::Time => &self.time,
            Face::Emoji => &self.emoji,
            Face::Icon => &self.icon,
        }
    }

    fn face_mut(&mut self, face: Face) -> &mut FaceState {
        match face {
            Face::Time => &mut self.time,
            Face::Emoji => &mut self.emoji,
            Face::Icon => &mut self.icon,
        }
    }

    /// The visible faces, in draw order.
    pub fn visible_faces(&self) -> Vec<Face> {
        [Face::Time, Face::Emoji, Face::Icon]
            .into_iter()
            .filter(|f| self.face(*f).visible)
            .collect()
    }

    fn show_only(&mut self, face: Face) {
        self.time = FaceState::HIDDEN;
        self.emoji = FaceState::HIDDEN;
        self.icon = FaceState::HIDDEN;
        *self.face_mut(face) = FaceState::SHOWN;
    }
}

// ============================================================================
// UiMessage
// ============================================================================

/// Work posted to the UI thread.
#[derive(Debug, Clone, PartialEq)]
pub enum UiMessage {
    /// Add the island window
    Attach(WindowSpec),
    /// Remove the island window
    Detach,
    /// Show one face, hide the others, reset scales
    ShowOnly(Face),
    SetText { text: String, size_dp: f32 },
    SetEmoji(String),
    /// Show the icon of this package (with fallbacks)
    SetIcon(String),
    /// Animate a face's vertical scale
    Animate {
        face: Face,
        scale_y: f32,
        duration_ms: u64,
    },
    /// Middle of a flip: hide `from`, show `to` collapsed
    SwapFaces { from: Face, to: Face },
    Touch(TouchEvent),
    Shutdown,
}

// ============================================================================
// OverlayView
// ============================================================================

/// The island's view tree, owned by the UI thread.
pub struct OverlayView {
    window: Arc<dyn OverlayWindow>,
    resolver: Arc<dyn PackageResolver>,
    update_rx: Receiver<UiMessage>,
    command_tx: mpsc::UnboundedSender<OverlayCommand>,
    gesture: GestureTracker,
    frame: ViewFrame,
    attached: bool,
    position: (i32, i32),
    shut_down: bool,
}

impl OverlayView {
    pub fn new(
        window: Arc<dyn OverlayWindow>,
        resolver: Arc<dyn PackageResolver>,
        update_rx: Receiver<UiMessage>,
        command_tx: mpsc::UnboundedSender<OverlayCommand>,
        gesture: GestureTracker,
    ) -> Self {
        Self {
            window,
            resolver,
            update_rx,
            command_tx,
            gesture,
            frame: ViewFrame::default(),
            attached: false,
            position: (0, 0),
            shut_down: false,
        }
    }

    pub fn frame(&self) -> &ViewFrame {
        &self.frame
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn position(&self) -> (i32, i32) {
        self.position
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Handles one pending message, if any.
    ///
    /// Returns true if a message was processed.
    pub fn process_pending_update(&mut self) -> bool {
        match self.update_rx.try_recv() {
            Ok(message) => {
                self.handle(message);
                true
            }
            Err(crossbeam_channel::TryRecvError::Empty) => false,
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                tracing::warn!("Overlay UI channel disconnected");
                false
            }
        }
    }

    /// Handles every pending message. Returns how many were processed.
    pub fn process_pending_updates(&mut self) -> usize {
        let mut count = 0;
        while !self.shut_down && self.process_pending_update() {
            count += 1;
        }
        count
    }

    /// Blocks on the channel until shutdown. Used as the UI thread body.
    pub fn run(mut self) {
        while !self.shut_down {
            match self.update_rx.recv() {
                Ok(message) => self.handle(message),
                Err(_) => break,
            }
        }
        self.detach();
        tracing::debug!("Overlay UI thread finished");
    }

    fn handle(&mut self, message: UiMessage) {
        match message {
            UiMessage::Attach(spec) => {
                self.attach(&spec);
                return;
            }
            UiMessage::Detach => {
                self.detach();
                return;
            }
            UiMessage::Shutdown => {
                self.detach();
                self.shut_down = true;
                return;
            }
            UiMessage::Touch(event) => {
                self.on_touch(event);
                return;
            }
            UiMessage::ShowOnly(face) => self.frame.show_only(face),
            UiMessage::SetText { text, size_dp } => {
                if self.frame.text == text && self.frame.text_size_dp == size_dp {
                    return;
                }
                self.frame.text = text;
                self.frame.text_size_dp = size_dp;
            }
            UiMessage::SetEmoji(emoji) => self.frame.emoji_text = emoji,
            UiMessage::SetIcon(package) => {
                let (icon_ref, _) = resolve_icon(self.resolver.as_ref(), &package);
                self.frame.icon_ref = icon_ref;
            }
            UiMessage::Animate { face, scale_y, .. } => {
                self.frame.face_mut(face).scale_y = scale_y;
            }
            UiMessage::SwapFaces { from, to } => {
                *self.frame.face_mut(from) = FaceState::HIDDEN;
                *self.frame.face_mut(to) = FaceState {
                    visible: true,
                    scale_y: 0.0,
                };
            }
        }
        self.present();
    }

    fn attach(&mut self, spec: &WindowSpec) {
        if self.attached {
            return;
        }
        match self.window.add_view(spec) {
            Ok(()) => {
                self.attached = true;
                self.position = (spec.x, spec.y);
                tracing::info!(x = spec.x, y = spec.y, "Island window added");
                self.present();
            }
            Err(e) => tracing::error!(error = %e, "Failed to add island window"),
        }
    }

    fn detach(&mut self) {
        if !self.attached {
            return;
        }
        self.attached = false;
        if let Err(e) = self.window.remove_view() {
            tracing::warn!(error = %e, "Failed to remove island window");
        }
    }

    fn present(&self) {
        if !self.attached {
            return;
        }
        if let Err(e) = self.window.present(&self.frame) {
            tracing::warn!(error = %e, "Failed to redraw island");
        }
    }

    fn on_touch(&mut self, event: TouchEvent) {
        match self.gesture.handle(event, self.position) {
            GestureOutcome::Moved { x, y } => {
                self.position = (x, y);
                if self.attached {
                    if let Err(e) = self.window.update_position(x, y) {
                        tracing::warn!(error = %e, "Failed to move island window");
                    }
                }
            }
            GestureOutcome::Tap => {
                if self.command_tx.send(OverlayCommand::Tap).is_err() {
                    tracing::debug!("Tap dropped, overlay service gone");
                }
            }
            GestureOutcome::Ignored | GestureOutcome::Pressed | GestureOutcome::DragEnded => {}
        }
    }
}
