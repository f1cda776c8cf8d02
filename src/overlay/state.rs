//! The overlay state machine.
//!
//! [`OverlayController`] is pure: every transition takes the current
//! wall-clock time and returns the [`Effect`]s the service has to carry
//! out (view updates, flips, upward events). It never sleeps, spawns or
//! touches a channel, which keeps every transition testable on its own.
//!
//! ```text
//!            showPrompt               tap
//!   Idle ───────────────▶ Prompt ───────────▶ Transient("开始计时")
//!    ▲ │ configure(focus)    │ configure(focus)      │ configure(focus)
//!    │ ▼                     ▼                       ▼
//!    └── configure(idle) ── Focus ◀──────────────────┘
//! ```

use crate::types::{BridgeEvent, DisplayPhase, OverlayMode, OverlaySnapshot, PromptContext};

use super::display::{
    font_size_for, format_elapsed, prompt_text, CycleTiming, Face, FONT_SMALL_DP,
};
use super::view::UiMessage;

/// Text shown after a prompt is accepted.
pub const TEXT_STARTED: &str = "开始计时";
/// Text shown when a switch-pending session ends on its own.
pub const TEXT_AUTO_ENDED: &str = "自动结束";
/// Switch warning when no timeout is configured.
pub const TEXT_SWITCH_WARN: &str = "切换?";

// ============================================================================
// Mode
// ============================================================================

/// A running focus session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusSession {
    /// Session start, wall clock ms (also the cycle anchor)
    pub start_ms: i64,
    pub emoji: String,
    /// Phase currently on screen
    pub phase: DisplayPhase,
    /// When the session was marked switch-pending
    pub pending_since_ms: Option<i64>,
}

/// Overlay mode with its data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Idle,
    Focus(FocusSession),
    Prompt(PromptContext),
    /// Short text over another mode. `underlying` is never transient.
    Transient { text: String, underlying: Box<Mode> },
}

impl Mode {
    pub fn kind(&self) -> OverlayMode {
        match self {
            Mode::Idle => OverlayMode::Idle,
            Mode::Focus(_) => OverlayMode::Focus,
            Mode::Prompt(_) => OverlayMode::Prompt,
            Mode::Transient { .. } => OverlayMode::Transient,
        }
    }

    /// The mode shown once any transient text is gone.
    fn base(&self) -> &Mode {
        match self {
            Mode::Transient { underlying, .. } => underlying,
            other => other,
        }
    }
}

/// Work the service carries out after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Post to the UI thread
    View(UiMessage),
    /// Animate from one face to another
    Flip { from: Face, to: Face },
    /// Abort a running flip
    CancelFlip,
    /// Send upward to the UI layer
    Emit(BridgeEvent),
    /// Bring the host app to the front
    OpenHostApp,
}

// ============================================================================
// OverlayController
// ============================================================================

/// Owns the overlay mode and decides every transition.
#[derive(Debug, Clone)]
pub struct OverlayController {
    mode: Mode,
    icon_package: String,
    last_emoji: String,
    shown_text: Option<String>,
    timing: CycleTiming,
    pending_timeout_ms: Option<i64>,
}

impl OverlayController {
    pub fn new(timing: CycleTiming, pending_timeout_ms: Option<u64>) -> Self {
        Self {
            mode: Mode::Idle,
            icon_package: String::new(),
            last_emoji: String::new(),
            shown_text: None,
            timing,
            pending_timeout_ms: pending_timeout_ms.map(|ms| i64::try_from(ms).unwrap_or(i64::MAX)),
        }
    }

    /// Starts with the given icon package (no transition).
    pub fn with_icon_package(mut self, package: impl Into<String>) -> Self {
        self.icon_package = package.into();
        self
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// Whether a focus session is running, possibly behind transient text.
    pub fn is_focusing(&self) -> bool {
        matches!(self.mode.base(), Mode::Focus(_))
    }

    /// Whether the refresh ticker should run: during a focus session, and
    /// behind transient text while a switch-pending deadline is armed.
    pub fn is_ticking(&self) -> bool {
        match &self.mode {
            Mode::Focus(_) => true,
            Mode::Transient { underlying, .. } => matches!(
                underlying.as_ref(),
                Mode::Focus(s) if s.pending_since_ms.is_some() && self.pending_timeout_ms.is_some()
            ),
            _ => false,
        }
    }

    pub fn snapshot(&self) -> OverlaySnapshot {
        let (display_phase, focus_start_ms, emoji, prompt, switch_pending) = match &self.mode {
            Mode::Idle => (DisplayPhase::Icon, 0, None, None, false),
            Mode::Focus(s) => (
                s.phase,
                s.start_ms,
                Some(s.emoji.clone()),
                None,
                s.pending_since_ms.is_some(),
            ),
            Mode::Prompt(ctx) => (DisplayPhase::Time, 0, None, Some(ctx.clone()), false),
            Mode::Transient { .. } => (DisplayPhase::Time, 0, None, None, false),
        };
        OverlaySnapshot {
            mode: self.mode.kind(),
            display_phase,
            focus_start_ms,
            cycle_anchor_ms: focus_start_ms,
            current_icon_package: self.icon_package.clone(),
            emoji,
            text: self.shown_text.clone(),
            prompt,
            switch_pending,
        }
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// `startFloatingWindow` / `updateFloatingWindow`.
    pub fn configure(
        &mut self,
        focusing: bool,
        emoji: Option<String>,
        start_ms: Option<i64>,
        now_ms: i64,
    ) -> Vec<Effect> {
        if let Some(emoji) = emoji.filter(|e| !e.is_empty()) {
            self.last_emoji = emoji;
        }

        if !focusing {
            self.mode = Mode::Idle;
            return self.render(now_ms);
        }

        let previous = match self.mode.base() {
            Mode::Focus(s) => Some(s.clone()),
            _ => None,
        };
        let start_ms = match (start_ms, &previous) {
            (Some(start), _) if start > 0 && start <= now_ms => start,
            (Some(start), _) => {
                tracing::debug!(start_ms = start, "Clamping focus start to now");
                now_ms
            }
            (None, Some(prev)) => prev.start_ms,
            (None, None) => now_ms,
        };

        self.mode = Mode::Focus(FocusSession {
            start_ms,
            emoji: self.last_emoji.clone(),
            phase: self.timing.phase_at(start_ms, now_ms),
            pending_since_ms: previous.and_then(|p| p.pending_since_ms),
        });
        self.render(now_ms)
    }

    /// A switch accepted by the detector or monitor.
    ///
    /// `rule_activity` is the activity id of a matching rule, if any.
    pub fn on_app_switched(
        &mut self,
        package: &str,
        label: &str,
        rule_activity: Option<String>,
        now_ms: i64,
    ) -> Vec<Effect> {
        self.icon_package = package.to_string();

        if let Mode::Transient { underlying, .. } = &mut self.mode {
            self.mode = std::mem::take(underlying.as_mut());
        }

        if matches!(self.mode, Mode::Focus(_)) {
            let mut effects = self.render(now_ms);
            effects.retain(|e| !matches!(e, Effect::CancelFlip));
            return effects;
        }

        self.mode = match rule_activity.filter(|a| !a.is_empty()) {
            Some(activity_id) => Mode::Prompt(PromptContext {
                target_package: package.to_string(),
                display_label: label.to_string(),
                real_app_name: label.to_string(),
                activity_id,
            }),
            None => Mode::Idle,
        };
        self.render(now_ms)
    }

    /// `showPrompt`. Ignored while focusing.
    pub fn show_prompt(&mut self, ctx: PromptContext, now_ms: i64) -> Vec<Effect> {
        if self.is_focusing() {
            tracing::debug!(package = %ctx.target_package, "Prompt ignored while focusing");
            return Vec::new();
        }
        self.mode = Mode::Prompt(ctx);
        self.render(now_ms)
    }

    /// `showFloatingText`.
    pub fn show_text(&mut self, text: String, now_ms: i64) -> Vec<Effect> {
        let underlying = match std::mem::take(&mut self.mode) {
            Mode::Transient { underlying, .. } => underlying,
            other => Box::new(other),
        };
        self.mode = Mode::Transient { text, underlying };
        self.render(now_ms)
    }

    /// `setSwitchPending`. Only meaningful during a focus session.
    pub fn set_switch_pending(&mut self, pending: bool, now_ms: i64) -> Vec<Effect> {
        let session = match &mut self.mode {
            Mode::Focus(s) => s,
            Mode::Transient { underlying, .. } => match underlying.as_mut() {
                Mode::Focus(s) => s,
                _ => return Vec::new(),
            },
            _ => {
                tracing::debug!(pending, "Switch-pending ignored outside focus");
                return Vec::new();
            }
        };

        session.pending_since_ms = match (pending, session.pending_since_ms) {
            (true, Some(since)) => Some(since),
            (true, None) => Some(now_ms),
            (false, _) => None,
        };

        if matches!(self.mode, Mode::Focus(_)) {
            self.render(now_ms)
        } else {
            Vec::new()
        }
    }

    /// Refresh tick during a focus session.
    ///
    /// The switch-pending deadline is checked even while text covers the
    /// session; the cycle itself only advances when the session is shown.
    pub fn tick(&mut self, now_ms: i64) -> Vec<Effect> {
        let expired = match self.mode.base() {
            Mode::Focus(session) => pending_expired(session, self.pending_timeout_ms, now_ms),
            _ => return Vec::new(),
        };
        if expired {
            tracing::info!("Switch-pending focus session ended");
            self.mode = Mode::Transient {
                text: TEXT_AUTO_ENDED.to_string(),
                underlying: Box::new(Mode::Idle),
            };
            let mut effects = vec![Effect::Emit(BridgeEvent::FocusAutoEnded {})];
            effects.extend(self.render(now_ms));
            return effects;
        }

        let Mode::Focus(session) = &mut self.mode else {
            return Vec::new();
        };
        let phase = focus_phase(&self.timing, session, now_ms);
        let text = focus_text(session, self.pending_timeout_ms, now_ms);
        let old_face = session.phase.face();
        session.phase = phase;

        let mut effects = Vec::new();
        if self.shown_text.as_deref() != Some(text.as_str()) {
            effects.push(Effect::View(UiMessage::SetText {
                size_dp: font_size_for(&text),
                text: text.clone(),
            }));
            self.shown_text = Some(text);
        }
        if phase.face() != old_face {
            effects.push(Effect::Flip {
                from: old_face,
                to: phase.face(),
            });
        }
        effects
    }

    /// The user tapped the island.
    pub fn tap(&mut self, now_ms: i64) -> Vec<Effect> {
        match std::mem::take(&mut self.mode) {
            Mode::Idle => vec![Effect::OpenHostApp],
            focus @ Mode::Focus(_) => {
                self.mode = focus;
                vec![Effect::Emit(BridgeEvent::StopFocusFromFloating {})]
            }
            Mode::Prompt(ctx) => {
                let event = BridgeEvent::StartFocusFromPrompt {
                    package_name: ctx.target_package,
                    app_label: ctx.display_label,
                    real_app_name: ctx.real_app_name,
                    activity_id: ctx.activity_id,
                };
                self.mode = Mode::Transient {
                    text: TEXT_STARTED.to_string(),
                    underlying: Box::new(Mode::Idle),
                };
                let mut effects = vec![Effect::Emit(event)];
                effects.extend(self.render(now_ms));
                effects
            }
            Mode::Transient { underlying, .. } => {
                self.mode = *underlying;
                let mut effects = self.render(now_ms);
                effects.extend(self.tap(now_ms));
                effects
            }
        }
    }

    /// Full redraw of the current mode.
    pub fn render(&mut self, now_ms: i64) -> Vec<Effect> {
        let mut effects = vec![Effect::CancelFlip];
        match &mut self.mode {
            Mode::Idle => {
                self.shown_text = None;
                effects.push(Effect::View(UiMessage::SetIcon(self.icon_package.clone())));
                effects.push(Effect::View(UiMessage::ShowOnly(Face::Icon)));
            }
            Mode::Focus(session) => {
                session.phase = focus_phase(&self.timing, session, now_ms);
                let text = focus_text(session, self.pending_timeout_ms, now_ms);
                effects.push(Effect::View(UiMessage::SetText {
                    size_dp: font_size_for(&text),
                    text: text.clone(),
                }));
                effects.push(Effect::View(UiMessage::SetEmoji(session.emoji.clone())));
                effects.push(Effect::View(UiMessage::SetIcon(self.icon_package.clone())));
                effects.push(Effect::View(UiMessage::ShowOnly(session.phase.face())));
                self.shown_text = Some(text);
            }
            Mode::Prompt(ctx) => {
                let text = prompt_text(&ctx.display_label);
                effects.push(Effect::View(UiMessage::SetText {
                    text: text.clone(),
                    size_dp: FONT_SMALL_DP,
                }));
                effects.push(Effect::View(UiMessage::ShowOnly(Face::Time)));
                self.shown_text = Some(text);
            }
            Mode::Transient { text, .. } => {
                effects.push(Effect::View(UiMessage::SetText {
                    text: text.clone(),
                    size_dp: FONT_SMALL_DP,
                }));
                effects.push(Effect::View(UiMessage::ShowOnly(Face::Time)));
                self.shown_text = Some(text.clone());
            }
        }
        effects
    }
}

fn pending_expired(session: &FocusSession, pending_timeout_ms: Option<i64>, now_ms: i64) -> bool {
    match (session.pending_since_ms, pending_timeout_ms) {
        (Some(since), Some(timeout)) => now_ms.saturating_sub(since) >= timeout,
        _ => false,
    }
}

fn focus_phase(timing: &CycleTiming, session: &FocusSession, now_ms: i64) -> DisplayPhase {
    if session.pending_since_ms.is_some() {
        DisplayPhase::SwitchWarn
    } else {
        timing.phase_at(session.start_ms, now_ms)
    }
}

fn focus_text(session: &FocusSession, pending_timeout_ms: Option<i64>, now_ms: i64) -> String {
    match (session.pending_since_ms, pending_timeout_ms) {
        (Some(since), Some(timeout)) => {
            let left_ms = (timeout - now_ms.saturating_sub(since)).max(0);
            format!("{}s", (left_ms + 999) / 1000)
        }
        (Some(_), None) => TEXT_SWITCH_WARN.to_string(),
        (None, _) => format_elapsed(session.start_ms, now_ms),
    }
}
