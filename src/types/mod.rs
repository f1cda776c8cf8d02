//! Core data types for the island.
//!
//! This module defines the data structures used for:
//! - Foreground app observations and switch events
//! - Overlay state snapshots (mode, display phase, prompt context)
//! - Runtime configuration with validation
//! - Bridge request/response serialization (see [`bridge`])

pub mod bridge;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use bridge::{
    AppRuleParams, BridgeEvent, BridgeRequest, BridgeResponse, FloatingParams, FloatingText,
    InstalledApp, PackageParams, PromptParams, ResponseData, StartTimeValue, SwitchPendingParams,
};

// ============================================================================
// ForegroundApp / SwitchEvent
// ============================================================================

/// The user-visible app currently in the foreground.
///
/// Created on each accepted switch; only the latest one is retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForegroundApp {
    /// Package identifier (e.g. `com.example.browser`)
    pub package_id: String,
    /// Resolved label, or the package identifier when lookup failed
    pub display_label: String,
    /// Monotonic detection time in milliseconds
    pub detected_at: u64,
}

/// A transition between two foreground apps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchEvent {
    /// Previously emitted package (empty for the first emission)
    pub from_package: String,
    /// Newly emitted package
    pub to_package: String,
    /// Monotonic timestamp in milliseconds
    pub timestamp: u64,
}

/// Where a foreground observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchSource {
    /// Window-state-change notifications (event driven)
    Accessibility,
    /// Usage-event polling by the foreground monitor
    UsagePoll,
}

impl SwitchSource {
    /// Returns the string representation of the source.
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchSource::Accessibility => "accessibility",
            SwitchSource::UsagePoll => "usage_poll",
        }
    }
}

// ============================================================================
// Overlay snapshot types
// ============================================================================

/// Overlay mode as seen from outside the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlayMode {
    /// Shows the icon of the detected foreground app
    #[default]
    Idle,
    /// A focus session is running
    Focus,
    /// Offering to start a session for a rule-matched app
    Prompt,
    /// Arbitrary short text
    Transient,
}

impl OverlayMode {
    /// Returns the string representation of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayMode::Idle => "idle",
            OverlayMode::Focus => "focus",
            OverlayMode::Prompt => "prompt",
            OverlayMode::Transient => "transient",
        }
    }
}

/// Which face of the island is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayPhase {
    /// Elapsed time (or transient text, which shares the text view)
    Time,
    /// Session emoji
    Emoji,
    /// App icon
    #[default]
    Icon,
    /// Switch-pending warning during a focus session
    SwitchWarn,
}

/// Context captured when the overlay enters prompt mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptContext {
    /// Package that matched a rule
    pub target_package: String,
    /// Text shown on the island (may be an activity label)
    pub display_label: String,
    /// Real app name (e.g. "小红书")
    pub real_app_name: String,
    /// Activity id from the rule store
    pub activity_id: String,
}

/// Read-only view of the overlay state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySnapshot {
    /// Current mode
    pub mode: OverlayMode,
    /// Visible face
    pub display_phase: DisplayPhase,
    /// Focus start (wall clock ms), 0 when not focusing
    pub focus_start_ms: i64,
    /// Anchor of the display cycle (wall clock ms), 0 when not focusing
    pub cycle_anchor_ms: i64,
    /// Package whose icon the island shows
    pub current_icon_package: String,
    /// Session emoji
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    /// Text currently shown in the text view, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Prompt context (present iff mode is prompt)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptContext>,
    /// Whether the focus session is marked switch-pending
    pub switch_pending: bool,
}

// ============================================================================
// IslandConfig
// ============================================================================

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_poll_lookback_ms() -> u64 {
    3000
}

fn default_startup_lookback_ms() -> u64 {
    5000
}

fn default_fallback_silence_ms() -> u64 {
    3000
}

fn default_cycle_ms() -> u64 {
    9000
}

fn default_time_phase_end_ms() -> u64 {
    5000
}

fn default_emoji_phase_end_ms() -> u64 {
    7000
}

fn default_refresh_ms() -> u64 {
    500
}

fn default_flip_ms() -> u64 {
    200
}

fn default_drag_threshold_dp() -> f32 {
    10.0
}

fn default_window_size_dp() -> u32 {
    45
}

fn default_initial_x() -> i32 {
    100
}

fn default_initial_y() -> i32 {
    200
}

fn default_switch_pending_timeout_ms() -> Option<u64> {
    Some(60_000)
}

/// Runtime configuration for the island.
///
/// Every field has a default so a partial JSON file is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IslandConfig {
    /// Foreground monitor poll cadence
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Trailing window for each poll
    #[serde(default = "default_poll_lookback_ms")]
    pub poll_lookback_ms: u64,
    /// One-shot lookback used to seed the monitor on start
    #[serde(default = "default_startup_lookback_ms")]
    pub startup_lookback_ms: u64,
    /// How long the event stream must be silent before poller results are used
    #[serde(default = "default_fallback_silence_ms")]
    pub fallback_silence_ms: u64,
    /// Length of the focus display cycle
    #[serde(default = "default_cycle_ms")]
    pub cycle_ms: u64,
    /// End of the time phase within the cycle
    #[serde(default = "default_time_phase_end_ms")]
    pub time_phase_end_ms: u64,
    /// End of the emoji phase within the cycle
    #[serde(default = "default_emoji_phase_end_ms")]
    pub emoji_phase_end_ms: u64,
    /// Refresh cadence of the time view
    #[serde(default = "default_refresh_ms")]
    pub refresh_ms: u64,
    /// Duration of each half of a flip animation
    #[serde(default = "default_flip_ms")]
    pub flip_ms: u64,
    /// Movement that turns a touch into a drag
    #[serde(default = "default_drag_threshold_dp")]
    pub drag_threshold_dp: f32,
    /// Side of the square overlay window
    #[serde(default = "default_window_size_dp")]
    pub window_size_dp: u32,
    /// Initial window x in pixels
    #[serde(default = "default_initial_x")]
    pub initial_x: i32,
    /// Initial window y in pixels
    #[serde(default = "default_initial_y")]
    pub initial_y: i32,
    /// Auto-end a focus session left switch-pending this long (None disables)
    #[serde(default = "default_switch_pending_timeout_ms")]
    pub switch_pending_timeout_ms: Option<u64>,
    /// IPC socket path (defaults under the home directory)
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    /// Rule store file (defaults under the data directory)
    #[serde(default)]
    pub rules_path: Option<PathBuf>,
}

impl Default for IslandConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            poll_lookback_ms: default_poll_lookback_ms(),
            startup_lookback_ms: default_startup_lookback_ms(),
            fallback_silence_ms: default_fallback_silence_ms(),
            cycle_ms: default_cycle_ms(),
            time_phase_end_ms: default_time_phase_end_ms(),
            emoji_phase_end_ms: default_emoji_phase_end_ms(),
            refresh_ms: default_refresh_ms(),
            flip_ms: default_flip_ms(),
            drag_threshold_dp: default_drag_threshold_dp(),
            window_size_dp: default_window_size_dp(),
            initial_x: default_initial_x(),
            initial_y: default_initial_y(),
            switch_pending_timeout_ms: default_switch_pending_timeout_ms(),
            socket_path: None,
            rules_path: None,
        }
    }
}

impl IslandConfig {
    /// Sets the monitor poll interval.
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Sets the switch-pending timeout (None disables the guard).
    pub fn with_switch_pending_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.switch_pending_timeout_ms = ms;
        self
    }

    /// Sets the rule store path.
    pub fn with_rules_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.rules_path = Some(path.into());
        self
    }

    /// Sets the IPC socket path.
    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    /// Loads a configuration file, falling back to defaults for missing keys.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: IslandConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".to_string());
        }
        if self.poll_lookback_ms < self.poll_interval_ms {
            return Err("poll_lookback_ms must cover at least one poll interval".to_string());
        }
        if self.cycle_ms == 0 || self.refresh_ms == 0 {
            return Err("cycle_ms and refresh_ms must be greater than 0".to_string());
        }
        if !(self.time_phase_end_ms <= self.emoji_phase_end_ms
            && self.emoji_phase_end_ms <= self.cycle_ms)
        {
            return Err(
                "display phases must satisfy time_phase_end_ms <= emoji_phase_end_ms <= cycle_ms"
                    .to_string(),
            );
        }
        if self.flip_ms * 2 > self.cycle_ms {
            return Err("flip_ms is too long for the display cycle".to_string());
        }
        if self.drag_threshold_dp.is_nan() || self.drag_threshold_dp <= 0.0 {
            return Err("drag_threshold_dp must be positive".to_string());
        }
        if self.window_size_dp == 0 {
            return Err("window_size_dp must be greater than 0".to_string());
        }
        if self.switch_pending_timeout_ms == Some(0) {
            return Err("switch_pending_timeout_ms must be greater than 0 when set".to_string());
        }
        Ok(())
    }

    /// Resolves the socket path, defaulting to `~/.lumos-island/island.sock`.
    pub fn resolved_socket_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.socket_path {
            return Ok(path.clone());
        }
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine the home directory"))?;
        Ok(home.join(".lumos-island").join("island.sock"))
    }

    /// Resolves the rule store path, defaulting to the platform data directory.
    pub fn resolved_rules_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.rules_path {
            return Ok(path.clone());
        }
        let data = dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| anyhow::anyhow!("Could not determine a data directory"))?;
        Ok(data
            .join("lumos-island")
            .join(format!("{}.json", crate::rules::RULES_NAMESPACE)))
    }
}

// ============================================================================
// Tests
// ============================================================================
