//! Focus display cycle and text formatting.

use serde::{Deserialize, Serialize};

use crate::types::{DisplayPhase, IslandConfig};

/// Font size of short texts.
pub const FONT_REGULAR_DP: f32 = 11.0;
/// Font size of texts longer than [`SHORT_TEXT_MAX_CHARS`].
pub const FONT_SMALL_DP: f32 = 9.0;
/// Longest text shown at the regular size.
pub const SHORT_TEXT_MAX_CHARS: usize = 5;

const ONE_HOUR_MS: i64 = 60 * 60 * 1000;
const ONE_DAY_MS: i64 = 24 * ONE_HOUR_MS;

/// One of the three child views of the island.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Face {
    /// Text view (elapsed time, prompt, transient text)
    Time,
    /// Emoji view
    Emoji,
    /// App icon view
    Icon,
}

impl DisplayPhase {
    /// The child view that renders this phase.
    pub fn face(self) -> Face {
        match self {
            DisplayPhase::Time | DisplayPhase::SwitchWarn => Face::Time,
            DisplayPhase::Emoji => Face::Emoji,
            DisplayPhase::Icon => Face::Icon,
        }
    }
}

/// Phase boundaries of the focus cycle, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTiming {
    pub cycle_ms: i64,
    pub time_end_ms: i64,
    pub emoji_end_ms: i64,
}

impl Default for CycleTiming {
    fn default() -> Self {
        Self::from(&IslandConfig::default())
    }
}

impl From<&IslandConfig> for CycleTiming {
    fn from(config: &IslandConfig) -> Self {
        let ms = |v: u64| i64::try_from(v).unwrap_or(i64::MAX);
        Self {
            cycle_ms: ms(config.cycle_ms).max(1),
            time_end_ms: ms(config.time_phase_end_ms),
            emoji_end_ms: ms(config.emoji_phase_end_ms),
        }
    }
}

impl CycleTiming {
    /// Phase shown at `now_ms` for a cycle anchored at `anchor_ms`.
    pub fn phase_at(&self, anchor_ms: i64, now_ms: i64) -> DisplayPhase {
        let offset = now_ms.saturating_sub(anchor_ms).rem_euclid(self.cycle_ms);
        if offset < self.time_end_ms {
            DisplayPhase::Time
        } else if offset < self.emoji_end_ms {
            DisplayPhase::Emoji
        } else {
            DisplayPhase::Icon
        }
    }
}

/// Elapsed time since `start_ms`, as shown on the island.
///
/// A missing start, a start in the future or a session of 24 hours or more
/// shows `00:00`.
pub fn format_elapsed(start_ms: i64, now_ms: i64) -> String {
    if start_ms <= 0 {
        return format_duration(0);
    }
    let elapsed = now_ms.saturating_sub(start_ms);
    if !(0..ONE_DAY_MS).contains(&elapsed) {
        return format_duration(0);
    }
    format_duration(elapsed)
}

/// `mm:ss` under an hour, `hh:mm` from there on.
pub fn format_duration(ms: i64) -> String {
    let ms = ms.max(0);
    if ms < ONE_HOUR_MS {
        let secs = ms / 1000;
        format!("{:02}:{:02}", secs / 60, secs % 60)
    } else {
        let mins = ms / 60_000;
        format!("{:02}:{:02}", mins / 60, mins % 60)
    }
}

/// Font size for a text-view string.
pub fn font_size_for(text: &str) -> f32 {
    if text.chars().count() > SHORT_TEXT_MAX_CHARS {
        FONT_SMALL_DP
    } else {
        FONT_REGULAR_DP
    }
}

/// Text shown in prompt mode.
pub fn prompt_text(label: &str) -> String {
    format!("开始?\n{}", label)
}
