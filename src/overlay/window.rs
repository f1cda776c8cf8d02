//! Overlay window parameters and the window-manager seam.

use serde::{Deserialize, Serialize};

use super::view::ViewFrame;
use crate::host::HostError;
use crate::types::IslandConfig;

/// First API level with the application-overlay window type.
pub const APPLICATION_OVERLAY_MIN_SDK: u32 = 26;

/// Window type requested from the window manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    /// Modern overlay type
    ApplicationOverlay,
    /// Legacy phone-level window
    Phone,
}

/// Layout parameters of the island window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub width_px: i32,
    pub height_px: i32,
    /// Offset from the top-start corner
    pub x: i32,
    pub y: i32,
    pub window_type: WindowType,
    /// The island never takes input focus
    pub focusable: bool,
    pub translucent: bool,
}

impl WindowSpec {
    /// Parameters for a device with the given API level and density.
    pub fn for_device(config: &IslandConfig, sdk_level: u32, density: f32) -> Self {
        let side = dp_to_px(config.window_size_dp as f32, density);
        let window_type = if sdk_level >= APPLICATION_OVERLAY_MIN_SDK {
            WindowType::ApplicationOverlay
        } else {
            WindowType::Phone
        };
        Self {
            width_px: side,
            height_px: side,
            x: config.initial_x,
            y: config.initial_y,
            window_type,
            focusable: false,
            translucent: true,
        }
    }
}

/// Converts density-independent pixels to pixels.
pub fn dp_to_px(dp: f32, density: f32) -> i32 {
    (dp * density).round() as i32
}

/// The window the island is drawn in.
///
/// Called from the UI thread only. Failures are reported, never retried.
pub trait OverlayWindow: Send + Sync {
    /// Adds the island view with the given parameters.
    fn add_view(&self, spec: &WindowSpec) -> Result<(), HostError>;

    /// Moves the window.
    fn update_position(&self, x: i32, y: i32) -> Result<(), HostError>;

    /// Redraws the island with the given view state.
    fn present(&self, frame: &ViewFrame) -> Result<(), HostError>;

    /// Removes the island view.
    fn remove_view(&self) -> Result<(), HostError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modern_device() {
        let spec = WindowSpec::for_device(&IslandConfig::default(), 34, 2.0);
        assert_eq!(spec.width_px, 90);
        assert_eq!(spec.height_px, 90);
        assert_eq!((spec.x, spec.y), (100, 200));
        assert_eq!(spec.window_type, WindowType::ApplicationOverlay);
        assert!(!spec.focusable);
        assert!(spec.translucent);
    }

    #[test]
    fn test_legacy_device() {
        let spec = WindowSpec::for_device(&IslandConfig::default(), 25, 1.5);
        assert_eq!(spec.window_type, WindowType::Phone);
        assert_eq!(spec.width_px, 68);
    }

    #[test]
    fn test_dp_to_px_rounds() {
        assert_eq!(dp_to_px(10.0, 2.75), 28);
        assert_eq!(dp_to_px(45.0, 1.0), 45);
    }
}
