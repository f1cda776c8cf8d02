//! OS collaborators.
//!
//! The island never talks to the operating system directly. Everything it
//! needs from the host is expressed as a trait here:
//!
//! - [`PackageResolver`]: installed packages, launch intents, home
//!   activities, input methods, labels and icons
//! - [`UsageSource`]: foreground-transition events and usage statistics
//! - [`Platform`]: power state, permissions, settings pages, wake-lock,
//!   liveness notice
//! - [`OverlayWindow`](crate::overlay::OverlayWindow): the window the island
//!   is drawn in (defined next to the overlay)
//!
//! [`CatalogHost`] implements all of them from an in-memory package
//! catalog. It backs the headless daemon and the tests.

pub mod catalog;
pub mod error;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::overlay::OverlayWindow;

pub use catalog::{Catalog, CatalogHost, CatalogPackage};
pub use error::HostError;

// ============================================================================
// Package metadata
// ============================================================================

/// Installed package metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Package identifier
    pub package_name: String,
    /// Whether the package ships with the system image
    pub is_system: bool,
    /// Whether a system package has been updated by the user
    pub is_updated_system: bool,
}

/// An app icon as handed over by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppIcon {
    /// Already rasterised RGBA pixels.
    Bitmap {
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
        /// RGBA8 pixel data, `width * height * 4` bytes
        rgba: Vec<u8>,
    },
    /// Encoded image bytes (PNG).
    Encoded(Vec<u8>),
    /// A drawable rendered on demand; a non-positive size means "no
    /// intrinsic size".
    Vector {
        /// Intrinsic width, may be <= 0
        intrinsic_width: i32,
        /// Intrinsic height, may be <= 0
        intrinsic_height: i32,
        /// Fill colour (RGBA)
        color: [u8; 4],
    },
}

impl AppIcon {
    /// The generic system app icon, used when nothing else resolves.
    pub fn generic() -> Self {
        AppIcon::Vector {
            intrinsic_width: -1,
            intrinsic_height: -1,
            color: [0x9C, 0xA3, 0xAF, 0xFF],
        }
    }
}

/// Which icon the island ended up showing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "package", rename_all = "snake_case")]
pub enum IconRef {
    /// The requested app's own icon
    App(String),
    /// The host app's icon (fallback)
    Host,
    /// The generic system icon (last resort)
    #[default]
    Generic,
}

// ============================================================================
// Usage events
// ============================================================================

/// Kind of a usage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageEventKind {
    /// An activity moved to the foreground
    MoveToForeground,
    /// An activity moved to the background
    MoveToBackground,
    /// Anything else
    Other,
}

/// A foreground-transition record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Package the event belongs to
    pub package_name: String,
    /// Event kind
    pub kind: UsageEventKind,
    /// Wall-clock timestamp in milliseconds
    pub timestamp_ms: i64,
}

/// Aggregated usage for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStat {
    /// Package identifier
    pub package_name: String,
    /// Last time the package was in the foreground
    pub last_time_used_ms: i64,
}

/// Settings pages the island can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsPage {
    /// Accessibility services
    Accessibility,
    /// "Display over other apps" for the host package
    OverlayPermission,
}

// ============================================================================
// Traits
// ============================================================================

/// Installed-package queries.
pub trait PackageResolver: Send + Sync {
    /// Package of the default launcher, if any.
    fn default_home_package(&self) -> Result<Option<String>, HostError>;

    /// Every package that declares a home activity.
    fn home_packages(&self) -> Result<Vec<String>, HostError>;

    /// Packages of the installed input methods.
    fn input_method_packages(&self) -> Result<Vec<String>, HostError>;

    /// Whether the package can be launched from the launcher.
    fn has_launch_intent(&self, package: &str) -> Result<bool, HostError>;

    /// User-visible label.
    fn label(&self, package: &str) -> Result<String, HostError>;

    /// App icon.
    fn icon(&self, package: &str) -> Result<AppIcon, HostError>;

    /// All installed packages.
    fn installed_packages(&self) -> Result<Vec<PackageInfo>, HostError>;

    /// The host app's own package.
    fn host_package(&self) -> String;
}

/// Foreground usage queries.
pub trait UsageSource: Send + Sync {
    /// Usage events with `start_ms <= timestamp < end_ms`.
    fn query_events(&self, start_ms: i64, end_ms: i64) -> Result<Vec<UsageEvent>, HostError>;

    /// Per-package usage within the window.
    fn query_usage_stats(&self, start_ms: i64, end_ms: i64) -> Result<Vec<UsageStat>, HostError>;
}

/// Device state, permissions and system services.
pub trait Platform: Send + Sync {
    /// Whether the screen is on and the device interactive.
    fn is_interactive(&self) -> bool;

    /// Whether the island's accessibility service is enabled.
    fn accessibility_enabled(&self) -> bool;

    /// Whether the host may draw over other apps.
    fn can_draw_overlays(&self) -> bool;

    /// Opens a settings page for the user.
    fn open_settings(&self, page: SettingsPage) -> Result<(), HostError>;

    /// Brings the host app to the front.
    fn launch_host_app(&self) -> Result<(), HostError>;

    /// OS API level.
    fn sdk_level(&self) -> u32;

    /// Display density (px per dp).
    fn density(&self) -> f32;

    /// Acquires a partial wake-lock.
    fn acquire_wake_lock(&self, tag: &str) -> Result<(), HostError>;

    /// Releases a previously acquired wake-lock.
    fn release_wake_lock(&self, tag: &str) -> Result<(), HostError>;

    /// Posts or replaces the persistent liveness notice.
    fn post_liveness_notice(&self, text: &str);

    /// Removes the liveness notice.
    fn clear_liveness_notice(&self);
}

// ============================================================================
// Host bundle
// ============================================================================

/// All host collaborators, shared by the runtime's components.
#[derive(Clone)]
pub struct Host {
    /// Package queries
    pub resolver: Arc<dyn PackageResolver>,
    /// Usage queries
    pub usage: Arc<dyn UsageSource>,
    /// Device services
    pub platform: Arc<dyn Platform>,
    /// Overlay window
    pub window: Arc<dyn OverlayWindow>,
}

impl Host {
    /// Uses one catalog host for every collaborator.
    pub fn from_catalog(catalog: Arc<CatalogHost>) -> Self {
        Self {
            resolver: catalog.clone(),
            usage: catalog.clone(),
            platform: catalog.clone(),
            window: catalog,
        }
    }
}

/// Resolves the icon to show for `package`, falling back to the host icon
/// and then to the generic icon.
pub fn resolve_icon(resolver: &dyn PackageResolver, package: &str) -> (IconRef, AppIcon) {
    match resolver.icon(package) {
        Ok(icon) => (IconRef::App(package.to_string()), icon),
        Err(e) => {
            tracing::warn!(package = %package, error = %e, "Could not find app icon");
            match resolver.icon(&resolver.host_package()) {
                Ok(icon) => (IconRef::Host, icon),
                Err(_) => (IconRef::Generic, AppIcon::generic()),
            }
        }
    }
}
