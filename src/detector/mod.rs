//! Event-driven app-switch detection.
//!
//! The host delivers window-state-change notifications carrying the
//! package that produced them. Most of them are noise: overlays, keyboards,
//! system dialogs. The detector keeps only user-visible apps and hands
//! them to the [`SwitchHub`], which drops anything equal to the package it
//! last emitted, whichever producer emitted it.
//!
//! A package is *user-interesting* when it is
//! 1. the default launcher or any package declaring a home activity, or
//! 2. launchable from the launcher and not an input method.

pub mod hub;

use std::sync::Arc;

use crate::host::{HostError, PackageResolver};
use crate::types::{ForegroundApp, SwitchSource};

pub use hub::{CurrentAppSlot, SwitchHub, SwitchSink};

/// Filters window-state changes into foreground switches.
pub struct AppSwitchDetector {
    resolver: Arc<dyn PackageResolver>,
    hub: Arc<SwitchHub>,
}

impl AppSwitchDetector {
    pub fn new(resolver: Arc<dyn PackageResolver>, hub: Arc<SwitchHub>) -> Self {
        Self { resolver, hub }
    }

    /// Handles one window-state change. Returns the emitted app, if any.
    pub fn on_window_state_changed(&self, package: Option<&str>) -> Option<ForegroundApp> {
        self.hub.note_event_stream_activity();

        let package = package.map(str::trim).filter(|p| !p.is_empty())?;

        if self.hub.last_package().as_deref() == Some(package) {
            return None;
        }
        if !is_user_interesting(self.resolver.as_ref(), package) {
            tracing::debug!(package = %package, "Ignoring non-user window");
            return None;
        }

        let label = resolve_label(self.resolver.as_ref(), package);
        self.hub.offer(SwitchSource::Accessibility, package, &label)
    }
}

/// Whether the package is a launcher or a launchable non-keyboard app.
///
/// Any resolver error makes the package uninteresting.
pub fn is_user_interesting(resolver: &dyn PackageResolver, package: &str) -> bool {
    match classify(resolver, package) {
        Ok(interesting) => interesting,
        Err(e) => {
            tracing::debug!(package = %package, error = %e, "Package classification failed");
            false
        }
    }
}

fn classify(resolver: &dyn PackageResolver, package: &str) -> Result<bool, HostError> {
    if resolver.default_home_package()?.as_deref() == Some(package) {
        return Ok(true);
    }
    if resolver.home_packages()?.iter().any(|p| p == package) {
        return Ok(true);
    }
    if resolver.input_method_packages()?.iter().any(|p| p == package) {
        return Ok(false);
    }
    resolver.has_launch_intent(package)
}

/// The package's label, or the package id when lookup fails.
pub fn resolve_label(resolver: &dyn PackageResolver, package: &str) -> String {
    match resolver.label(package) {
        Ok(label) if !label.is_empty() => label,
        Ok(_) => package.to_string(),
        Err(e) => {
            tracing::debug!(package = %package, error = %e, "Using package id as label");
            package.to_string()
        }
    }
}
