//! LumosTime Island Library
//!
//! This library provides the native side of the LumosTime floating island:
//! - App-switch detection from window-state events, with a polling fallback
//! - A floating overlay that cycles time, emoji and app icon during focus
//! - Package → activity rules persisted as JSON
//! - A bridge surface (requests, responses, upward events) served over IPC
//! - CLI command parsing and display utilities
//!
//! OS services sit behind the traits in [`host`]; [`host::CatalogHost`]
//! implements them from an in-memory catalog for the headless daemon.

pub mod bridge;
pub mod cli;
pub mod clock;
pub mod daemon;
pub mod detector;
pub mod host;
pub mod monitor;
pub mod overlay;
pub mod rules;
pub mod types;

// Re-export commonly used types for convenience
pub use types::{
    BridgeEvent, BridgeRequest, BridgeResponse, DisplayPhase, ForegroundApp, IslandConfig,
    OverlayMode, OverlaySnapshot, PromptContext, ResponseData, SwitchEvent, SwitchSource,
};

pub use bridge::{Bridge, BridgeError, EventEmitter};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use daemon::IslandRuntime;
pub use detector::{AppSwitchDetector, CurrentAppSlot, SwitchHub, SwitchSink};
pub use host::{CatalogHost, Host, HostError};
pub use monitor::{ForegroundMonitor, MonitorControl};
pub use overlay::{OverlayController, OverlayHandle, OverlayHost};
pub use rules::{RuleLookup, RuleStore, RuleStoreError};
