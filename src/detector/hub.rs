//! Merged switch stream.
//!
//! The accessibility detector and the foreground monitor both observe
//! foreground changes. The hub merges them into one deduplicated stream:
//! event-driven observations always win, and poll results are only used
//! while the event stream has been silent for a while.

use std::sync::{Arc, Mutex, RwLock};

use crate::clock::SharedClock;
use crate::types::{ForegroundApp, SwitchEvent, SwitchSource};

/// Receives every accepted switch, in order.
pub trait SwitchSink: Send + Sync {
    /// Called with the new foreground app and the transition.
    fn on_switch(&self, app: &ForegroundApp, event: &SwitchEvent);
}

// ============================================================================
// CurrentAppSlot
// ============================================================================

/// The most recently emitted foreground package.
///
/// Written by the hub, read by `getRunningApp`.
#[derive(Debug, Clone, Default)]
pub struct CurrentAppSlot {
    inner: Arc<RwLock<Option<String>>>,
}

impl CurrentAppSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest package, if any was detected.
    pub fn get(&self) -> Option<String> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, package: &str) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = Some(package.to_string());
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl SwitchSink for CurrentAppSlot {
    fn on_switch(&self, app: &ForegroundApp, _event: &SwitchEvent) {
        self.set(&app.package_id);
    }
}

// ============================================================================
// SwitchHub
// ============================================================================

#[derive(Debug, Default)]
struct HubState {
    last_package: String,
    last_detected_at: u64,
    last_event_stream_ms: Option<u64>,
}

/// Deduplicating merge point for foreground observations.
pub struct SwitchHub {
    clock: SharedClock,
    fallback_silence_ms: u64,
    state: Mutex<HubState>,
    sinks: RwLock<Vec<Arc<dyn SwitchSink>>>,
}

impl SwitchHub {
    /// Creates a hub. Poll results are accepted once the event stream has
    /// been silent for `fallback_silence_ms`.
    pub fn new(clock: SharedClock, fallback_silence_ms: u64) -> Self {
        Self {
            clock,
            fallback_silence_ms,
            state: Mutex::new(HubState::default()),
            sinks: RwLock::new(Vec::new()),
        }
    }

    /// Registers a consumer of accepted switches.
    pub fn add_sink(&self, sink: Arc<dyn SwitchSink>) {
        self.sinks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(sink);
    }

    /// Records that the event stream delivered something, accepted or not.
    pub fn note_event_stream_activity(&self) {
        let now = self.clock.monotonic_ms();
        self.lock_state().last_event_stream_ms = Some(now);
    }

    /// Whether the event stream spoke within the silence threshold.
    pub fn event_stream_live(&self) -> bool {
        let now = self.clock.monotonic_ms();
        self.is_live(&self.lock_state(), now)
    }

    /// Last emitted package.
    pub fn last_package(&self) -> Option<String> {
        let state = self.lock_state();
        (!state.last_package.is_empty()).then(|| state.last_package.clone())
    }

    /// Offers an observation. Returns the emitted app when accepted.
    pub fn offer(&self, source: SwitchSource, package: &str, label: &str) -> Option<ForegroundApp> {
        let now = self.clock.monotonic_ms();
        let mut state = self.lock_state();

        if source == SwitchSource::UsagePoll && self.is_live(&state, now) {
            tracing::debug!(package = %package, "Poll result superseded by event stream");
            return None;
        }
        if state.last_package == package {
            return None;
        }

        let detected_at = now.max(state.last_detected_at + 1);
        let event = SwitchEvent {
            from_package: std::mem::replace(&mut state.last_package, package.to_string()),
            to_package: package.to_string(),
            timestamp: detected_at,
        };
        state.last_detected_at = detected_at;

        let app = ForegroundApp {
            package_id: package.to_string(),
            display_label: label.to_string(),
            detected_at,
        };

        tracing::info!(
            package = %package,
            label = %label,
            source = source.as_str(),
            "App switched"
        );

        // Dispatch under the state lock so concurrent producers stay ordered.
        for sink in self.sinks.read().unwrap_or_else(|e| e.into_inner()).iter() {
            sink.on_switch(&app, &event);
        }
        drop(state);

        Some(app)
    }

    /// Forgets the last emitted package.
    pub fn reset(&self) {
        let mut state = self.lock_state();
        state.last_package.clear();
        state.last_event_stream_ms = None;
    }

    fn is_live(&self, state: &HubState, now: u64) -> bool {
        state
            .last_event_stream_ms
            .is_some_and(|at| now.saturating_sub(at) <= self.fallback_silence_ms)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
