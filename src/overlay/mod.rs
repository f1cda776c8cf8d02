//! The floating island.
//!
//! [`OverlayHost`] owns the lifecycle: starting it spawns the UI thread
//! (an [`OverlayView`] draining its crossbeam channel) and the
//! [`OverlayService`] task; stopping tears both down and removes the
//! window. While the island is not running, switches are still recorded so
//! the next start shows the right icon.

pub mod animation;
pub mod display;
pub mod gesture;
pub mod service;
pub mod state;
pub mod view;
pub mod window;

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crossbeam_channel::Sender;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::clock::SharedClock;
use crate::detector::SwitchSink;
use crate::host::Host;
use crate::rules::RuleLookup;
use crate::types::{ForegroundApp, IslandConfig, OverlaySnapshot, SwitchEvent};

pub use display::{CycleTiming, Face};
pub use gesture::{GestureOutcome, GestureTracker, TouchEvent};
pub use service::{
    NoopListener, OverlayCommand, OverlayDeps, OverlayHandle, OverlayListener, OverlayService,
};
pub use state::{Effect, Mode, OverlayController};
pub use view::{FaceState, OverlayView, UiMessage, ViewFrame};
pub use window::{OverlayWindow, WindowSpec, WindowType};

struct RunningOverlay {
    handle: OverlayHandle,
    task: JoinHandle<()>,
    ui_thread: Option<thread::JoinHandle<()>>,
    ui_tx: Sender<UiMessage>,
}

/// Starts, feeds and stops the island.
pub struct OverlayHost {
    config: IslandConfig,
    host: Host,
    clock: SharedClock,
    listener: Arc<dyn OverlayListener>,
    rules: Option<Arc<dyn RuleLookup>>,
    running: Mutex<Option<RunningOverlay>>,
    last_app: Mutex<Option<ForegroundApp>>,
}

impl OverlayHost {
    pub fn new(
        config: IslandConfig,
        host: Host,
        clock: SharedClock,
        listener: Arc<dyn OverlayListener>,
        rules: Option<Arc<dyn RuleLookup>>,
    ) -> Self {
        Self {
            config,
            host,
            clock,
            listener,
            rules,
            running: Mutex::new(None),
            last_app: Mutex::new(None),
        }
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningOverlay>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts the island if needed and returns its handle.
    ///
    /// Must be called inside a tokio runtime.
    pub fn ensure_started(&self) -> OverlayHandle {
        let mut running = self.lock_running();
        if let Some(overlay) = running.as_ref() {
            if !overlay.task.is_finished() {
                return overlay.handle.clone();
            }
            tracing::warn!("Overlay service ended unexpectedly, restarting");
        }

        let (ui_tx, ui_rx) = crossbeam_channel::unbounded();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let view = OverlayView::new(
            self.host.window.clone(),
            self.host.resolver.clone(),
            ui_rx,
            command_tx.clone(),
            GestureTracker::new(self.config.drag_threshold_dp, self.host.platform.density()),
        );
        let ui_thread = thread::Builder::new()
            .name("island-ui".to_string())
            .spawn(move || view.run());
        let ui_thread = match ui_thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                // Commands still reach the service; only drawing is lost.
                tracing::error!(error = %e, "Failed to spawn island UI thread");
                None
            }
        };

        let initial_icon = self
            .last_app
            .lock()
            .ok()
            .and_then(|app| app.as_ref().map(|a| a.package_id.clone()))
            .unwrap_or_default();
        let deps = OverlayDeps {
            clock: self.clock.clone(),
            platform: self.host.platform.clone(),
            listener: self.listener.clone(),
            rules: self.rules.clone(),
        };
        let service = OverlayService::new(
            &self.config,
            deps,
            ui_tx.clone(),
            command_rx,
            initial_icon,
        );
        let task = tokio::spawn(service.run());

        let handle = OverlayHandle::new(command_tx);
        *running = Some(RunningOverlay {
            handle: handle.clone(),
            task,
            ui_thread,
            ui_tx,
        });
        handle
    }

    /// Handle of the running island.
    pub fn handle(&self) -> Option<OverlayHandle> {
        self.lock_running()
            .as_ref()
            .filter(|o| !o.task.is_finished())
            .map(|o| o.handle.clone())
    }

    pub fn is_running(&self) -> bool {
        self.handle().is_some()
    }

    /// Snapshot of the running island.
    pub async fn snapshot(&self) -> Option<OverlaySnapshot> {
        match self.handle() {
            Some(handle) => handle.snapshot().await,
            None => None,
        }
    }

    /// Sender for feeding raw input to the UI thread.
    pub fn touch_sender(&self) -> Option<Sender<UiMessage>> {
        self.lock_running().as_ref().map(|o| o.ui_tx.clone())
    }

    /// Stops the island and waits for the window to be removed.
    ///
    /// Returns false if it was not running.
    pub async fn stop(&self) -> bool {
        let Some(overlay) = self.lock_running().take() else {
            return false;
        };

        overlay.handle.shutdown();
        if let Err(e) = overlay.task.await {
            tracing::error!(error = %e, "Overlay service failed");
        }
        // The service sends this too; repeated for a service that panicked.
        let _ = overlay.ui_tx.send(UiMessage::Shutdown);

        if let Some(ui_thread) = overlay.ui_thread {
            let joined = tokio::task::spawn_blocking(move || ui_thread.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                tracing::error!("Island UI thread panicked");
            }
        }
        tracing::info!("Overlay stopped");
        true
    }

    /// Last switch seen, running or not.
    pub fn last_app(&self) -> Option<ForegroundApp> {
        self.last_app.lock().ok().and_then(|app| app.clone())
    }
}

impl SwitchSink for OverlayHost {
    fn on_switch(&self, app: &ForegroundApp, _event: &SwitchEvent) {
        if let Ok(mut last) = self.last_app.lock() {
            *last = Some(app.clone());
        }
        if let Some(handle) = self.handle() {
            handle.app_switched(app.package_id.clone(), app.display_label.clone());
        }
    }
}
