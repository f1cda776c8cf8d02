//! Wiring of the island's components.
//!
//! ```text
//!   accessibility ─▶ AppSwitchDetector ─┐
//!                                       ├─▶ SwitchHub ─▶ CurrentAppSlot
//!   usage stats ──▶ ForegroundMonitor ──┘             ├─▶ EventEmitter (appSwitched)
//!                                                     └─▶ OverlayHost
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use super::ipc::IpcServer;
use crate::bridge::{Bridge, EventEmitter};
use crate::clock::SharedClock;
use crate::detector::{AppSwitchDetector, CurrentAppSlot, SwitchHub};
use crate::host::Host;
use crate::monitor::{ForegroundMonitor, MonitorControl};
use crate::overlay::OverlayHost;
use crate::rules::RuleStore;
use crate::types::IslandConfig;

/// All components of a running island.
pub struct IslandRuntime {
    hub: Arc<SwitchHub>,
    slot: CurrentAppSlot,
    rules: Arc<RuleStore>,
    detector: Arc<AppSwitchDetector>,
    monitor: Arc<MonitorControl>,
    overlay: Arc<OverlayHost>,
    events: Arc<EventEmitter>,
    bridge: Arc<Bridge>,
}

impl IslandRuntime {
    pub fn new(config: IslandConfig, host: Host, clock: SharedClock, rules: RuleStore) -> Self {
        let rules = Arc::new(rules);
        let events = Arc::new(EventEmitter::new());
        let slot = CurrentAppSlot::new();
        let hub = Arc::new(SwitchHub::new(clock.clone(), config.fallback_silence_ms));

        let overlay = Arc::new(OverlayHost::new(
            config.clone(),
            host.clone(),
            clock.clone(),
            events.clone(),
            Some(rules.clone()),
        ));

        // Slot first so getRunningApp agrees with any event already out.
        hub.add_sink(Arc::new(slot.clone()));
        hub.add_sink(events.clone());
        hub.add_sink(overlay.clone());

        let detector = Arc::new(AppSwitchDetector::new(host.resolver.clone(), hub.clone()));
        let monitor = Arc::new(MonitorControl::new(ForegroundMonitor::new(
            &config,
            &host,
            hub.clone(),
            clock,
        )));

        let bridge = Arc::new(Bridge::new(
            host,
            rules.clone(),
            slot.clone(),
            overlay.clone(),
            monitor.clone(),
            detector.clone(),
            events.clone(),
        ));

        Self {
            hub,
            slot,
            rules,
            detector,
            monitor,
            overlay,
            events,
            bridge,
        }
    }

    pub fn bridge(&self) -> Arc<Bridge> {
        self.bridge.clone()
    }

    pub fn hub(&self) -> &Arc<SwitchHub> {
        &self.hub
    }

    pub fn slot(&self) -> &CurrentAppSlot {
        &self.slot
    }

    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    pub fn detector(&self) -> &Arc<AppSwitchDetector> {
        &self.detector
    }

    pub fn monitor(&self) -> &Arc<MonitorControl> {
        &self.monitor
    }

    pub fn overlay(&self) -> &Arc<OverlayHost> {
        &self.overlay
    }

    pub fn events(&self) -> &Arc<EventEmitter> {
        &self.events
    }

    /// Serves the bridge on `socket_path` until `shutdown` flips, then
    /// stops the monitor and the overlay.
    pub async fn run(&self, socket_path: &Path, shutdown: watch::Receiver<bool>) -> Result<()> {
        let server = IpcServer::new(socket_path)?;
        tracing::info!(socket = %socket_path.display(), "Island daemon listening");

        server.serve(self.bridge(), shutdown).await;
        self.shutdown().await;
        Ok(())
    }

    /// Stops background work. Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.monitor.stop().await {
            tracing::info!("Foreground monitor stopped");
        }
        self.overlay.stop().await;
    }
}
