//! Upward event delivery.
//!
//! Producers (the switch hub and the overlay task) call into one
//! [`EventEmitter`], which fans each event out to every subscriber over an
//! unbounded channel. Emission happens under one lock, so each subscriber
//! sees events in the order they were produced.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::detector::SwitchSink;
use crate::overlay::OverlayListener;
use crate::types::{BridgeEvent, ForegroundApp, SwitchEvent};

/// Fans upward events out to subscribers.
#[derive(Debug, Default)]
pub struct EventEmitter {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<BridgeEvent>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<mpsc::UnboundedSender<BridgeEvent>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers a new receiver. Dropping it unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<BridgeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    /// Sends `event` to every live subscriber.
    pub fn emit(&self, event: BridgeEvent) {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        tracing::debug!(
            event = event.name(),
            subscribers = subscribers.len(),
            "Event emitted"
        );
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}

impl OverlayListener for EventEmitter {
    fn on_overlay_event(&self, event: BridgeEvent) {
        self.emit(event);
    }
}

impl SwitchSink for EventEmitter {
    fn on_switch(&self, app: &ForegroundApp, _event: &SwitchEvent) {
        self.emit(BridgeEvent::AppSwitched {
            package_name: app.package_id.clone(),
            label: app.display_label.clone(),
        });
    }
}
