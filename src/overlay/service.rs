//! The overlay service task.
//!
//! One tokio task owns the [`OverlayController`]. Commands arrive over an
//! unbounded mpsc channel through [`OverlayHandle`]; the task runs the
//! transition, then carries out its effects: view updates go to the UI
//! thread, events go to the [`OverlayListener`].

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};

use super::animation::FlipAnimator;
use super::display::CycleTiming;
use super::state::{Effect, OverlayController};
use super::view::UiMessage;
use super::window::WindowSpec;
use crate::clock::SharedClock;
use crate::host::Platform;
use crate::rules::RuleLookup;
use crate::types::{BridgeEvent, IslandConfig, OverlaySnapshot, PromptContext};

/// Receives events the overlay sends upward.
pub trait OverlayListener: Send + Sync {
    fn on_overlay_event(&self, event: BridgeEvent);
}

/// Listener that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl OverlayListener for NoopListener {
    fn on_overlay_event(&self, _event: BridgeEvent) {}
}

/// Commands accepted by the overlay service.
#[derive(Debug)]
pub enum OverlayCommand {
    Configure {
        focusing: bool,
        emoji: Option<String>,
        start_ms: Option<i64>,
    },
    AppSwitched {
        package: String,
        label: String,
    },
    ShowText(String),
    ShowPrompt(PromptContext),
    SetSwitchPending(bool),
    /// The user tapped the island
    Tap,
    Snapshot(oneshot::Sender<OverlaySnapshot>),
    Shutdown,
}

// ============================================================================
// OverlayService
// ============================================================================

/// Collaborators of the overlay service.
#[derive(Clone)]
pub struct OverlayDeps {
    pub clock: SharedClock,
    pub platform: Arc<dyn Platform>,
    pub listener: Arc<dyn OverlayListener>,
    pub rules: Option<Arc<dyn RuleLookup>>,
}

/// State owned by the overlay task.
pub struct OverlayService {
    controller: OverlayController,
    deps: OverlayDeps,
    ui: Sender<UiMessage>,
    commands: mpsc::UnboundedReceiver<OverlayCommand>,
    window_spec: WindowSpec,
    refresh: Duration,
    flip: FlipAnimator,
}

impl OverlayService {
    pub fn new(
        config: &IslandConfig,
        deps: OverlayDeps,
        ui: Sender<UiMessage>,
        commands: mpsc::UnboundedReceiver<OverlayCommand>,
        initial_icon: impl Into<String>,
    ) -> Self {
        let window_spec =
            WindowSpec::for_device(config, deps.platform.sdk_level(), deps.platform.density());
        let controller = OverlayController::new(
            CycleTiming::from(config),
            config.switch_pending_timeout_ms,
        )
        .with_icon_package(initial_icon);

        Self {
            controller,
            deps,
            ui,
            commands,
            window_spec,
            refresh: Duration::from_millis(config.refresh_ms.max(1)),
            flip: FlipAnimator::new(Duration::from_millis(config.flip_ms)),
        }
    }

    /// Runs until a shutdown command or until every handle is dropped.
    pub async fn run(mut self) {
        tracing::info!("Overlay service started");
        self.post(UiMessage::Attach(self.window_spec.clone()));
        let now = self.deps.clock.now_ms();
        let effects = self.controller.render(now);
        self.apply(effects);

        let mut refresh = interval(self.refresh);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let ticking = self.controller.is_ticking();
            let flip_deadline = self.flip.deadline();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(OverlayCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                _ = refresh.tick(), if ticking => {
                    let now = self.deps.clock.now_ms();
                    let effects = self.controller.tick(now);
                    self.apply(effects);
                }
                _ = sleep_until(flip_deadline.unwrap_or_else(Instant::now)), if flip_deadline.is_some() => {
                    for message in self.flip.complete() {
                        self.post(message);
                    }
                }
            }
        }

        self.flip.cancel();
        self.post(UiMessage::Detach);
        self.post(UiMessage::Shutdown);
        tracing::info!("Overlay service stopped");
    }

    fn handle(&mut self, command: OverlayCommand) {
        let now = self.deps.clock.now_ms();
        let effects = match command {
            OverlayCommand::Configure {
                focusing,
                emoji,
                start_ms,
            } => self.controller.configure(focusing, emoji, start_ms, now),
            OverlayCommand::AppSwitched { package, label } => {
                let rule = self
                    .deps
                    .rules
                    .as_ref()
                    .and_then(|rules| rules.activity_for(&package));
                self.controller.on_app_switched(&package, &label, rule, now)
            }
            OverlayCommand::ShowText(text) => self.controller.show_text(text, now),
            OverlayCommand::ShowPrompt(ctx) => self.controller.show_prompt(ctx, now),
            OverlayCommand::SetSwitchPending(pending) => {
                self.controller.set_switch_pending(pending, now)
            }
            OverlayCommand::Tap => self.controller.tap(now),
            OverlayCommand::Snapshot(reply) => {
                let _ = reply.send(self.controller.snapshot());
                return;
            }
            OverlayCommand::Shutdown => return,
        };
        self.apply(effects);
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::View(message) => self.post(message),
                Effect::Flip { from, to } => {
                    let message = self.flip.start(from, to, Instant::now());
                    self.post(message);
                }
                Effect::CancelFlip => self.flip.cancel(),
                Effect::Emit(event) => {
                    tracing::debug!(event = event.name(), "Overlay event");
                    self.deps.listener.on_overlay_event(event);
                }
                Effect::OpenHostApp => {
                    if let Err(e) = self.deps.platform.launch_host_app() {
                        tracing::warn!(error = %e, "Failed to open host app");
                    }
                }
            }
        }
    }

    fn post(&self, message: UiMessage) {
        if self.ui.send(message).is_err() {
            tracing::debug!("Overlay UI thread is gone");
        }
    }
}

// ============================================================================
// OverlayHandle
// ============================================================================

/// Cloneable sender side of the overlay service.
#[derive(Debug, Clone)]
pub struct OverlayHandle {
    tx: mpsc::UnboundedSender<OverlayCommand>,
}

impl OverlayHandle {
    pub fn new(tx: mpsc::UnboundedSender<OverlayCommand>) -> Self {
        Self { tx }
    }

    fn send(&self, command: OverlayCommand) -> bool {
        match self.tx.send(command) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("Overlay is not running");
                false
            }
        }
    }

    pub fn configure(&self, focusing: bool, emoji: Option<String>, start_ms: Option<i64>) -> bool {
        self.send(OverlayCommand::Configure {
            focusing,
            emoji,
            start_ms,
        })
    }

    pub fn app_switched(&self, package: impl Into<String>, label: impl Into<String>) -> bool {
        self.send(OverlayCommand::AppSwitched {
            package: package.into(),
            label: label.into(),
        })
    }

    pub fn show_text(&self, text: impl Into<String>) -> bool {
        self.send(OverlayCommand::ShowText(text.into()))
    }

    pub fn show_prompt(&self, ctx: PromptContext) -> bool {
        self.send(OverlayCommand::ShowPrompt(ctx))
    }

    pub fn set_switch_pending(&self, pending: bool) -> bool {
        self.send(OverlayCommand::SetSwitchPending(pending))
    }

    pub fn tap(&self) -> bool {
        self.send(OverlayCommand::Tap)
    }

    /// Asks the service to stop. The task finishes on its own.
    pub fn shutdown(&self) -> bool {
        self.send(OverlayCommand::Shutdown)
    }

    /// Current snapshot, or `None` if the service is gone.
    pub async fn snapshot(&self) -> Option<OverlaySnapshot> {
        let (reply, rx) = oneshot::channel();
        if !self.send(OverlayCommand::Snapshot(reply)) {
            return None;
        }
        rx.await.ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
