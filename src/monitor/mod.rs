//! Polling foreground monitor.
//!
//! Fallback detector for hosts where window-state events are unavailable or
//! throttled. Every poll looks at the usage events of a short trailing
//! window and reports the package that most recently moved to the
//! foreground. While running it holds a partial wake-lock and keeps a
//! liveness notice posted.
//!
//! Poll results go through the [`SwitchHub`], which ignores them while the
//! event stream is live.

pub mod wake_lock;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::clock::SharedClock;
use crate::detector::{resolve_label, SwitchHub};
use crate::host::{Host, HostError, PackageResolver, Platform, UsageEventKind, UsageSource};
use crate::types::{ForegroundApp, IslandConfig, SwitchSource};

pub use wake_lock::WakeLockGuard;

/// Wake-lock tag held while the monitor runs.
pub const WAKE_LOCK_TAG: &str = "LumosTime:MonitorWakeLock";

/// Liveness notice shown while nothing has been detected yet.
pub const NOTICE_RUNNING: &str = "LumosTime 正在自动记录中...";

/// Liveness notice after a detection.
pub fn detected_notice(label: &str) -> String {
    format!("检测到应用: {}", label)
}

// ============================================================================
// ForegroundMonitor
// ============================================================================

/// Poll configuration and collaborators. Cheap to clone.
#[derive(Clone)]
pub struct ForegroundMonitor {
    poll_interval: Duration,
    poll_lookback_ms: i64,
    startup_lookback_ms: i64,
    usage: Arc<dyn UsageSource>,
    resolver: Arc<dyn PackageResolver>,
    platform: Arc<dyn Platform>,
    hub: Arc<SwitchHub>,
    clock: SharedClock,
}

impl ForegroundMonitor {
    pub fn new(config: &IslandConfig, host: &Host, hub: Arc<SwitchHub>, clock: SharedClock) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            poll_lookback_ms: i64::try_from(config.poll_lookback_ms).unwrap_or(i64::MAX),
            startup_lookback_ms: i64::try_from(config.startup_lookback_ms).unwrap_or(i64::MAX),
            usage: host.usage.clone(),
            resolver: host.resolver.clone(),
            platform: host.platform.clone(),
            hub,
            clock,
        }
    }

    /// Package that most recently came to the foreground within the window.
    ///
    /// Uses the latest move-to-foreground event; without one, the package
    /// with the latest last-used time.
    pub fn latest_foreground(&self, lookback_ms: i64) -> Result<Option<String>, HostError> {
        let end = self.clock.now_ms();
        let start = end.saturating_sub(lookback_ms);

        let from_events = self
            .usage
            .query_events(start, end)?
            .into_iter()
            .filter(|e| e.kind == UsageEventKind::MoveToForeground)
            .max_by_key(|e| e.timestamp_ms)
            .map(|e| e.package_name);
        if from_events.is_some() {
            return Ok(from_events);
        }

        Ok(self
            .usage
            .query_usage_stats(start, end)?
            .into_iter()
            .max_by_key(|s| s.last_time_used_ms)
            .map(|s| s.package_name))
    }

    /// Starts a monitoring session: seeds the startup package, takes the
    /// wake-lock and posts the liveness notice.
    pub fn begin_session(&self) -> MonitorSession {
        let startup_package = match self.latest_foreground(self.startup_lookback_ms) {
            Ok(package) => package,
            Err(e) => {
                tracing::warn!(error = %e, "Startup lookback failed");
                None
            }
        };
        tracing::info!(startup_package = ?startup_package, "Foreground monitor started");

        let wake_lock = WakeLockGuard::acquire(self.platform.clone(), WAKE_LOCK_TAG);
        self.platform.post_liveness_notice(NOTICE_RUNNING);

        MonitorSession {
            monitor: self.clone(),
            startup_package,
            _wake_lock: wake_lock,
        }
    }

    /// Spawns the poll loop. A crashed session is restarted with a fresh
    /// lookback.
    pub fn spawn(&self) -> MonitorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor = self.clone();

        let task = tokio::spawn(async move {
            loop {
                let session = monitor.begin_session();
                let result = tokio::spawn(session.run(shutdown_rx.clone())).await;
                match result {
                    Ok(()) => break,
                    Err(e) if e.is_panic() => {
                        tracing::error!("Foreground monitor crashed, restarting");
                        tokio::time::sleep(monitor.poll_interval).await;
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        MonitorHandle { shutdown_tx, task }
    }
}

// ============================================================================
// MonitorSession
// ============================================================================

/// One run of the monitor. Dropping it releases the wake-lock.
///
/// Polls are deduplicated against the hub's last emitted package, so a
/// result the hub turned down is offered again on the next poll.
pub struct MonitorSession {
    monitor: ForegroundMonitor,
    /// Foreground app when the session began. Not reported until some
    /// other package has been seen.
    startup_package: Option<String>,
    _wake_lock: WakeLockGuard,
}

impl MonitorSession {
    /// Foreground app found by the startup lookback, until a poll sees
    /// another package.
    pub fn startup_package(&self) -> Option<&str> {
        self.startup_package.as_deref()
    }

    /// Runs one poll. Returns the app if the hub accepted a change.
    pub fn poll_once(&mut self) -> Option<ForegroundApp> {
        let package = match self.monitor.latest_foreground(self.monitor.poll_lookback_ms) {
            Ok(Some(package)) => package,
            Ok(None) => return None,
            Err(e) if e.is_permission_denied() => {
                tracing::warn!(error = %e, "Usage access missing, poll skipped");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Usage query failed");
                return None;
            }
        };

        if self.startup_package.as_deref() == Some(package.as_str()) {
            return None;
        }
        self.startup_package = None;

        if self.monitor.hub.last_package().as_deref() == Some(package.as_str()) {
            return None;
        }

        let label = resolve_label(self.monitor.resolver.as_ref(), &package);
        let emitted = self
            .monitor
            .hub
            .offer(SwitchSource::UsagePoll, &package, &label);
        if emitted.is_some() {
            self.monitor
                .platform
                .post_liveness_notice(&detected_notice(&label));
        }
        emitted
    }

    /// Polls until shutdown is signalled.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.monitor.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.monitor.platform.clear_liveness_notice();
        tracing::info!("Foreground monitor stopped");
    }
}

// ============================================================================
// MonitorHandle / MonitorControl
// ============================================================================

/// Running monitor task.
pub struct MonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signals shutdown and waits for the loop to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Foreground monitor did not stop cleanly");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Start/stop switch for the monitor, shared with the bridge.
pub struct MonitorControl {
    monitor: ForegroundMonitor,
    running: Mutex<Option<MonitorHandle>>,
}

impl MonitorControl {
    pub fn new(monitor: ForegroundMonitor) -> Self {
        Self {
            monitor,
            running: Mutex::new(None),
        }
    }

    /// Starts the monitor. Returns false if it was already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        *running = Some(self.monitor.spawn());
        true
    }

    /// Stops the monitor. Returns false if it was not running.
    pub async fn stop(&self) -> bool {
        let handle = self.running.lock().await.take();
        match handle {
            Some(handle) => {
                handle.stop().await;
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::host::{Catalog, CatalogHost, CatalogPackage};

    const NOW: i64 = 1_700_000_000_000;

    fn setup() -> (Arc<CatalogHost>, Arc<SwitchHub>, ForegroundMonitor) {
        let (host, hub, monitor, _) = setup_with_clock();
        (host, hub, monitor)
    }

    fn setup_with_clock() -> (
        Arc<CatalogHost>,
        Arc<SwitchHub>,
        ForegroundMonitor,
        Arc<ManualClock>,
    ) {
        let host = Arc::new(CatalogHost::new(Catalog {
            packages: vec![
                CatalogPackage::app("com.example.browser", "Browser"),
                CatalogPackage::app("com.example.notes", "Notes"),
            ],
            ..Catalog::default()
        }));
        let clock = Arc::new(ManualClock::new(NOW));
        let hub = Arc::new(SwitchHub::new(clock.clone(), 3000));
        let monitor = ForegroundMonitor::new(
            &IslandConfig::default(),
            &Host::from_catalog(host.clone()),
            hub.clone(),
            clock.clone(),
        );
        (host, hub, monitor, clock)
    }

    mod query_tests {
        use super::*;

        #[test]
        fn test_latest_move_to_foreground_wins() {
            let (host, _, monitor) = setup();
            host.push_foreground("com.example.browser", NOW - 2_000);
            host.push_foreground("com.example.notes", NOW - 500);
            host.push_usage_event("com.example.browser", UsageEventKind::MoveToBackground, NOW - 100);

            assert_eq!(
                monitor.latest_foreground(3_000).unwrap().as_deref(),
                Some("com.example.notes")
            );
        }

        #[test]
        fn test_events_outside_window_ignored() {
            let (host, _, monitor) = setup();
            host.push_foreground("com.example.browser", NOW - 4_000);
            assert_eq!(monitor.latest_foreground(3_000).unwrap(), None);
        }

        #[test]
        fn test_falls_back_to_usage_stats() {
            let (host, _, monitor) = setup();
            host.push_usage_stat("com.example.browser", NOW - 2_000);
            host.push_usage_stat("com.example.notes", NOW - 1_000);
            assert_eq!(
                monitor.latest_foreground(3_000).unwrap().as_deref(),
                Some("com.example.notes")
            );
        }

        #[test]
        fn test_permission_denied_propagates() {
            let (host, _, monitor) = setup();
            host.set_usage_access(false);
            assert!(monitor
                .latest_foreground(3_000)
                .unwrap_err()
                .is_permission_denied());
        }
    }

    mod session_tests {
        use super::*;

        #[test]
        fn test_begin_seeds_from_lookback() {
            let (host, _, monitor) = setup();
            host.push_foreground("com.example.browser", NOW - 1_000);

            let mut session = monitor.begin_session();
            assert_eq!(session.startup_package(), Some("com.example.browser"));
            assert!(host.wake_lock_held());
            assert_eq!(host.notice().as_deref(), Some(NOTICE_RUNNING));

            assert!(session.poll_once().is_none());
        }

        #[test]
        fn test_poll_reports_change_and_updates_notice() {
            let (host, hub, monitor) = setup();
            let mut session = monitor.begin_session();
            host.push_foreground("com.example.notes", NOW - 200);

            let app = session.poll_once().unwrap();
            assert_eq!(app.package_id, "com.example.notes");
            assert_eq!(host.notice().as_deref(), Some("检测到应用: Notes"));
            assert_eq!(hub.last_package().as_deref(), Some("com.example.notes"));
            assert!(session.poll_once().is_none());
        }

        #[test]
        fn test_poll_rejected_while_live_is_retried_after_silence() {
            let (host, hub, monitor, clock) = setup_with_clock();
            let mut session = monitor.begin_session();
            hub.note_event_stream_activity();
            assert!(hub
                .offer(SwitchSource::Accessibility, "com.example.browser", "Browser")
                .is_some());

            clock.advance(1_000);
            host.push_usage_stat("com.example.notes", clock.now_ms() - 100);
            assert!(session.poll_once().is_none());
            assert_eq!(host.notice().as_deref(), Some(NOTICE_RUNNING));

            let mut emitted = None;
            for _ in 0..10 {
                clock.advance(1_000);
                host.push_usage_stat("com.example.notes", clock.now_ms() - 100);
                if let Some(app) = session.poll_once() {
                    emitted = Some(app);
                    break;
                }
            }
            assert_eq!(emitted.unwrap().package_id, "com.example.notes");
            assert_eq!(hub.last_package().as_deref(), Some("com.example.notes"));
            assert_eq!(host.notice().as_deref(), Some("检测到应用: Notes"));
        }

        #[test]
        fn test_startup_package_suppressed_until_change() {
            let (host, hub, monitor) = setup();
            host.push_foreground("com.example.browser", NOW - 1_000);
            let mut session = monitor.begin_session();

            host.push_foreground("com.example.notes", NOW - 500);
            assert!(session.poll_once().is_some());
            assert!(session.startup_package().is_none());

            // Back to the startup app: now a real switch.
            host.push_foreground("com.example.browser", NOW - 100);
            assert_eq!(
                session.poll_once().map(|a| a.package_id).as_deref(),
                Some("com.example.browser")
            );
            assert_eq!(hub.last_package().as_deref(), Some("com.example.browser"));
        }

        #[test]
        fn test_permission_denied_skips_poll() {
            let (host, _, monitor) = setup();
            host.set_usage_access(false);
            let mut session = monitor.begin_session();
            assert!(session.poll_once().is_none());
            assert!(host.usage_query_count() >= 2);
        }

        #[test]
        fn test_drop_releases_wake_lock() {
            let (host, _, monitor) = setup();
            let session = monitor.begin_session();
            assert!(host.wake_lock_held());
            drop(session);
            assert!(!host.wake_lock_held());
        }

        #[test]
        fn test_wake_lock_failure_is_not_fatal() {
            let (host, _, monitor) = setup();
            host.set_fail_wake_lock(true);
            let mut session = monitor.begin_session();
            host.push_foreground("com.example.browser", NOW - 100);
            assert!(session.poll_once().is_some());
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_run_loop_detects_and_stops() {
            let (host, hub, monitor) = setup();
            let control = MonitorControl::new(monitor);
            assert!(control.start().await);
            assert!(!control.start().await);
            tokio::time::sleep(Duration::from_millis(10)).await;

            host.push_foreground("com.example.browser", NOW - 100);
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            assert_eq!(hub.last_package().as_deref(), Some("com.example.browser"));

            assert!(control.stop().await);
            assert!(!control.is_running().await);
            assert!(!host.wake_lock_held());
            assert!(host.notice().is_none());
            assert!(!control.stop().await);
        }

        #[tokio::test(start_paused = true)]
        async fn test_restart_reinitialises() {
            let (host, _, monitor) = setup();
            let control = MonitorControl::new(monitor);
            control.start().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
            control.stop().await;

            control.start().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(control.is_running().await);
            assert_eq!(host.wake_lock_acquire_count(), 2);
            control.stop().await;
        }
    }
}
