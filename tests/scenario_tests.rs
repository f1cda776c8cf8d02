//! End-to-end scenarios for the island.
//!
//! These tests drive the wired runtime (detector, hub, overlay, bridge,
//! rules) with the catalog host, and the overlay controller with explicit
//! wall-clock times:
//! - Simple switch with keyboard filtering and dedup
//! - Prompt accepted by a tap
//! - Focus display cycle
//! - Stop requested from the island
//! - Screen-off masking
//! - Rule round-trip
//! - Detector and monitor interleaved on one merged stream

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use lumos_island::bridge::SCREEN_OFF;
use lumos_island::host::{Catalog, CatalogHost, CatalogPackage, Host};
use lumos_island::overlay::{CycleTiming, Effect, OverlayController};
use lumos_island::types::{
    AppRuleParams, BridgeEvent, BridgeRequest, DisplayPhase, FloatingParams, OverlayMode,
    PackageParams, PromptParams,
};
use lumos_island::monitor::MonitorSession;
use lumos_island::{Clock, ForegroundMonitor, IslandConfig, IslandRuntime, ManualClock, RuleStore};

// ============================================================================
// Test Helpers
// ============================================================================

const T0: i64 = 1_700_000_000_000;

fn catalog() -> Arc<CatalogHost> {
    Arc::new(CatalogHost::new(Catalog {
        packages: vec![
            CatalogPackage::launcher("com.android.launcher", "Launcher"),
            CatalogPackage::app("com.example.browser", "Browser"),
            CatalogPackage::app("com.example.app", "App"),
            CatalogPackage::input_method("com.example.ime", "Keyboard"),
        ],
        ..Catalog::default()
    }))
}

fn runtime_with(catalog: Arc<CatalogHost>, rules: RuleStore) -> IslandRuntime {
    IslandRuntime::new(
        IslandConfig::default(),
        Host::from_catalog(catalog),
        Arc::new(ManualClock::new(T0)),
        rules,
    )
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<BridgeEvent>) -> BridgeEvent {
    timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event timed out")
        .expect("event channel closed")
}

fn drain_switches(events: &mut mpsc::UnboundedReceiver<BridgeEvent>) -> Vec<String> {
    let mut packages = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let BridgeEvent::AppSwitched { package_name, .. } = event {
            packages.push(package_name);
        }
    }
    packages
}

fn controller() -> OverlayController {
    OverlayController::new(CycleTiming::default(), Some(60_000))
}

fn is_two_digit_pair(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 5
        && bytes[2] == b':'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 2 || b.is_ascii_digit())
}

// ============================================================================
// Scenario 1: Simple switch
// ============================================================================

#[tokio::test]
async fn simple_switch_filters_keyboard_and_repeats() {
    let runtime = runtime_with(catalog(), RuleStore::in_memory());
    let mut events = runtime.events().subscribe();

    for package in [
        "com.android.launcher",
        "com.example.browser",
        "com.example.ime",
        "com.example.browser",
    ] {
        runtime.detector().on_window_state_changed(Some(package));
    }

    assert_eq!(
        drain_switches(&mut events),
        vec!["com.android.launcher", "com.example.browser"]
    );
    assert_eq!(runtime.bridge().running_app(), "com.example.browser");
}

#[tokio::test]
async fn successive_switches_never_repeat_a_package() {
    let runtime = runtime_with(catalog(), RuleStore::in_memory());
    let mut events = runtime.events().subscribe();

    let noisy = [
        "com.example.app",
        "com.example.app",
        "com.example.ime",
        "android",
        "com.example.app",
        "com.example.browser",
        "com.example.ime",
        "com.example.browser",
        "com.android.launcher",
        "com.example.app",
    ];
    for package in noisy {
        runtime.detector().on_window_state_changed(Some(package));
    }
    runtime.detector().on_window_state_changed(None);

    let emitted = drain_switches(&mut events);
    assert_eq!(
        emitted,
        vec![
            "com.example.app",
            "com.example.browser",
            "com.android.launcher",
            "com.example.app"
        ]
    );
    assert!(emitted.windows(2).all(|w| w[0] != w[1]));
    assert!(!emitted.iter().any(|p| p == "com.example.ime"));
}

// ============================================================================
// Scenario 2: Prompt and start
// ============================================================================

#[tokio::test]
async fn prompt_tap_starts_focus() {
    let rules = RuleStore::in_memory();
    rules.upsert("com.example.app", "study").unwrap();
    let runtime = runtime_with(catalog(), rules);
    let bridge = runtime.bridge();
    let mut events = runtime.events().subscribe();

    let response = bridge
        .handle(BridgeRequest::StartFloatingWindow {
            params: FloatingParams::idle(),
        })
        .await;
    assert!(response.is_success());

    let response = bridge
        .handle(BridgeRequest::ShowPrompt {
            params: PromptParams {
                package_name: Some("com.example.app".to_string()),
                label: Some("App".to_string()),
                real_app_name: Some("App".to_string()),
                activity_id: Some("study".to_string()),
            },
        })
        .await;
    assert!(response.is_success());

    let handle = runtime.overlay().handle().expect("overlay running");
    assert!(handle.tap());

    assert_eq!(
        next_event(&mut events).await,
        BridgeEvent::StartFocusFromPrompt {
            package_name: "com.example.app".to_string(),
            app_label: "App".to_string(),
            real_app_name: "App".to_string(),
            activity_id: "study".to_string(),
        }
    );

    let snapshot = runtime.overlay().snapshot().await.unwrap();
    assert_eq!(snapshot.mode, OverlayMode::Transient);
    assert_eq!(snapshot.text.as_deref(), Some("开始计时"));

    runtime.shutdown().await;
}

// ============================================================================
// Scenario 3: Focus cycle
// ============================================================================

#[test]
fn focus_cycle_faces() {
    let mut overlay = controller().with_icon_package("com.example.browser");
    overlay.configure(true, Some("🎯".to_string()), Some(T0), T0);

    overlay.tick(T0 + 2_000);
    let snapshot = overlay.snapshot();
    assert_eq!(snapshot.display_phase, DisplayPhase::Time);
    assert_eq!(snapshot.text.as_deref(), Some("00:02"));

    overlay.tick(T0 + 5_500);
    let snapshot = overlay.snapshot();
    assert_eq!(snapshot.display_phase, DisplayPhase::Emoji);
    assert_eq!(snapshot.emoji.as_deref(), Some("🎯"));

    overlay.tick(T0 + 8_000);
    let snapshot = overlay.snapshot();
    assert_eq!(snapshot.display_phase, DisplayPhase::Icon);
    assert_eq!(snapshot.current_icon_package, "com.example.browser");

    overlay.tick(T0 + 9_500);
    let snapshot = overlay.snapshot();
    assert_eq!(snapshot.display_phase, DisplayPhase::Time);
    assert_eq!(snapshot.text.as_deref(), Some("00:09"));
}

#[test]
fn focus_phase_changes_flip_faces() {
    let mut overlay = controller();
    overlay.configure(true, Some("🎯".to_string()), Some(T0), T0);

    let effects = overlay.tick(T0 + 5_000);
    assert!(effects.iter().any(|e| matches!(e, Effect::Flip { .. })));

    let effects = overlay.tick(T0 + 5_500);
    assert!(!effects.iter().any(|e| matches!(e, Effect::Flip { .. })));
}

#[test]
fn elapsed_text_is_two_digit_pairs_under_a_day() {
    let mut overlay = controller();
    overlay.configure(true, None, Some(T0), T0);

    for elapsed_ms in [0, 999, 59_999, 60_000, 3_599_999, 3_600_000, 36_000_000, 86_399_999] {
        overlay.render(T0 + elapsed_ms);
        let text = overlay.snapshot().text.unwrap();
        assert!(is_two_digit_pair(&text), "{} ms rendered as {:?}", elapsed_ms, text);
    }
}

#[test]
fn focus_always_has_a_start() {
    let mut overlay = controller();
    for start in [Some(0), Some(-5), Some(T0 + 60_000), None] {
        overlay.configure(true, None, start, T0);
        let snapshot = overlay.snapshot();
        assert_eq!(snapshot.mode, OverlayMode::Focus);
        assert!(snapshot.focus_start_ms > 0);
    }
}

#[test]
fn repeated_update_is_idempotent() {
    let mut overlay = controller();
    overlay.configure(true, Some("📚".to_string()), Some(T0), T0 + 1_000);
    let first = overlay.snapshot();
    overlay.configure(true, Some("📚".to_string()), Some(T0), T0 + 1_000);
    assert_eq!(overlay.snapshot(), first);
}

// ============================================================================
// Scenario 4: Stop from overlay
// ============================================================================

#[test]
fn tap_in_focus_requests_stop_and_stays_focused() {
    let mut overlay = controller();
    overlay.configure(true, Some("🎯".to_string()), Some(T0), T0);

    let effects = overlay.tap(T0 + 3_000);
    assert_eq!(
        effects,
        vec![Effect::Emit(BridgeEvent::StopFocusFromFloating {})]
    );
    assert_eq!(overlay.snapshot().mode, OverlayMode::Focus);
}

// ============================================================================
// Scenario 5: Screen-off masking
// ============================================================================

#[tokio::test]
async fn screen_off_masks_running_app() {
    let catalog = catalog();
    let runtime = runtime_with(catalog.clone(), RuleStore::in_memory());
    runtime
        .detector()
        .on_window_state_changed(Some("com.example.browser"));

    catalog.set_interactive(false);
    let response = runtime.bridge().handle(BridgeRequest::GetRunningApp).await;
    assert_eq!(
        response.data.unwrap().package_name.as_deref(),
        Some(SCREEN_OFF)
    );

    catalog.set_interactive(true);
    let response = runtime.bridge().handle(BridgeRequest::GetRunningApp).await;
    assert_eq!(
        response.data.unwrap().package_name.as_deref(),
        Some("com.example.browser")
    );
}

// ============================================================================
// Scenario 6: Rule round-trip
// ============================================================================

#[tokio::test]
async fn rule_round_trip_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("AppUsageRules.json");
    let runtime = runtime_with(catalog(), RuleStore::open(&path));
    let bridge = runtime.bridge();

    let response = bridge
        .handle(BridgeRequest::SaveAppRule {
            params: AppRuleParams {
                package_name: Some("p".to_string()),
                activity_id: Some("a".to_string()),
            },
        })
        .await;
    assert!(response.is_success());

    let rules = bridge.handle(BridgeRequest::GetAppRules).await;
    assert_eq!(
        rules.data.unwrap().rules.unwrap().get("p").map(String::as_str),
        Some("a")
    );
    assert_eq!(RuleStore::load(&path).unwrap().get("p").as_deref(), Some("a"));

    let response = bridge
        .handle(BridgeRequest::RemoveAppRule {
            params: PackageParams {
                package_name: Some("p".to_string()),
            },
        })
        .await;
    assert!(response.is_success());

    let rules = bridge.handle(BridgeRequest::GetAppRules).await;
    assert!(rules.data.unwrap().rules.unwrap().is_empty());
    assert!(RuleStore::load(&path).unwrap().get_all().is_empty());
}

#[tokio::test]
async fn rule_without_activity_is_rejected() {
    let runtime = runtime_with(catalog(), RuleStore::in_memory());
    let response = runtime
        .bridge()
        .handle(BridgeRequest::SaveAppRule {
            params: AppRuleParams {
                package_name: Some("p".to_string()),
                activity_id: None,
            },
        })
        .await;
    assert!(!response.is_success());
    assert_eq!(response.message, "Missing packageName or activityId");
}

// ============================================================================
// Merged stream: detector and monitor interleaved
// ============================================================================

struct MergedStream {
    catalog: Arc<CatalogHost>,
    clock: Arc<ManualClock>,
    runtime: IslandRuntime,
    session: MonitorSession,
}

impl MergedStream {
    fn new() -> Self {
        let catalog = catalog();
        let clock = Arc::new(ManualClock::new(T0));
        let runtime = IslandRuntime::new(
            IslandConfig::default(),
            Host::from_catalog(catalog.clone()),
            clock.clone(),
            RuleStore::in_memory(),
        );
        let monitor = ForegroundMonitor::new(
            &IslandConfig::default(),
            &Host::from_catalog(catalog.clone()),
            runtime.hub().clone(),
            clock.clone(),
        );
        let session = monitor.begin_session();
        Self {
            catalog,
            clock,
            runtime,
            session,
        }
    }

    fn window_change(&self, package: &str) -> bool {
        self.runtime
            .detector()
            .on_window_state_changed(Some(package))
            .is_some()
    }

    /// Advances the clock, makes `package` the latest foreground app and polls.
    fn poll_after(&mut self, ms: u64, package: &str) -> bool {
        self.clock.advance(ms);
        self.catalog
            .push_foreground(package, self.clock.now_ms() - 100);
        self.session.poll_once().is_some()
    }
}

#[tokio::test]
async fn poll_missed_by_events_recovers_once_stream_is_silent() {
    let mut stream = MergedStream::new();
    let mut events = stream.runtime.events().subscribe();

    assert!(stream.window_change("com.example.browser"));
    assert!(!stream.poll_after(1_000, "com.example.app"));

    let recovered = (0..10).any(|_| stream.poll_after(1_000, "com.example.app"));
    assert!(recovered);
    assert_eq!(stream.runtime.bridge().running_app(), "com.example.app");
    assert_eq!(
        drain_switches(&mut events),
        vec!["com.example.browser", "com.example.app"]
    );
}

#[tokio::test]
async fn return_to_app_after_poll_recovery_is_emitted() {
    let mut stream = MergedStream::new();
    let mut events = stream.runtime.events().subscribe();

    assert!(stream.window_change("com.example.browser"));
    assert!(stream.poll_after(5_000, "com.example.app"));
    assert!(stream.window_change("com.example.browser"));

    assert_eq!(stream.runtime.bridge().running_app(), "com.example.browser");
    let emitted = drain_switches(&mut events);
    assert_eq!(
        emitted,
        vec!["com.example.browser", "com.example.app", "com.example.browser"]
    );
}

#[tokio::test]
async fn producers_never_repeat_each_other() {
    let mut stream = MergedStream::new();
    let mut events = stream.runtime.events().subscribe();

    assert!(stream.window_change("com.example.app"));
    // Same app seen by the poller once the stream is silent.
    assert!(!stream.poll_after(4_000, "com.example.app"));
    // Same app reported again by the detector after a poll emission.
    assert!(stream.poll_after(1_000, "com.example.browser"));
    assert!(!stream.window_change("com.example.browser"));
    assert!(!stream.poll_after(500, "com.example.browser"));

    let emitted = drain_switches(&mut events);
    assert_eq!(emitted, vec!["com.example.app", "com.example.browser"]);
    assert!(emitted.windows(2).all(|w| w[0] != w[1]));
}
