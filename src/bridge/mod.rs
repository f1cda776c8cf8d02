//! The request/response surface offered to the UI layer.
//!
//! [`Bridge::handle`] takes one [`BridgeRequest`] and always answers with a
//! [`BridgeResponse`]: argument problems and host faults become
//! `status: "error"` responses, never panics or transport errors. Upward
//! events flow separately through the [`EventEmitter`].

pub mod error;
pub mod events;
pub mod icon;

use std::sync::Arc;

use crate::detector::{AppSwitchDetector, CurrentAppSlot};
use crate::host::{Host, HostError, PackageResolver, SettingsPage};
use crate::monitor::MonitorControl;
use crate::overlay::OverlayHost;
use crate::rules::{RuleStore, RuleStoreError};
use crate::types::{
    AppRuleParams, BridgeRequest, BridgeResponse, FloatingParams, InstalledApp, PackageParams,
    PromptContext, PromptParams, ResponseData,
};

pub use error::BridgeError;
pub use events::EventEmitter;
pub use icon::{icon_data_url, IconError, PNG_DATA_URL_PREFIX};

/// Package name reported while the screen is off.
pub const SCREEN_OFF: &str = "SCREEN_OFF";

type BridgeResult = Result<BridgeResponse, BridgeError>;

/// Dispatches bridge requests to the island's components.
pub struct Bridge {
    host: Host,
    rules: Arc<RuleStore>,
    slot: CurrentAppSlot,
    overlay: Arc<OverlayHost>,
    monitor: Arc<MonitorControl>,
    detector: Arc<AppSwitchDetector>,
    events: Arc<EventEmitter>,
}

impl Bridge {
    pub fn new(
        host: Host,
        rules: Arc<RuleStore>,
        slot: CurrentAppSlot,
        overlay: Arc<OverlayHost>,
        monitor: Arc<MonitorControl>,
        detector: Arc<AppSwitchDetector>,
        events: Arc<EventEmitter>,
    ) -> Self {
        Self {
            host,
            rules,
            slot,
            overlay,
            monitor,
            detector,
            events,
        }
    }

    pub fn events(&self) -> &Arc<EventEmitter> {
        &self.events
    }

    pub fn overlay(&self) -> &Arc<OverlayHost> {
        &self.overlay
    }

    /// Handles one request.
    pub async fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        let method = request.method();
        tracing::debug!(method, "Bridge call");
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(method, error = %e, "Bridge call rejected");
                BridgeResponse::error(e.to_string())
            }
        }
    }

    async fn dispatch(&self, request: BridgeRequest) -> BridgeResult {
        match request {
            BridgeRequest::CheckAccessibilityPermission | BridgeRequest::CheckPermissions => {
                let granted = self.host.platform.accessibility_enabled();
                Ok(BridgeResponse::resolved(Some(ResponseData::granted(granted))))
            }
            BridgeRequest::RequestAccessibilityPermission | BridgeRequest::RequestPermissions => {
                self.open_settings(SettingsPage::Accessibility);
                Ok(BridgeResponse::resolved(None))
            }
            BridgeRequest::CheckFloatingPermission => {
                let granted = self.host.platform.can_draw_overlays();
                Ok(BridgeResponse::resolved(Some(ResponseData::granted(granted))))
            }
            BridgeRequest::RequestFloatingPermission => {
                if !self.host.platform.can_draw_overlays() {
                    self.open_settings(SettingsPage::OverlayPermission);
                }
                Ok(BridgeResponse::resolved(None))
            }
            BridgeRequest::GetRunningApp => Ok(BridgeResponse::resolved(Some(
                ResponseData::package_name(self.running_app()),
            ))),
            BridgeRequest::GetInstalledApps => self.installed_apps().await,
            BridgeRequest::SaveAppRule { params } => self.save_rule(params),
            BridgeRequest::RemoveAppRule { params } => self.remove_rule(params),
            BridgeRequest::GetAppRules => Ok(BridgeResponse::resolved(Some(
                ResponseData::rules(self.rules.get_all()),
            ))),
            BridgeRequest::StartFloatingWindow { params } => {
                self.configure_overlay(params);
                Ok(BridgeResponse::success("Floating window started", None))
            }
            BridgeRequest::UpdateFloatingWindow { params } => {
                self.configure_overlay(params);
                Ok(BridgeResponse::resolved(None))
            }
            BridgeRequest::StopFloatingWindow => {
                let message = if self.overlay.stop().await {
                    "Floating window stopped"
                } else {
                    "Floating window was not running"
                };
                Ok(BridgeResponse::success(message, None))
            }
            BridgeRequest::ShowFloatingText { params } => {
                let text = params.text.ok_or(BridgeError::MISSING_TEXT)?;
                match self.overlay.handle() {
                    Some(handle) => {
                        handle.show_text(text);
                    }
                    None => tracing::debug!("Text dropped, floating window not running"),
                }
                Ok(BridgeResponse::resolved(None))
            }
            BridgeRequest::ShowPrompt { params } => {
                let ctx = prompt_context(params)?;
                match self.overlay.handle() {
                    Some(handle) => {
                        handle.show_prompt(ctx);
                    }
                    None => tracing::debug!("Prompt dropped, floating window not running"),
                }
                Ok(BridgeResponse::resolved(None))
            }
            BridgeRequest::SetSwitchPending { params } => {
                let pending = params.pending.unwrap_or(false);
                if let Some(handle) = self.overlay.handle() {
                    handle.set_switch_pending(pending);
                }
                Ok(BridgeResponse::resolved(None))
            }
            BridgeRequest::StartMonitor => {
                let message = if self.monitor.start().await {
                    "Monitor started"
                } else {
                    "Monitor already running"
                };
                Ok(BridgeResponse::success(message, None))
            }
            BridgeRequest::StopMonitor => {
                let message = if self.monitor.stop().await {
                    "Monitor stopped"
                } else {
                    "Monitor was not running"
                };
                Ok(BridgeResponse::success(message, None))
            }
            BridgeRequest::ReportWindowChange { params } => {
                let package = required_package(params)?;
                let data = self
                    .detector
                    .on_window_state_changed(Some(&package))
                    .map(|app| ResponseData::package_name(app.package_id));
                Ok(BridgeResponse::resolved(data))
            }
            BridgeRequest::GetOverlayState => match self.overlay.snapshot().await {
                Some(snapshot) => Ok(BridgeResponse::resolved(Some(ResponseData::overlay(
                    snapshot,
                )))),
                None => Ok(BridgeResponse::success("Floating window not running", None)),
            },
            BridgeRequest::Subscribe => Err(BridgeError::InvalidArgument {
                name: "method",
                reason: "subscribe needs a streaming connection".to_string(),
            }),
        }
    }

    /// Current foreground package as reported to the UI.
    pub fn running_app(&self) -> String {
        if !self.host.platform.is_interactive() {
            return SCREEN_OFF.to_string();
        }
        self.slot.get().unwrap_or_default()
    }

    fn open_settings(&self, page: SettingsPage) {
        if let Err(e) = self.host.platform.open_settings(page) {
            tracing::warn!(error = %e, ?page, "Failed to open settings");
        }
    }

    async fn installed_apps(&self) -> BridgeResult {
        let resolver = self.host.resolver.clone();
        let apps = tokio::task::spawn_blocking(move || list_user_apps(resolver.as_ref()))
            .await
            .map_err(|e| HostError::Other(format!("app listing worker failed: {}", e)))??;
        tracing::debug!(count = apps.len(), "Listed installed apps");
        Ok(BridgeResponse::resolved(Some(ResponseData::apps(apps))))
    }

    fn save_rule(&self, params: AppRuleParams) -> BridgeResult {
        let (Some(package), Some(activity)) = (params.package_name, params.activity_id) else {
            return Err(BridgeError::MISSING_RULE);
        };
        self.rules
            .upsert(&package, &activity)
            .map_err(rule_error)?;
        Ok(BridgeResponse::resolved(None))
    }

    fn remove_rule(&self, params: PackageParams) -> BridgeResult {
        let package = required_package(params)?;
        let removed = self.rules.remove(&package).map_err(rule_error)?;
        if !removed {
            tracing::debug!(package = %package, "No rule to remove");
        }
        Ok(BridgeResponse::resolved(None))
    }

    fn configure_overlay(&self, params: FloatingParams) {
        let start_ms = params.start_time.as_ref().and_then(|value| {
            let parsed = value.as_millis();
            if parsed.is_none() {
                tracing::warn!(?value, "Ignoring unparsable startTime");
            }
            parsed
        });
        let handle = self.overlay.ensure_started();
        handle.configure(params.focusing_flag(), params.icon, start_ms);
    }
}

fn required_package(params: PackageParams) -> Result<String, BridgeError> {
    params
        .package_name
        .filter(|p| !p.trim().is_empty())
        .ok_or(BridgeError::MISSING_PACKAGE)
}

fn rule_error(e: RuleStoreError) -> BridgeError {
    match e {
        RuleStoreError::EmptyPackage | RuleStoreError::EmptyActivity => BridgeError::MISSING_RULE,
        other => BridgeError::Host(HostError::Other(other.to_string())),
    }
}

fn prompt_context(params: PromptParams) -> Result<PromptContext, BridgeError> {
    let package = params
        .package_name
        .filter(|p| !p.is_empty())
        .ok_or(BridgeError::MISSING_PACKAGE)?;
    let activity_id = params
        .activity_id
        .filter(|a| !a.is_empty())
        .ok_or(BridgeError::MISSING_RULE)?;
    let label = params.label.unwrap_or_else(|| package.clone());
    Ok(PromptContext {
        real_app_name: params.real_app_name.unwrap_or_else(|| label.clone()),
        display_label: label,
        target_package: package,
        activity_id,
    })
}

/// Non-system (or updated system) apps with their icons.
pub fn list_user_apps(resolver: &dyn PackageResolver) -> Result<Vec<InstalledApp>, HostError> {
    let apps = resolver
        .installed_packages()?
        .into_iter()
        .filter(|p| !p.is_system || p.is_updated_system)
        .map(|p| {
            let label = resolver
                .label(&p.package_name)
                .unwrap_or_else(|_| p.package_name.clone());
            let icon_base64 = match resolver.icon(&p.package_name) {
                Ok(icon) => icon_data_url(&icon).unwrap_or_else(|e| {
                    tracing::warn!(package = %p.package_name, error = %e, "Icon encoding failed");
                    String::new()
                }),
                Err(_) => String::new(),
            };
            InstalledApp {
                package_name: p.package_name,
                label,
                icon_base64,
            }
        })
        .collect();
    Ok(apps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, SharedClock};
    use crate::detector::SwitchHub;
    use crate::host::{Catalog, CatalogHost, CatalogPackage};
    use crate::monitor::ForegroundMonitor;
    use crate::types::{
        BridgeEvent, FloatingText, IslandConfig, OverlayMode, StartTimeValue, SwitchPendingParams,
    };

    const T0: i64 = 1_700_000_000_000;

    struct Fixture {
        catalog: Arc<CatalogHost>,
        bridge: Bridge,
    }

    fn fixture() -> Fixture {
        let mut system_updated = CatalogPackage::system_service("com.android.chrome", "Chrome");
        system_updated.updated_system = true;
        let catalog = Arc::new(CatalogHost::new(Catalog {
            packages: vec![
                CatalogPackage::app("com.example.app", "App"),
                CatalogPackage::app("com.example.notes", "Notes"),
                CatalogPackage::system_service("com.android.systemui", "System UI"),
                system_updated,
            ],
            ..Catalog::default()
        }));
        let clock: SharedClock = Arc::new(ManualClock::new(T0));
        let config = IslandConfig::default();
        let host = Host::from_catalog(catalog.clone());
        let rules = Arc::new(RuleStore::in_memory());
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
        hub.add_sink(Arc::new(slot.clone()));
        hub.add_sink(overlay.clone());
        hub.add_sink(events.clone());
        let monitor = Arc::new(MonitorControl::new(ForegroundMonitor::new(
            &config,
            &host,
            hub.clone(),
            clock,
        )));
        let detector = Arc::new(AppSwitchDetector::new(host.resolver.clone(), hub));
        let bridge = Bridge::new(host, rules, slot, overlay, monitor, detector, events);
        Fixture { catalog, bridge }
    }

    fn package(name: &str) -> PackageParams {
        PackageParams {
            package_name: Some(name.to_string()),
        }
    }

    mod permission_tests {
        use super::*;

        #[tokio::test]
        async fn test_check_permissions_and_aliases() {
            let f = fixture();
            f.catalog.set_accessibility_enabled(false);
            for request in [
                BridgeRequest::CheckAccessibilityPermission,
                BridgeRequest::CheckPermissions,
            ] {
                let response = f.bridge.handle(request).await;
                assert_eq!(response.data.unwrap().granted, Some(false));
            }
            let response = f.bridge.handle(BridgeRequest::CheckFloatingPermission).await;
            assert_eq!(response.data.unwrap().granted, Some(true));
        }

        #[tokio::test]
        async fn test_request_opens_settings() {
            let f = fixture();
            f.bridge.handle(BridgeRequest::RequestPermissions).await;
            // Already granted, nothing to open.
            f.bridge.handle(BridgeRequest::RequestFloatingPermission).await;
            f.catalog.set_overlay_allowed(false);
            f.bridge.handle(BridgeRequest::RequestFloatingPermission).await;
            assert_eq!(
                f.catalog.settings_opened(),
                vec![SettingsPage::Accessibility, SettingsPage::OverlayPermission]
            );
        }
    }

    mod running_app_tests {
        use super::*;

        async fn running(f: &Fixture) -> String {
            let response = f.bridge.handle(BridgeRequest::GetRunningApp).await;
            response.data.unwrap().package_name.unwrap()
        }

        #[tokio::test]
        async fn test_unknown_then_detected() {
            let f = fixture();
            assert_eq!(running(&f).await, "");

            let response = f
                .bridge
                .handle(BridgeRequest::ReportWindowChange {
                    params: package("com.example.app"),
                })
                .await;
            assert!(response.is_success());
            assert_eq!(running(&f).await, "com.example.app");
        }

        #[tokio::test]
        async fn test_screen_off() {
            let f = fixture();
            f.catalog.set_interactive(false);
            assert_eq!(running(&f).await, SCREEN_OFF);
        }

        #[tokio::test]
        async fn test_report_requires_package() {
            let f = fixture();
            let response = f
                .bridge
                .handle(BridgeRequest::ReportWindowChange {
                    params: PackageParams::default(),
                })
                .await;
            assert!(!response.is_success());
            assert_eq!(response.message, "Missing packageName");
        }
    }

    mod rule_tests {
        use super::*;

        #[tokio::test]
        async fn test_save_list_remove() {
            let f = fixture();
            let response = f
                .bridge
                .handle(BridgeRequest::SaveAppRule {
                    params: AppRuleParams {
                        package_name: Some("com.example.app".to_string()),
                        activity_id: Some("study".to_string()),
                    },
                })
                .await;
            assert!(response.is_success());

            let response = f.bridge.handle(BridgeRequest::GetAppRules).await;
            let rules = response.data.unwrap().rules.unwrap();
            assert_eq!(rules.get("com.example.app").map(String::as_str), Some("study"));

            f.bridge
                .handle(BridgeRequest::RemoveAppRule {
                    params: package("com.example.app"),
                })
                .await;
            let response = f.bridge.handle(BridgeRequest::GetAppRules).await;
            assert!(response.data.unwrap().rules.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_save_rejects_missing_or_empty() {
            let f = fixture();
            for params in [
                AppRuleParams {
                    package_name: Some("com.example.app".to_string()),
                    activity_id: None,
                },
                AppRuleParams {
                    package_name: Some("com.example.app".to_string()),
                    activity_id: Some(String::new()),
                },
                AppRuleParams::default(),
            ] {
                let response = f.bridge.handle(BridgeRequest::SaveAppRule { params }).await;
                assert_eq!(response.status, "error");
                assert_eq!(response.message, "Missing packageName or activityId");
            }
        }
    }

    mod installed_apps_tests {
        use super::*;

        #[tokio::test]
        async fn test_filters_system_apps() {
            let f = fixture();
            let response = f.bridge.handle(BridgeRequest::GetInstalledApps).await;
            let apps = response.data.unwrap().apps.unwrap();
            let names: Vec<_> = apps.iter().map(|a| a.package_name.as_str()).collect();
            assert!(names.contains(&"com.example.app"));
            assert!(names.contains(&"com.android.chrome"));
            assert!(!names.contains(&"com.android.systemui"));
            assert!(apps
                .iter()
                .all(|a| a.icon_base64.starts_with(PNG_DATA_URL_PREFIX)));
        }

        #[tokio::test]
        async fn test_lookup_failure_is_an_error_response() {
            let f = fixture();
            f.catalog.set_fail_lookups(true);
            let response = f.bridge.handle(BridgeRequest::GetInstalledApps).await;
            assert!(!response.is_success());
        }
    }

    mod overlay_tests {
        use super::*;

        #[tokio::test]
        async fn test_start_update_stop() {
            let f = fixture();
            let response = f
                .bridge
                .handle(BridgeRequest::StartFloatingWindow {
                    params: FloatingParams::focusing("🎯", T0 - 65_000),
                })
                .await;
            assert!(response.is_success());

            let response = f.bridge.handle(BridgeRequest::GetOverlayState).await;
            let snap = response.data.unwrap().overlay.unwrap();
            assert_eq!(snap.mode, OverlayMode::Focus);
            assert_eq!(snap.text.as_deref(), Some("01:05"));

            f.bridge
                .handle(BridgeRequest::UpdateFloatingWindow {
                    params: FloatingParams {
                        icon: None,
                        is_focusing: None,
                        start_time: Some(StartTimeValue::Text("soon".to_string())),
                    },
                })
                .await;
            let snap = f.bridge.overlay().snapshot().await.unwrap();
            assert_eq!(snap.mode, OverlayMode::Idle);

            let response = f.bridge.handle(BridgeRequest::StopFloatingWindow).await;
            assert_eq!(response.message, "Floating window stopped");
            assert!(f.bridge.overlay().snapshot().await.is_none());
        }

        #[tokio::test]
        async fn test_text_requires_text() {
            let f = fixture();
            let response = f
                .bridge
                .handle(BridgeRequest::ShowFloatingText {
                    params: FloatingText { text: None },
                })
                .await;
            assert_eq!(response.message, "Missing text");
        }

        #[tokio::test]
        async fn test_prompt_and_tap() {
            let f = fixture();
            let mut events = f.bridge.events().subscribe();
            f.bridge
                .handle(BridgeRequest::StartFloatingWindow {
                    params: FloatingParams::idle(),
                })
                .await;
            f.bridge
                .handle(BridgeRequest::ShowPrompt {
                    params: PromptParams {
                        package_name: Some("com.example.app".to_string()),
                        label: Some("App".to_string()),
                        real_app_name: None,
                        activity_id: Some("study".to_string()),
                    },
                })
                .await;
            let handle = f.bridge.overlay().handle().unwrap();
            handle.tap();
            let snap = handle.snapshot().await.unwrap();
            assert_eq!(snap.mode, OverlayMode::Transient);

            assert_eq!(
                events.recv().await.unwrap(),
                BridgeEvent::StartFocusFromPrompt {
                    package_name: "com.example.app".to_string(),
                    app_label: "App".to_string(),
                    real_app_name: "App".to_string(),
                    activity_id: "study".to_string(),
                }
            );
            f.bridge.overlay().stop().await;
        }

        #[tokio::test]
        async fn test_pending_without_overlay_is_accepted() {
            let f = fixture();
            let response = f
                .bridge
                .handle(BridgeRequest::SetSwitchPending {
                    params: SwitchPendingParams { pending: None },
                })
                .await;
            assert!(response.is_success());
        }
    }

    mod monitor_tests {
        use super::*;

        #[tokio::test]
        async fn test_start_stop_monitor() {
            let f = fixture();
            let response = f.bridge.handle(BridgeRequest::StartMonitor).await;
            assert_eq!(response.message, "Monitor started");
            let response = f.bridge.handle(BridgeRequest::StartMonitor).await;
            assert_eq!(response.message, "Monitor already running");
            let response = f.bridge.handle(BridgeRequest::StopMonitor).await;
            assert_eq!(response.message, "Monitor stopped");
            let response = f.bridge.handle(BridgeRequest::StopMonitor).await;
            assert_eq!(response.message, "Monitor was not running");
        }
    }

    #[tokio::test]
    async fn test_subscribe_is_transport_only() {
        let f = fixture();
        let response = f.bridge.handle(BridgeRequest::Subscribe).await;
        assert!(!response.is_success());
    }
}
