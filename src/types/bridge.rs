//! Wire types exchanged between the UI layer and the bridge.
//!
//! Requests are JSON objects tagged by `method`; parameters sit next to the
//! tag. Every parameter is optional on the wire so that a missing value is
//! reported as a bridge argument error instead of a parse failure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::OverlaySnapshot;

// ============================================================================
// Request parameters
// ============================================================================

/// Parameters for `saveAppRule`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRuleParams {
    /// Package identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    /// Activity id to associate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
}

/// Parameters carrying a single package name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageParams {
    /// Package identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
}

/// Start time as sent by the UI: a JS number or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartTimeValue {
    /// Epoch milliseconds as a number
    Number(f64),
    /// Epoch milliseconds as a string
    Text(String),
}

impl StartTimeValue {
    /// Returns the start time in epoch milliseconds, if it parses.
    pub fn as_millis(&self) -> Option<i64> {
        match self {
            StartTimeValue::Number(n) if n.is_finite() => Some(*n as i64),
            StartTimeValue::Number(_) => None,
            StartTimeValue::Text(s) => {
                let trimmed = s.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| trimmed.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64))
            }
        }
    }
}

/// Parameters for `startFloatingWindow` / `updateFloatingWindow`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FloatingParams {
    /// Emoji shown during a focus session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Whether a focus session is running (defaults to false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_focusing: Option<bool>,
    /// Session start, epoch milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<StartTimeValue>,
}

impl FloatingParams {
    /// Creates parameters for a running focus session.
    pub fn focusing(icon: impl Into<String>, start_time_ms: i64) -> Self {
        Self {
            icon: Some(icon.into()),
            is_focusing: Some(true),
            start_time: Some(StartTimeValue::Number(start_time_ms as f64)),
        }
    }

    /// Creates parameters that end any focus session.
    pub fn idle() -> Self {
        Self {
            icon: None,
            is_focusing: Some(false),
            start_time: None,
        }
    }

    /// Returns the focusing flag, defaulting to false.
    pub fn focusing_flag(&self) -> bool {
        self.is_focusing.unwrap_or(false)
    }
}

/// Parameters for `showFloatingText`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatingText {
    /// Text to show
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Parameters for `showPrompt`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptParams {
    /// Rule-matched package
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    /// Label shown on the island
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Real app name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_app_name: Option<String>,
    /// Activity id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity_id: Option<String>,
}

/// Parameters for `setSwitchPending`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchPendingParams {
    /// Whether a switch is pending (defaults to false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<bool>,
}

// ============================================================================
// BridgeRequest
// ============================================================================

/// A request from the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum BridgeRequest {
    /// Is the accessibility service enabled?
    CheckAccessibilityPermission,
    /// Open accessibility settings
    RequestAccessibilityPermission,
    /// Alias of `checkAccessibilityPermission`
    CheckPermissions,
    /// Alias of `requestAccessibilityPermission`
    RequestPermissions,
    /// Is drawing over other apps allowed?
    CheckFloatingPermission,
    /// Open overlay permission settings
    RequestFloatingPermission,
    /// Current foreground package
    GetRunningApp,
    /// Launchable user apps with icons
    GetInstalledApps,
    /// Upsert a rule
    SaveAppRule {
        /// Rule parameters
        #[serde(flatten)]
        params: AppRuleParams,
    },
    /// Delete a rule
    RemoveAppRule {
        /// Package parameters
        #[serde(flatten)]
        params: PackageParams,
    },
    /// All rules
    GetAppRules,
    /// Ensure the overlay is running and configured
    StartFloatingWindow {
        /// Overlay parameters
        #[serde(flatten)]
        params: FloatingParams,
    },
    /// Reconfigure the overlay mode
    UpdateFloatingWindow {
        /// Overlay parameters
        #[serde(flatten)]
        params: FloatingParams,
    },
    /// Tear the overlay down
    StopFloatingWindow,
    /// Enter transient mode with the given text
    ShowFloatingText {
        /// Text parameters
        #[serde(flatten)]
        params: FloatingText,
    },
    /// Offer to start a session for a rule-matched app
    ShowPrompt {
        /// Prompt parameters
        #[serde(flatten)]
        params: PromptParams,
    },
    /// Mark / clear the focus session as switch-pending
    SetSwitchPending {
        /// Pending parameters
        #[serde(flatten)]
        params: SwitchPendingParams,
    },
    /// Start the foreground monitor
    StartMonitor,
    /// Stop the foreground monitor
    StopMonitor,
    /// A window-state change observed by the host
    ReportWindowChange {
        /// Package parameters
        #[serde(flatten)]
        params: PackageParams,
    },
    /// Current overlay snapshot
    GetOverlayState,
    /// Turn the connection into an event stream
    Subscribe,
}

impl BridgeRequest {
    /// Returns the wire name of the method.
    pub fn method(&self) -> &'static str {
        match self {
            BridgeRequest::CheckAccessibilityPermission => "checkAccessibilityPermission",
            BridgeRequest::RequestAccessibilityPermission => "requestAccessibilityPermission",
            BridgeRequest::CheckPermissions => "checkPermissions",
            BridgeRequest::RequestPermissions => "requestPermissions",
            BridgeRequest::CheckFloatingPermission => "checkFloatingPermission",
            BridgeRequest::RequestFloatingPermission => "requestFloatingPermission",
            BridgeRequest::GetRunningApp => "getRunningApp",
            BridgeRequest::GetInstalledApps => "getInstalledApps",
            BridgeRequest::SaveAppRule { .. } => "saveAppRule",
            BridgeRequest::RemoveAppRule { .. } => "removeAppRule",
            BridgeRequest::GetAppRules => "getAppRules",
            BridgeRequest::StartFloatingWindow { .. } => "startFloatingWindow",
            BridgeRequest::UpdateFloatingWindow { .. } => "updateFloatingWindow",
            BridgeRequest::StopFloatingWindow => "stopFloatingWindow",
            BridgeRequest::ShowFloatingText { .. } => "showFloatingText",
            BridgeRequest::ShowPrompt { .. } => "showPrompt",
            BridgeRequest::SetSwitchPending { .. } => "setSwitchPending",
            BridgeRequest::StartMonitor => "startMonitor",
            BridgeRequest::StopMonitor => "stopMonitor",
            BridgeRequest::ReportWindowChange { .. } => "reportWindowChange",
            BridgeRequest::GetOverlayState => "getOverlayState",
            BridgeRequest::Subscribe => "subscribe",
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// One entry of `getInstalledApps`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledApp {
    /// Package identifier
    pub package_name: String,
    /// User-visible label
    pub label: String,
    /// `data:image/png;base64,...`, or empty when the icon failed
    #[serde(alias = "icon")]
    pub icon_base64: String,
}

/// Response payload. Only the fields relevant to the method are set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    /// Permission status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted: Option<bool>,
    /// Running app package
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    /// Installed apps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apps: Option<Vec<InstalledApp>>,
    /// Rules keyed by package
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<BTreeMap<String, String>>,
    /// Overlay snapshot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay: Option<OverlaySnapshot>,
}

impl ResponseData {
    /// Payload for permission queries.
    pub fn granted(granted: bool) -> Self {
        Self {
            granted: Some(granted),
            ..Self::default()
        }
    }

    /// Payload for `getRunningApp`.
    pub fn package_name(package_name: impl Into<String>) -> Self {
        Self {
            package_name: Some(package_name.into()),
            ..Self::default()
        }
    }

    /// Payload for `getInstalledApps`.
    pub fn apps(apps: Vec<InstalledApp>) -> Self {
        Self {
            apps: Some(apps),
            ..Self::default()
        }
    }

    /// Payload for `getAppRules`.
    pub fn rules(rules: BTreeMap<String, String>) -> Self {
        Self {
            rules: Some(rules),
            ..Self::default()
        }
    }

    /// Payload for `getOverlayState`.
    pub fn overlay(snapshot: OverlaySnapshot) -> Self {
        Self {
            overlay: Some(snapshot),
            ..Self::default()
        }
    }
}

/// Response from the bridge to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    /// Response status ("success" or "error")
    pub status: String,
    /// Human-readable message
    pub message: String,
    /// Optional response data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl BridgeResponse {
    /// Creates a success response.
    pub fn success(message: impl Into<String>, data: Option<ResponseData>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data,
        }
    }

    /// Creates a success response without a message.
    pub fn resolved(data: Option<ResponseData>) -> Self {
        Self::success("", data)
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            data: None,
        }
    }

    /// Returns true for success responses.
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

// ============================================================================
// BridgeEvent
// ============================================================================

/// Asynchronous events emitted upward to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum BridgeEvent {
    /// Every detector emission
    AppSwitched {
        /// New foreground package
        package_name: String,
        /// Resolved label
        label: String,
    },
    /// The user tapped the island during a focus session
    StopFocusFromFloating {},
    /// The user accepted a prompt
    StartFocusFromPrompt {
        /// Rule-matched package
        package_name: String,
        /// Label shown on the island
        app_label: String,
        /// Real app name
        real_app_name: String,
        /// Activity id
        activity_id: String,
    },
    /// A switch-pending focus session timed out
    FocusAutoEnded {},
}

impl BridgeEvent {
    /// Returns the wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::AppSwitched { .. } => "appSwitched",
            BridgeEvent::StopFocusFromFloating {} => "stopFocusFromFloating",
            BridgeEvent::StartFocusFromPrompt { .. } => "startFocusFromPrompt",
            BridgeEvent::FocusAutoEnded {} => "focusAutoEnded",
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
