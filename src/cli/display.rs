//! Display utilities for the island CLI.
//!
//! This module provides formatted output for:
//! - Plain success messages
//! - Error messages
//! - Installed apps and rules
//! - Overlay state and upward events

use std::collections::BTreeMap;

use crate::types::{BridgeEvent, BridgeResponse, InstalledApp, OverlaySnapshot};

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows the response message, or `fallback` when the daemon sent none.
    pub fn show_message(response: &BridgeResponse, fallback: &str) {
        if response.message.is_empty() {
            println!("* {}", fallback);
        } else {
            println!("* {}", response.message);
        }
    }

    /// Shows the current foreground app.
    pub fn show_running_app(response: &BridgeResponse) {
        let package = response
            .data
            .as_ref()
            .and_then(|d| d.package_name.as_deref())
            .unwrap_or("");
        println!("{}", Self::format_running_app(package));
    }

    /// Shows a granted/denied permission line.
    pub fn show_permission(name: &str, response: &BridgeResponse) {
        let granted = response
            .data
            .as_ref()
            .and_then(|d| d.granted)
            .unwrap_or(false);
        println!("{:<14} {}", name, if granted { "granted" } else { "missing" });
    }

    /// Shows the installed user apps.
    pub fn show_apps(response: &BridgeResponse) {
        let apps = response
            .data
            .as_ref()
            .and_then(|d| d.apps.as_deref())
            .unwrap_or_default();
        print!("{}", Self::format_apps(apps));
    }

    /// Shows the rule table.
    pub fn show_rules(response: &BridgeResponse) {
        let empty = BTreeMap::new();
        let rules = response
            .data
            .as_ref()
            .and_then(|d| d.rules.as_ref())
            .unwrap_or(&empty);
        print!("{}", Self::format_rules(rules));
    }

    /// Shows the overlay state.
    pub fn show_overlay_state(response: &BridgeResponse) {
        match response.data.as_ref().and_then(|d| d.overlay.as_ref()) {
            Some(snapshot) => print!("{}", Self::format_snapshot(snapshot)),
            None => println!("Island is not running"),
        }
    }

    /// Shows one upward event.
    pub fn show_event(event: &BridgeEvent) {
        println!("{}", Self::format_event(event));
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("Error: {}", message);
    }

    fn format_running_app(package: &str) -> String {
        match package {
            "" => "(no app detected yet)".to_string(),
            other => other.to_string(),
        }
    }

    fn format_apps(apps: &[InstalledApp]) -> String {
        if apps.is_empty() {
            return "No user apps installed\n".to_string();
        }
        let width = apps.iter().map(|a| a.package_name.len()).max().unwrap_or(0);
        let mut out = String::new();
        for app in apps {
            let icon = if app.icon_base64.is_empty() { " " } else { "*" };
            out.push_str(&format!(
                "{} {:<width$}  {}\n",
                icon,
                app.package_name,
                app.label,
                width = width
            ));
        }
        out
    }

    fn format_rules(rules: &BTreeMap<String, String>) -> String {
        if rules.is_empty() {
            return "No rules\n".to_string();
        }
        let width = rules.keys().map(String::len).max().unwrap_or(0);
        rules
            .iter()
            .map(|(package, activity)| format!("{:<width$} -> {}\n", package, activity, width = width))
            .collect()
    }

    fn format_snapshot(snapshot: &OverlaySnapshot) -> String {
        let mut out = String::new();
        out.push_str("Island\n");
        out.push_str("─────────────────────────────\n");
        out.push_str(&format!("Mode:   {}\n", snapshot.mode.as_str()));
        out.push_str(&format!("Face:   {:?}\n", snapshot.display_phase));
        if !snapshot.current_icon_package.is_empty() {
            out.push_str(&format!("Icon:   {}\n", snapshot.current_icon_package));
        }
        if let Some(emoji) = &snapshot.emoji {
            out.push_str(&format!("Emoji:  {}\n", emoji));
        }
        if snapshot.focus_start_ms > 0 {
            out.push_str(&format!("Start:  {}\n", snapshot.focus_start_ms));
        }
        if let Some(text) = &snapshot.text {
            out.push_str(&format!("Text:   {}\n", text));
        }
        if let Some(prompt) = &snapshot.prompt {
            out.push_str(&format!(
                "Prompt: {} ({} → {})\n",
                prompt.display_label, prompt.target_package, prompt.activity_id
            ));
        }
        if snapshot.switch_pending {
            out.push_str("Switch pending\n");
        }
        out
    }

    fn format_event(event: &BridgeEvent) -> String {
        match event {
            BridgeEvent::AppSwitched {
                package_name,
                label,
            } => format!("appSwitched          {} ({})", package_name, label),
            BridgeEvent::StopFocusFromFloating {} => "stopFocusFromFloating".to_string(),
            BridgeEvent::StartFocusFromPrompt {
                package_name,
                activity_id,
                ..
            } => format!("startFocusFromPrompt {} → {}", package_name, activity_id),
            BridgeEvent::FocusAutoEnded {} => "focusAutoEnded".to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DisplayPhase, OverlayMode, PromptContext, ResponseData};

    // ------------------------------------------------------------------------
    // Format Tests
    // ------------------------------------------------------------------------

    mod format_tests {
        use super::*;

        #[test]
        fn test_format_running_app() {
            assert_eq!(Display::format_running_app(""), "(no app detected yet)");
            assert_eq!(Display::format_running_app("SCREEN_OFF"), "SCREEN_OFF");
        }

        #[test]
        fn test_format_apps_aligns_labels() {
            let apps = vec![
                InstalledApp {
                    package_name: "com.a".to_string(),
                    label: "A".to_string(),
                    icon_base64: "data:image/png;base64,AA==".to_string(),
                },
                InstalledApp {
                    package_name: "com.example.b".to_string(),
                    label: "B".to_string(),
                    icon_base64: String::new(),
                },
            ];
            let out = Display::format_apps(&apps);
            assert_eq!(out, "* com.a          A\n  com.example.b  B\n");
        }

        #[test]
        fn test_format_empty_lists() {
            assert_eq!(Display::format_apps(&[]), "No user apps installed\n");
            assert_eq!(Display::format_rules(&BTreeMap::new()), "No rules\n");
        }

        #[test]
        fn test_format_rules_sorted() {
            let mut rules = BTreeMap::new();
            rules.insert("com.z".to_string(), "read".to_string());
            rules.insert("com.a".to_string(), "study".to_string());
            assert_eq!(
                Display::format_rules(&rules),
                "com.a -> study\ncom.z -> read\n"
            );
        }

        #[test]
        fn test_format_snapshot_focus() {
            let snapshot = OverlaySnapshot {
                mode: OverlayMode::Focus,
                display_phase: DisplayPhase::Emoji,
                focus_start_ms: 1_700_000_000_000,
                cycle_anchor_ms: 1_700_000_000_000,
                current_icon_package: "com.example.app".to_string(),
                emoji: Some("🎯".to_string()),
                switch_pending: true,
                ..OverlaySnapshot::default()
            };
            let out = Display::format_snapshot(&snapshot);
            assert!(out.contains("Mode:   focus"));
            assert!(out.contains("Face:   Emoji"));
            assert!(out.contains("Emoji:  🎯"));
            assert!(out.contains("Switch pending"));
            assert!(!out.contains("Prompt"));
        }

        #[test]
        fn test_format_snapshot_prompt() {
            let snapshot = OverlaySnapshot {
                mode: OverlayMode::Prompt,
                display_phase: DisplayPhase::Time,
                prompt: Some(PromptContext {
                    target_package: "com.example.app".to_string(),
                    display_label: "App".to_string(),
                    real_app_name: "App".to_string(),
                    activity_id: "study".to_string(),
                }),
                ..OverlaySnapshot::default()
            };
            let out = Display::format_snapshot(&snapshot);
            assert!(out.contains("Prompt: App (com.example.app → study)"));
        }

        #[test]
        fn test_format_event() {
            let event = BridgeEvent::AppSwitched {
                package_name: "com.example.app".to_string(),
                label: "App".to_string(),
            };
            assert!(Display::format_event(&event).ends_with("com.example.app (App)"));
            assert_eq!(
                Display::format_event(&BridgeEvent::FocusAutoEnded {}),
                "focusAutoEnded"
            );
        }
    }

    // ------------------------------------------------------------------------
    // Display Tests
    // ------------------------------------------------------------------------

    mod display_tests {
        use super::*;

        #[test]
        fn test_show_functions_without_data() {
            let response = BridgeResponse::resolved(None);
            Display::show_message(&response, "Done");
            Display::show_running_app(&response);
            Display::show_permission("accessibility", &response);
            Display::show_apps(&response);
            Display::show_rules(&response);
            Display::show_overlay_state(&response);
            Display::show_error("boom");
        }

        #[test]
        fn test_show_functions_with_data() {
            Display::show_running_app(&BridgeResponse::resolved(Some(
                ResponseData::package_name("com.example.app"),
            )));
            Display::show_permission(
                "overlay",
                &BridgeResponse::resolved(Some(ResponseData::granted(true))),
            );
            Display::show_overlay_state(&BridgeResponse::resolved(Some(ResponseData::overlay(
                OverlaySnapshot::default(),
            ))));
        }
    }
}
