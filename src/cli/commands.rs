//! Command definitions for the island CLI.
//!
//! Uses clap derive macro for argument parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::types::{FloatingParams, PromptParams, StartTimeValue};

// ============================================================================
// CLI Structure
// ============================================================================

/// LumosTime island - foreground-app detection and floating overlay
#[derive(Parser, Debug)]
#[command(
    name = "lumos-island",
    version,
    about = "Foreground-app detection and floating focus island for LumosTime",
    long_about = "Runs the island daemon (app-switch detector, foreground monitor, floating \
                  overlay and rule store) and talks to it over a Unix socket.",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Socket path (overrides the configuration)
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the island daemon in the foreground
    Daemon(DaemonArgs),

    /// Show the current foreground app
    RunningApp,

    /// List launchable user apps
    Apps,

    /// Manage package → activity rules
    #[command(subcommand)]
    Rules(RulesAction),

    /// Control the floating island
    #[command(subcommand)]
    Overlay(OverlayAction),

    /// Start or stop the foreground monitor
    #[command(subcommand)]
    Monitor(MonitorAction),

    /// Report a window-state change for a package
    Switch {
        /// Package now in the foreground
        #[arg(value_parser = validate_package_name)]
        package: String,
    },

    /// Print upward events as they happen
    Events,

    /// Show (or request) accessibility and overlay permissions
    Permissions {
        /// Open the settings pages for missing permissions
        #[arg(long)]
        request: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Arguments for the daemon command
#[derive(Args, Debug, Clone, Default)]
pub struct DaemonArgs {
    /// Package catalog for the headless host
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Start the foreground monitor right away
    #[arg(long)]
    pub monitor: bool,
}

/// Rule subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum RulesAction {
    /// List every rule
    List,

    /// Add or replace a rule
    Set {
        /// Package name
        #[arg(value_parser = validate_package_name)]
        package: String,
        /// Activity id suggested for the package
        activity: String,
    },

    /// Remove a rule
    Remove {
        /// Package name
        #[arg(value_parser = validate_package_name)]
        package: String,
    },
}

/// Overlay subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum OverlayAction {
    /// Start the island (and configure it)
    Start(FloatingArgs),

    /// Reconfigure the island
    Update(FloatingArgs),

    /// Remove the island
    Stop,

    /// Show a short text on the island
    Text {
        /// Text to show
        text: String,
    },

    /// Offer to start a session for a package
    Prompt(PromptArgs),

    /// Mark or clear the focus session as switch-pending
    Pending {
        /// true or false
        #[arg(action = ArgAction::Set, required = true)]
        pending: bool,
    },

    /// Show the island's current state
    State,
}

/// Monitor subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    /// Start polling usage statistics
    Start,
    /// Stop polling
    Stop,
}

// ============================================================================
// Overlay Arguments
// ============================================================================

/// Arguments for overlay start/update
#[derive(Args, Debug, Clone, Default)]
pub struct FloatingArgs {
    /// A focus session is running
    #[arg(short, long)]
    pub focusing: bool,

    /// Emoji shown during the session
    #[arg(short, long)]
    pub emoji: Option<String>,

    /// Session start in epoch milliseconds
    #[arg(short, long, value_name = "MS")]
    pub start: Option<String>,
}

impl FloatingArgs {
    /// Converts to bridge parameters. Numeric starts go out as numbers.
    pub fn to_params(&self) -> FloatingParams {
        let start_time = self.start.as_ref().map(|s| match s.trim().parse::<f64>() {
            Ok(n) => StartTimeValue::Number(n),
            Err(_) => StartTimeValue::Text(s.clone()),
        });
        FloatingParams {
            icon: self.emoji.clone(),
            is_focusing: Some(self.focusing),
            start_time,
        }
    }
}

/// Arguments for overlay prompt
#[derive(Args, Debug, Clone)]
pub struct PromptArgs {
    /// Rule-matched package
    #[arg(value_parser = validate_package_name)]
    pub package: String,

    /// Activity id to start
    pub activity: String,

    /// Label shown on the island (defaults to the package)
    #[arg(short, long)]
    pub label: Option<String>,

    /// Real app name (defaults to the label)
    #[arg(long)]
    pub real_name: Option<String>,
}

impl PromptArgs {
    pub fn to_params(&self) -> PromptParams {
        PromptParams {
            package_name: Some(self.package.clone()),
            label: self.label.clone(),
            real_app_name: self.real_name.clone(),
            activity_id: Some(self.activity.clone()),
        }
    }
}

// ============================================================================
// Validation Functions
// ============================================================================

/// Validates a package name.
///
/// - Must not be empty
/// - Must not contain whitespace
fn validate_package_name(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("package name cannot be empty".to_string());
    }
    if s.chars().any(char::is_whitespace) {
        return Err("package name cannot contain whitespace".to_string());
    }
    Ok(s.to_string())
}

// ============================================================================
// Tests
// ============================================================================
