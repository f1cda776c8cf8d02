//! CLI module for the island.
//!
//! This module provides the command-line interface:
//! - `commands`: Command definitions using clap derive
//! - `client`: IPC client for daemon communication
//! - `display`: Output formatting and display logic

pub mod client;
pub mod commands;
pub mod display;

pub use client::{EventStream, IpcClient};
pub use commands::{Cli, Commands, FloatingArgs, MonitorAction, OverlayAction, PromptArgs, RulesAction};
pub use display::Display;
