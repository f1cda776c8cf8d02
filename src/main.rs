//! LumosTime island CLI
//!
//! Runs the island daemon and talks to it:
//! - `daemon` serves the bridge on a Unix socket
//! - every other command sends one bridge request and prints the answer
//! - `events` tails the upward event stream

use std::path::Path;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};

use lumos_island::cli::{
    Cli, Commands, Display, IpcClient, MonitorAction, OverlayAction, RulesAction,
};
use lumos_island::types::{BridgeRequest, IslandConfig};

/// Main entry point
#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(cli.verbose);

    // Execute command
    if let Err(e) = execute(cli).await {
        Display::show_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
///
/// `RUST_LOG` wins; otherwise `--verbose` selects debug output.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// Loads the configuration file, or defaults when none is given.
fn load_config(path: Option<&Path>) -> Result<IslandConfig> {
    match path {
        Some(path) => IslandConfig::load(path)
            .with_context(|| format!("Failed to load configuration {:?}", path)),
        None => Ok(IslandConfig::default()),
    }
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(socket) = cli.socket {
        config = config.with_socket_path(socket);
    }

    let command = match cli.command {
        Some(command) => command,
        None => {
            // No command provided, show help
            Cli::command().print_help()?;
            return Ok(());
        }
    };

    let client = || -> Result<IpcClient> { Ok(IpcClient::new(config.resolved_socket_path()?)) };

    match command {
        Commands::Daemon(args) => {
            lumos_island::daemon::run(config.clone(), args.catalog.as_deref(), args.monitor)
                .await?;
        }
        Commands::RunningApp => {
            let response = client()?.running_app().await?;
            Display::show_running_app(&response);
        }
        Commands::Apps => {
            let response = client()?.installed_apps().await?;
            Display::show_apps(&response);
        }
        Commands::Rules(action) => {
            let client = client()?;
            match action {
                RulesAction::List => Display::show_rules(&client.rules().await?),
                RulesAction::Set { package, activity } => {
                    let response = client.save_rule(&package, &activity).await?;
                    Display::show_message(&response, &format!("{} -> {}", package, activity));
                }
                RulesAction::Remove { package } => {
                    let response = client.remove_rule(&package).await?;
                    Display::show_message(&response, &format!("Removed rule for {}", package));
                }
            }
        }
        Commands::Overlay(action) => execute_overlay(client()?, action).await?,
        Commands::Monitor(action) => {
            let client = client()?;
            let response = match action {
                MonitorAction::Start => client.start_monitor().await?,
                MonitorAction::Stop => client.stop_monitor().await?,
            };
            Display::show_message(&response, "Done");
        }
        Commands::Switch { package } => {
            let response = client()?.report_window_change(&package).await?;
            match response.data.as_ref().and_then(|d| d.package_name.as_deref()) {
                Some(switched) => println!("* Switched to {}", switched),
                None => println!("* Ignored (filtered or unchanged)"),
            }
        }
        Commands::Events => {
            let mut events = client()?.subscribe().await?;
            while let Some(event) = events.next().await? {
                Display::show_event(&event);
            }
        }
        Commands::Permissions { request } => {
            let client = client()?;
            let checks = [
                ("accessibility", BridgeRequest::CheckAccessibilityPermission),
                ("overlay", BridgeRequest::CheckFloatingPermission),
            ];
            for (name, check) in checks {
                Display::show_permission(name, &client.request(&check).await?);
            }
            if request {
                client
                    .request(&BridgeRequest::RequestAccessibilityPermission)
                    .await?;
                client
                    .request(&BridgeRequest::RequestFloatingPermission)
                    .await?;
                println!("* Opened the settings pages");
            }
        }
        Commands::Completions { shell } => {
            generate_completions(shell);
        }
    }

    Ok(())
}

/// Executes an overlay subcommand.
async fn execute_overlay(client: IpcClient, action: OverlayAction) -> Result<()> {
    match action {
        OverlayAction::Start(args) => {
            let response = client.start_overlay(args.to_params()).await?;
            Display::show_message(&response, "Island started");
        }
        OverlayAction::Update(args) => {
            let response = client.update_overlay(args.to_params()).await?;
            Display::show_message(&response, "Island updated");
        }
        OverlayAction::Stop => {
            let response = client.stop_overlay().await?;
            Display::show_message(&response, "Island stopped");
        }
        OverlayAction::Text { text } => {
            let response = client.show_text(&text).await?;
            Display::show_message(&response, "Text sent");
        }
        OverlayAction::Prompt(args) => {
            let response = client.show_prompt(args.to_params()).await?;
            Display::show_message(&response, "Prompt sent");
        }
        OverlayAction::Pending { pending } => {
            let response = client.set_switch_pending(pending).await?;
            let fallback = if pending {
                "Switch pending"
            } else {
                "Switch pending cleared"
            };
            Display::show_message(&response, fallback);
        }
        OverlayAction::State => {
            Display::show_overlay_state(&client.overlay_state().await?);
        }
    }
    Ok(())
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================
