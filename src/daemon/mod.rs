//! Daemon module for the island.
//!
//! This module contains the long-running side of the island:
//! - `runtime`: component wiring and lifecycle
//! - `ipc`: Unix socket transport of the bridge

pub mod ipc;
pub mod runtime;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::clock::SystemClock;
use crate::host::{Catalog, CatalogHost, Host};
use crate::rules::RuleStore;
use crate::types::IslandConfig;

pub use ipc::{IpcError, IpcServer, MAX_REQUEST_SIZE};
pub use runtime::IslandRuntime;

/// Runs the daemon with the headless host until Ctrl-C.
///
/// `catalog` is the package catalog file; without one the host starts
/// with no packages installed.
pub async fn run(config: IslandConfig, catalog: Option<&Path>, start_monitor: bool) -> Result<()> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let catalog = match catalog {
        Some(path) => CatalogHost::load(path)
            .with_context(|| format!("Failed to load catalog {:?}", path))?,
        None => CatalogHost::new(Catalog::default()),
    };
    let rules = RuleStore::open(config.resolved_rules_path()?);
    let socket_path = config.resolved_socket_path()?;

    let runtime = IslandRuntime::new(
        config,
        Host::from_catalog(Arc::new(catalog)),
        SystemClock::shared(),
        rules,
    );
    if start_monitor {
        runtime.monitor().start().await;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                // Keep the sender alive so the server keeps running.
                std::future::pending::<()>().await;
                drop(shutdown_tx);
            }
        }
    });

    runtime.run(&socket_path, shutdown_rx).await
}
