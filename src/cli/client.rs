//! IPC client for talking to the island daemon.
//!
//! This module provides:
//! - Unix Domain Socket client
//! - Newline-framed request/response handling
//! - Connection retry logic
//! - The `subscribe` event stream

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::types::{
    AppRuleParams, BridgeEvent, BridgeRequest, BridgeResponse, FloatingParams, FloatingText,
    PackageParams, PromptParams, SwitchPendingParams,
};

// ============================================================================
// Constants
// ============================================================================

/// Connection timeout in seconds
const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Read/write timeout in seconds
const IO_TIMEOUT_SECS: u64 = 5;

/// Maximum response size in bytes. Installed-app lists carry icons.
const MAX_RESPONSE_SIZE: u64 = 8 * 1024 * 1024;

/// Maximum retry attempts
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds (base delay, multiplied by attempt number)
const RETRY_DELAY_MS: u64 = 500;

// ============================================================================
// IpcClient
// ============================================================================

/// IPC client for daemon communication.
pub struct IpcClient {
    /// Socket path
    socket_path: PathBuf,
    /// Connection timeout
    timeout: Duration,
}

impl IpcClient {
    /// Creates a new IPC client for the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub async fn running_app(&self) -> Result<BridgeResponse> {
        self.request(&BridgeRequest::GetRunningApp).await
    }

    pub async fn installed_apps(&self) -> Result<BridgeResponse> {
        self.request(&BridgeRequest::GetInstalledApps).await
    }

    pub async fn rules(&self) -> Result<BridgeResponse> {
        self.request(&BridgeRequest::GetAppRules).await
    }

    pub async fn save_rule(&self, package: &str, activity: &str) -> Result<BridgeResponse> {
        self.request(&BridgeRequest::SaveAppRule {
            params: AppRuleParams {
                package_name: Some(package.to_string()),
                activity_id: Some(activity.to_string()),
            },
        })
        .await
    }

    pub async fn remove_rule(&self, package: &str) -> Result<BridgeResponse> {
        self.request(&BridgeRequest::RemoveAppRule {
            params: package_params(package),
        })
        .await
    }

    pub async fn start_overlay(&self, params: FloatingParams) -> Result<BridgeResponse> {
        self.request(&BridgeRequest::StartFloatingWindow { params }).await
    }

    pub async fn update_overlay(&self, params: FloatingParams) -> Result<BridgeResponse> {
        self.request(&BridgeRequest::UpdateFloatingWindow { params }).await
    }

    pub async fn stop_overlay(&self) -> Result<BridgeResponse> {
        self.request(&BridgeRequest::StopFloatingWindow).await
    }

    pub async fn show_text(&self, text: &str) -> Result<BridgeResponse> {
        self.request(&BridgeRequest::ShowFloatingText {
            params: FloatingText {
                text: Some(text.to_string()),
            },
        })
        .await
    }

    pub async fn show_prompt(&self, params: PromptParams) -> Result<BridgeResponse> {
        self.request(&BridgeRequest::ShowPrompt { params }).await
    }

    pub async fn set_switch_pending(&self, pending: bool) -> Result<BridgeResponse> {
        self.request(&BridgeRequest::SetSwitchPending {
            params: SwitchPendingParams {
                pending: Some(pending),
            },
        })
        .await
    }

    pub async fn overlay_state(&self) -> Result<BridgeResponse> {
        self.request(&BridgeRequest::GetOverlayState).await
    }

    pub async fn start_monitor(&self) -> Result<BridgeResponse> {
        self.request(&BridgeRequest::StartMonitor).await
    }

    pub async fn stop_monitor(&self) -> Result<BridgeResponse> {
        self.request(&BridgeRequest::StopMonitor).await
    }

    pub async fn report_window_change(&self, package: &str) -> Result<BridgeResponse> {
        self.request(&BridgeRequest::ReportWindowChange {
            params: package_params(package),
        })
        .await
    }

    /// Sends a request and turns an error response into an error.
    ///
    /// Error responses are final; only transport failures are retried.
    pub async fn request(&self, request: &BridgeRequest) -> Result<BridgeResponse> {
        let response = self.send_request_with_retry(request).await?;
        if !response.is_success() {
            anyhow::bail!("{}", response.message);
        }
        Ok(response)
    }

    /// Opens an event stream.
    pub async fn subscribe(&self) -> Result<EventStream> {
        let stream = self.connect().await?;
        let mut reader = BufReader::new(stream);
        write_line(reader.get_mut(), &BridgeRequest::Subscribe).await?;

        let response = read_response(&mut reader).await?;
        if !response.is_success() {
            anyhow::bail!("{}", response.message);
        }
        Ok(EventStream { reader })
    }

    /// Sends a request to the daemon with retry logic.
    async fn send_request_with_retry(&self, request: &BridgeRequest) -> Result<BridgeResponse> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.send_request(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!(
                        method = request.method(),
                        "Request failed (attempt {}/{}): {:#}",
                        attempt,
                        MAX_RETRIES,
                        e
                    );
                    last_error = Some(e);

                    if attempt < MAX_RETRIES {
                        let delay = Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("No request attempt was made")))
    }

    /// Sends a single request to the daemon.
    async fn send_request(&self, request: &BridgeRequest) -> Result<BridgeResponse> {
        let mut stream = self.connect().await?;
        write_line(&mut stream, request).await?;

        // Shutdown write side to signal end of request
        stream
            .shutdown()
            .await
            .context("Failed to shut down the write side")?;

        let mut reader = BufReader::new(stream);
        read_response(&mut reader).await
    }

    async fn connect(&self) -> Result<UnixStream> {
        timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("Connection timed out")?
            .with_context(|| {
                format!(
                    "Cannot connect to the daemon at {}. Start it with 'lumos-island daemon'",
                    self.socket_path.display()
                )
            })
    }
}

fn package_params(package: &str) -> PackageParams {
    PackageParams {
        package_name: Some(package.to_string()),
    }
}

async fn write_line(stream: &mut UnixStream, request: &BridgeRequest) -> Result<()> {
    let mut json = serde_json::to_vec(request).context("Failed to serialize request")?;
    json.push(b'\n');

    timeout(Duration::from_secs(IO_TIMEOUT_SECS), stream.write_all(&json))
        .await
        .context("Write timed out")?
        .context("Failed to send request")?;

    timeout(Duration::from_secs(IO_TIMEOUT_SECS), stream.flush())
        .await
        .context("Flush timed out")?
        .context("Failed to flush request")?;
    Ok(())
}

async fn read_response(reader: &mut BufReader<UnixStream>) -> Result<BridgeResponse> {
    let mut line = String::new();
    let n = timeout(
        Duration::from_secs(IO_TIMEOUT_SECS),
        (&mut *reader).take(MAX_RESPONSE_SIZE).read_line(&mut line),
    )
    .await
    .context("Read timed out")?
    .context("Failed to receive response")?;

    if n == 0 {
        anyhow::bail!("The daemon closed the connection without answering");
    }

    serde_json::from_str(line.trim_end()).context("Failed to parse response")
}

// ============================================================================
// EventStream
// ============================================================================

/// Upward events read from a `subscribe` connection.
pub struct EventStream {
    reader: BufReader<UnixStream>,
}

impl EventStream {
    /// Waits for the next event. Returns `None` when the daemon goes away.
    pub async fn next(&mut self) -> Result<Option<BridgeEvent>> {
        loop {
            let mut line = String::new();
            let n = self
                .reader
                .read_line(&mut line)
                .await
                .context("Failed to read event")?;
            if n == 0 {
                return Ok(None);
            }
            if line.trim().is_empty() {
                continue;
            }
            let event = serde_json::from_str(line.trim_end()).context("Failed to parse event")?;
            return Ok(Some(event));
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
