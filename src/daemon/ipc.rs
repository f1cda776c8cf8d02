//! IPC server for the island daemon.
//!
//! This module provides the Unix Domain Socket transport of the bridge:
//! - Server that listens on a Unix socket
//! - One JSON request per connection, answered by one JSON line
//! - `subscribe` connections that stay open as an NDJSON event stream

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};

use crate::bridge::Bridge;
use crate::types::{BridgeEvent, BridgeRequest, BridgeResponse};

// ============================================================================
// Constants
// ============================================================================

/// Maximum request size in bytes (64KB)
pub const MAX_REQUEST_SIZE: usize = 64 * 1024;

/// Read timeout in seconds
const READ_TIMEOUT_SECS: u64 = 5;

/// Chunk size for socket reads
const READ_CHUNK_SIZE: usize = 4096;

// ============================================================================
// IpcError
// ============================================================================

/// IPC-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Read error
    #[error("Failed to read request: {0}")]
    ReadError(String),

    /// Write error
    #[error("Failed to write response: {0}")]
    WriteError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Request too large
    #[error("Request too large (max {MAX_REQUEST_SIZE} bytes)")]
    RequestTooLarge,

    /// The peer closed the connection before sending anything
    #[error("Connection closed by client")]
    ConnectionClosed,
}

impl IpcError {
    /// Returns true if the client should get an error response.
    #[must_use]
    pub fn is_reportable(&self) -> bool {
        matches!(
            self,
            Self::SerializationError(_) | Self::RequestTooLarge | Self::Timeout
        )
    }
}

// ============================================================================
// IpcServer
// ============================================================================

/// Unix Domain Socket IPC server.
pub struct IpcServer {
    /// Unix socket listener
    listener: UnixListener,
    /// Socket path (for cleanup)
    socket_path: PathBuf,
}

impl IpcServer {
    /// Creates a new IPC server bound to the specified socket path.
    ///
    /// If the socket file already exists, it will be removed before binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub fn new(socket_path: &Path) -> Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .with_context(|| format!("Failed to remove existing socket: {:?}", socket_path))?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {:?}", parent))?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind Unix socket: {:?}", socket_path))?;

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
        })
    }

    /// Accepts an incoming client connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be accepted.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .context("Failed to accept connection")?;
        Ok(stream)
    }

    /// Receives and deserializes a bridge request from the stream.
    ///
    /// A request ends at the first newline or when the client shuts down
    /// its write side. Applies a read timeout to prevent blocking
    /// indefinitely.
    pub async fn receive_request(stream: &mut UnixStream) -> Result<BridgeRequest, IpcError> {
        let frame = timeout(Duration::from_secs(READ_TIMEOUT_SECS), read_frame(stream))
            .await
            .map_err(|_| IpcError::Timeout)??;

        if frame.iter().all(u8::is_ascii_whitespace) {
            return Err(IpcError::ConnectionClosed);
        }

        serde_json::from_slice(&frame).map_err(|e| IpcError::SerializationError(e.to_string()))
    }

    /// Serializes and sends one newline-terminated response.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub async fn send_response(stream: &mut UnixStream, response: &BridgeResponse) -> Result<()> {
        let mut json = serde_json::to_vec(response).context("Failed to serialize response")?;
        json.push(b'\n');
        write_all(stream, &json).await
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Accepts connections until `shutdown` flips, one task per client.
    pub async fn serve(&self, bridge: Arc<Bridge>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = self.accept() => match accepted {
                    Ok(stream) => {
                        let bridge = bridge.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, bridge).await {
                                tracing::debug!(error = %e, "Connection ended with error");
                            }
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "Accept failed"),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!(socket = %self.socket_path.display(), "IPC server stopped");
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

// ============================================================================
// Connection handling
// ============================================================================

/// Serves one client connection.
pub async fn handle_connection(mut stream: UnixStream, bridge: Arc<Bridge>) -> Result<()> {
    let request = match IpcServer::receive_request(&mut stream).await {
        Ok(request) => request,
        Err(e) => {
            if e.is_reportable() {
                let response = BridgeResponse::error(format!("Invalid request: {}", e));
                IpcServer::send_response(&mut stream, &response).await?;
            }
            return Err(e.into());
        }
    };

    if matches!(request, BridgeRequest::Subscribe) {
        let events = bridge.events().subscribe();
        return stream_events(stream, events).await;
    }

    let response = bridge.handle(request).await;
    IpcServer::send_response(&mut stream, &response).await
}

/// Writes every upward event as one JSON line until the client goes away.
async fn stream_events(
    mut stream: UnixStream,
    mut events: mpsc::UnboundedReceiver<BridgeEvent>,
) -> Result<()> {
    IpcServer::send_response(&mut stream, &BridgeResponse::success("Subscribed", None)).await?;
    tracing::debug!("Event subscriber connected");

    let (mut reader, mut writer) = stream.split();
    let mut scratch = [0u8; 64];
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let mut line = serde_json::to_vec(&event).context("Failed to serialize event")?;
                line.push(b'\n');
                if writer.write_all(&line).await.is_err() {
                    break;
                }
            }
            read = reader.read(&mut scratch) => {
                // Input after the request is ignored; EOF or error means gone.
                if matches!(read, Ok(0) | Err(_)) {
                    break;
                }
            }
        }
    }
    tracing::debug!("Event subscriber disconnected");
    Ok(())
}

async fn read_frame(stream: &mut UnixStream) -> Result<Vec<u8>, IpcError> {
    let mut frame = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| IpcError::ReadError(e.to_string()))?;
        if n == 0 {
            return Ok(frame);
        }
        frame.extend_from_slice(&chunk[..n]);
        if let Some(end) = frame.iter().position(|b| *b == b'\n') {
            frame.truncate(end);
            return Ok(frame);
        }
        if frame.len() > MAX_REQUEST_SIZE {
            return Err(IpcError::RequestTooLarge);
        }
    }
}

async fn write_all(stream: &mut UnixStream, bytes: &[u8]) -> Result<()> {
    stream
        .write_all(bytes)
        .await
        .map_err(|e| IpcError::WriteError(e.to_string()))?;
    stream
        .flush()
        .await
        .map_err(|e| IpcError::WriteError(e.to_string()))?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
