use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use tetherd_core::types::ActivityEntry;

use crate::monitor::MonitorEvent;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Thread-safe status snapshot shared between the monitor and server.
pub type SharedState = Arc<RwLock<StatusInfo>>;

/// Wire-format status returned by `status`. The monitor writes it after
/// every state change; the server only ever reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusInfo {
    pub target: String,
    pub connected: bool,
    pub last_change: String,
    pub automation_enabled: bool,
    pub hotspot_enabled: bool,
    pub debounce_active: bool,
    pub debounce_deadline: Option<String>,
}

// ---------------------------------------------------------------------------
// JSON-RPC types (newline-delimited JSON)
// ---------------------------------------------------------------------------

fn default_jsonrpc() -> String {
    "2.0".into()
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    pub id: Option<u64>,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// Server-initiated push (no `id`).
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

fn ok(id: Option<u64>, result: serde_json::Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".into(),
        id,
        result: Some(result),
        error: None,
    }
}

fn err(id: Option<u64>, code: i32, message: String) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".into(),
        id,
        result: None,
        error: Some(JsonRpcError { code, message }),
    }
}

// ---------------------------------------------------------------------------
// Request params
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SetTargetParams {
    target: String,
}

#[derive(Debug, Deserialize)]
struct EnabledParams {
    enabled: bool,
}

// ---------------------------------------------------------------------------
// ControlServer
// ---------------------------------------------------------------------------

/// Unix-socket server that exposes the daemon API to local clients.
///
/// Protocol: Newline-delimited JSON over Unix stream sockets.
///
/// Supported methods:
///   - `status`           -- returns the current status snapshot
///   - `set_target`       -- switch the monitored device
///   - `set_automation`   -- enable/disable command emission
///   - `report_actuation` -- actuator reports observed hotspot state
///   - `subscribe`        -- subscribe to activity push notifications
///   - `stop`             -- clear persisted state and shut the daemon down
pub struct ControlServer {
    socket_path: PathBuf,
    state: SharedState,
    event_tx: mpsc::Sender<MonitorEvent>,
    activity_tx: broadcast::Sender<ActivityEntry>,
    /// Cancellation token for graceful shutdown.
    cancel: CancellationToken,
}

impl ControlServer {
    pub fn new(
        socket_path: impl Into<PathBuf>,
        state: SharedState,
        event_tx: mpsc::Sender<MonitorEvent>,
        activity_tx: broadcast::Sender<ActivityEntry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            socket_path: socket_path.into(),
            state,
            event_tx,
            activity_tx,
            cancel,
        }
    }

    /// Run the server: bind the listener and accept connections until
    /// cancelled or a fatal listener error occurs.
    pub async fn run(self) -> std::io::Result<()> {
        if let Some(parent) = self.socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Clean up stale socket file from a previous run.
        cleanup_socket(&self.socket_path).await;

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!(path = %self.socket_path.display(), "control server listening");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let state = Arc::clone(&self.state);
                            let event_tx = self.event_tx.clone();
                            let activity_rx = self.activity_tx.subscribe();
                            tokio::spawn(async move {
                                if let Err(e) =
                                    handle_client(stream, state, event_tx, activity_rx).await
                                {
                                    tracing::debug!(error = %e, "client handler finished with error");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "accept failed");
                        }
                    }
                }
                _ = self.cancel.cancelled() => {
                    tracing::info!("control server: cancellation requested, shutting down");
                    break;
                }
            }
        }

        let _ = tokio::fs::remove_file(&self.socket_path).await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Per-client handler
// ---------------------------------------------------------------------------

async fn handle_client(
    stream: UnixStream,
    state: SharedState,
    event_tx: mpsc::Sender<MonitorEvent>,
    mut activity_rx: broadcast::Receiver<ActivityEntry>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    tracing::debug!("client connected");

    let mut subscribed = false;

    loop {
        tokio::select! {
            // --- incoming request from client ---
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(l)) => l,
                    Ok(None) => {
                        tracing::debug!("client disconnected (EOF)");
                        return Ok(());
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "read error, dropping client");
                        return Err(e);
                    }
                };

                let req: JsonRpcRequest = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(e) => {
                        write_json(&mut writer, &err(None, -32700, format!("parse error: {e}")))
                            .await?;
                        continue;
                    }
                };

                tracing::debug!(method = %req.method, id = ?req.id, "request received");

                match req.method.as_str() {
                    "status" => {
                        let info = state.read().await.clone();
                        let resp = match serde_json::to_value(&info) {
                            Ok(value) => ok(req.id, value),
                            Err(e) => err(req.id, -32603, e.to_string()),
                        };
                        write_json(&mut writer, &resp).await?;
                    }

                    "set_target" => {
                        let resp = match serde_json::from_value::<SetTargetParams>(req.params) {
                            Ok(params) => {
                                forward(&event_tx, MonitorEvent::SetTarget { target: params.target }, req.id)
                                    .await
                            }
                            Err(e) => err(req.id, -32602, format!("invalid params: {e}")),
                        };
                        write_json(&mut writer, &resp).await?;
                    }

                    "set_automation" => {
                        let resp = match serde_json::from_value::<EnabledParams>(req.params) {
                            Ok(params) => {
                                forward(
                                    &event_tx,
                                    MonitorEvent::SetAutomation { enabled: params.enabled },
                                    req.id,
                                )
                                .await
                            }
                            Err(e) => err(req.id, -32602, format!("invalid params: {e}")),
                        };
                        write_json(&mut writer, &resp).await?;
                    }

                    "report_actuation" => {
                        let resp = match serde_json::from_value::<EnabledParams>(req.params) {
                            Ok(params) => {
                                forward(
                                    &event_tx,
                                    MonitorEvent::ActuationReport { enabled: params.enabled },
                                    req.id,
                                )
                                .await
                            }
                            Err(e) => err(req.id, -32602, format!("invalid params: {e}")),
                        };
                        write_json(&mut writer, &resp).await?;
                    }

                    "subscribe" => {
                        subscribed = true;
                        tracing::debug!("client subscribed to activity");
                        write_json(&mut writer, &ok(req.id, serde_json::json!({ "subscribed": true })))
                            .await?;
                    }

                    "stop" => {
                        let resp = forward(&event_tx, MonitorEvent::Stop, req.id).await;
                        write_json(&mut writer, &resp).await?;
                    }

                    _ => {
                        write_json(
                            &mut writer,
                            &err(req.id, -32601, format!("method not found: {}", req.method)),
                        )
                        .await?;
                    }
                }
            }

            // --- activity push from the monitor ---
            entry = activity_rx.recv() => {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "client lagged, dropped activity entries");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("activity channel closed, dropping client");
                        return Ok(());
                    }
                };

                if !subscribed {
                    continue;
                }
                let notif = JsonRpcNotification {
                    jsonrpc: "2.0".into(),
                    method: "activity".into(),
                    params: serde_json::to_value(&entry).unwrap_or(serde_json::Value::Null),
                };
                if let Err(e) = write_json(&mut writer, &notif).await {
                    tracing::debug!(error = %e, "failed to push activity, dropping client");
                    return Err(e);
                }
            }
        }
    }
}

/// Queue a control event for the monitor and acknowledge.
async fn forward(
    event_tx: &mpsc::Sender<MonitorEvent>,
    event: MonitorEvent,
    id: Option<u64>,
) -> JsonRpcResponse {
    match event_tx.send(event).await {
        Ok(()) => ok(id, serde_json::json!({ "accepted": true })),
        Err(_) => err(id, -32603, "monitor is shutting down".into()),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Serialize a value as a single JSON line terminated by `\n` and flush.
async fn write_json<T: Serialize>(
    writer: &mut tokio::net::unix::OwnedWriteHalf,
    value: &T,
) -> std::io::Result<()> {
    let mut buf = serde_json::to_vec(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await
}

/// Remove a stale socket file if it exists.
async fn cleanup_socket(path: &Path) {
    if path.exists() {
        tracing::info!(path = %path.display(), "removing stale socket");
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(
                error = %e,
                path = %path.display(),
                "failed to remove stale socket"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
