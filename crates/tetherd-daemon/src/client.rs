use std::path::Path;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use tetherd_core::types::ActivityEntry;

use crate::server::StatusInfo;

/// Minimal client for the tetherd JSON-RPC Unix socket API.
pub struct DaemonClient {
    stream: BufReader<UnixStream>,
    next_id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    #[allow(dead_code)]
    id: Option<u64>,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    #[allow(dead_code)]
    code: i32,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcPush {
    method: String,
    #[serde(default)]
    params: serde_json::Value,
}

/// Extract the `result` payload from a raw JSON-RPC response line.
///
/// Extracted from the call path so it can be unit-tested without a live
/// socket connection.
fn parse_result(line: &str) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let resp: JsonRpcResponse = serde_json::from_str(line)?;
    if let Some(err) = resp.error {
        return Err(format!("daemon error: {}", err.message).into());
    }
    resp.result
        .ok_or_else(|| "missing result in response".into())
}

/// Parse a push line into an activity entry, skipping non-activity pushes.
fn parse_activity_push(line: &str) -> Option<ActivityEntry> {
    let push: JsonRpcPush = serde_json::from_str(line).ok()?;
    if push.method != "activity" {
        return None;
    }
    serde_json::from_value(push.params).ok()
}

impl DaemonClient {
    /// Connect to the daemon at the given Unix socket path.
    pub async fn connect(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self {
            stream: BufReader::new(stream),
            next_id: 1,
        })
    }

    async fn call(
        &mut self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
        let id = self.next_id;
        self.next_id += 1;
        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        // Write the request as a newline-delimited JSON line.
        let writer = self.stream.get_mut();
        writer.write_all(request.to_string().as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        // Read the response line.
        let mut line = String::new();
        self.stream.read_line(&mut line).await?;

        parse_result(&line)
    }

    /// Fetch the current status snapshot.
    pub async fn status(&mut self) -> Result<StatusInfo, Box<dyn std::error::Error>> {
        let result = self.call("status", serde_json::json!({})).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Switch the monitored device.
    pub async fn set_target(&mut self, target: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.call("set_target", serde_json::json!({ "target": target }))
            .await?;
        Ok(())
    }

    /// Enable or disable automation.
    pub async fn set_automation(&mut self, enabled: bool) -> Result<(), Box<dyn std::error::Error>> {
        self.call("set_automation", serde_json::json!({ "enabled": enabled }))
            .await?;
        Ok(())
    }

    /// Report the hotspot state the actuator observed.
    pub async fn report_actuation(
        &mut self,
        enabled: bool,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.call("report_actuation", serde_json::json!({ "enabled": enabled }))
            .await?;
        Ok(())
    }

    /// Ask the daemon to clear persisted state and shut down.
    pub async fn stop(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.call("stop", serde_json::json!({})).await?;
        Ok(())
    }

    /// Subscribe to the activity feed and invoke `on_entry` for each push
    /// until the connection closes.
    pub async fn watch(
        &mut self,
        mut on_entry: impl FnMut(ActivityEntry),
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.call("subscribe", serde_json::json!({})).await?;
        loop {
            let mut line = String::new();
            if self.stream.read_line(&mut line).await? == 0 {
                return Ok(());
            }
            if let Some(entry) = parse_activity_push(&line) {
                on_entry(entry);
            }
        }
    }
}
