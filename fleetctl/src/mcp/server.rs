//! Minimal MCP server: JSON-RPC 2.0 over stdio.
//!
//! Handles `initialize`, `tools/list`, and `tools/call`; everything else gets
//! a method-not-found error. Notifications are consumed silently. The tool
//! implementations live in [`super::tools`].

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::AppState;

use super::tools::{call_tool, tool_definitions};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    #[serde(default)]
    jsonrpc: String,
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

/// Serve the tool surface over stdio until EOF or shutdown.
pub async fn serve_stdio(state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    tracing::info!("MCP server listening on stdio");

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("MCP server shutting down");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        if let Some(response) = handle_message(&state, &line).await {
            let mut encoded = serde_json::to_string(&response)?;
            encoded.push('\n');
            stdout.write_all(encoded.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    Ok(())
}

/// Handle one raw JSON-RPC message; `None` means nothing should be written
/// back (notifications).
pub async fn handle_message(state: &AppState, raw: &str) -> Option<Value> {
    let request: JsonRpcRequest = match serde_json::from_str(raw) {
        Ok(request) => request,
        Err(e) => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {"code": -32700, "message": format!("parse error: {e}")},
            }));
        }
    };

    // Notifications carry no id and expect no reply.
    let Some(id) = request.id else {
        tracing::debug!(method = %request.method, "MCP notification");
        return None;
    };

    let result = match request.method.as_str() {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {"tools": {}},
            "serverInfo": {
                "name": "fleetctl",
                "version": env!("CARGO_PKG_VERSION"),
            },
        })),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({"tools": tool_definitions()})),
        "tools/call" => {
            let params = request.params.unwrap_or(Value::Null);
            let name = params.get("name").and_then(Value::as_str).unwrap_or("");
            let empty_args = json!({});
            let arguments = params.get("arguments").unwrap_or(&empty_args);

            let outcome = call_tool(state, name, arguments).await;
            tracing::debug!(tool = name, is_error = outcome.is_error, "MCP tool call");
            Ok(json!({
                "content": [{"type": "text", "text": outcome.text}],
                "isError": outcome.is_error,
            }))
        }
        other => Err(format!("method {other:?} not found")),
    };

    Some(match result {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err(message) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32601, "message": message},
        }),
    })
}
