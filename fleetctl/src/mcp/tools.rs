//! MCP tool implementations.
//!
//! Each tool goes through the same services as the HTTP handlers and renders
//! its outcome through the MCP side of the projection codec, so the two
//! surfaces cannot drift apart.

use serde_json::{json, Value};
use std::cell::RefCell;
use tokio_util::sync::CancellationToken;

use crate::dispatch::{CommandPayload, DispatchPolicy};
use crate::surface::approvals::DecideApprovalProjection;
use crate::surface::commands::CommandInvokeProjection;
use crate::surface::envelope::{Surface, WriterKernel};
use crate::surface::{render_command, render_decide};
use crate::types::{ApprovalDecision, ApprovalId, PolicyOutcome};
use crate::AppState;

/// Result of a tool call: text content plus an error flag, matching the MCP
/// `tools/call` response shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub text: String,
    pub is_error: bool,
}

impl ToolOutcome {
    fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// Tool descriptors for `tools/list`.
pub fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "invoke_command",
            "description": "Run a shell-style command on a probe. Risky commands are queued for operator approval instead of running.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "probe_id": {"type": "string"},
                    "command": {"type": "string"},
                    "args": {"type": "array", "items": {"type": "string"}},
                    "stream": {"type": "boolean"},
                    "wait": {"type": "boolean", "description": "Wait for the result (default true)"},
                    "timeout_secs": {"type": "integer"},
                    "reason": {"type": "string"},
                    "requested_by": {"type": "string"}
                },
                "required": ["probe_id", "command"]
            }
        }),
        json!({
            "name": "decide_approval",
            "description": "Approve or deny a pending command approval; approvals dispatch the stored command.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "approval_id": {"type": "string"},
                    "decision": {"type": "string", "enum": ["approved", "denied"]},
                    "decided_by": {"type": "string"}
                },
                "required": ["approval_id", "decision", "decided_by"]
            }
        }),
        json!({
            "name": "list_approvals",
            "description": "List approval requests, optionally only the still-pending ones.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "pending_only": {"type": "boolean"},
                    "limit": {"type": "integer"}
                }
            }
        }),
        json!({
            "name": "capacity_status",
            "description": "Read the current capacity snapshot used by command policy.",
            "inputSchema": {"type": "object", "properties": {}}
        }),
    ]
}

/// Dispatch a `tools/call` to its implementation.
pub async fn call_tool(state: &AppState, name: &str, args: &Value) -> ToolOutcome {
    match name {
        "invoke_command" => invoke_command(state, args).await,
        "decide_approval" => decide_approval(state, args).await,
        "list_approvals" => list_approvals(state, args),
        "capacity_status" => capacity_status(state).await,
        other => ToolOutcome::error(format!("unknown tool {other:?}")),
    }
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

/// Play a decide projection through an MCP kernel.
fn render_decide_outcome(projection: &DecideApprovalProjection) -> ToolOutcome {
    let success = RefCell::new(None::<Value>);
    let error = RefCell::new(None::<String>);
    let kernel = WriterKernel::mcp(
        |e| *error.borrow_mut() = Some(e.to_string()),
        |v| *success.borrow_mut() = Some(v.clone()),
    );
    render_decide(&Surface::Mcp, projection, &kernel);
    drop(kernel);

    if let Some(message) = error.into_inner() {
        ToolOutcome::error(message)
    } else {
        match success.into_inner() {
            Some(value) => ToolOutcome::ok(value_to_text(&value)),
            None => ToolOutcome::error("no response produced"),
        }
    }
}

/// Play a command projection through an MCP kernel.
fn render_command_outcome(projection: &CommandInvokeProjection) -> ToolOutcome {
    let success = RefCell::new(None::<Value>);
    let error = RefCell::new(None::<String>);
    let kernel = WriterKernel::mcp(
        |e| *error.borrow_mut() = Some(e.to_string()),
        |v| *success.borrow_mut() = Some(v.clone()),
    );
    render_command(&Surface::Mcp, projection, &kernel);
    drop(kernel);

    if let Some(message) = error.into_inner() {
        ToolOutcome::error(message)
    } else {
        match success.into_inner() {
            Some(value) => ToolOutcome::ok(value_to_text(&value)),
            None => ToolOutcome::error("no response produced"),
        }
    }
}

async fn invoke_command(state: &AppState, args: &Value) -> ToolOutcome {
    let Some(probe_id) = str_arg(args, "probe_id") else {
        return ToolOutcome::error("probe_id is required");
    };
    let Some(command) = str_arg(args, "command") else {
        return ToolOutcome::error("command is required");
    };
    let Some(probe) = state.fleet.get(probe_id) else {
        return ToolOutcome::error(format!("probe {probe_id} not found"));
    };

    let mut payload = CommandPayload::new(command);
    payload.level = probe.level;
    payload.stream = args.get("stream").and_then(Value::as_bool).unwrap_or(false);
    if let Some(list) = args.get("args").and_then(Value::as_array) {
        payload.args = list
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
    }
    if let Some(secs) = args.get("timeout_secs").and_then(Value::as_u64) {
        payload.timeout = std::time::Duration::from_secs(secs);
    } else {
        payload.timeout = state.config.dispatch.default_timeout;
    }

    let decision = state.engine.evaluate_command_policy(&payload, probe.level).await;
    match decision.outcome {
        PolicyOutcome::Deny => {
            return ToolOutcome::error(format!("command denied: {}", decision.rationale.summary));
        }
        PolicyOutcome::Queue => {
            let reason = str_arg(args, "reason").unwrap_or(&decision.rationale.summary);
            let requested_by = str_arg(args, "requested_by").unwrap_or("mcp");
            return match state.approvals.queue_command(
                &probe.id,
                payload,
                decision.risk,
                reason,
                requested_by,
            ) {
                Ok(approval) => ToolOutcome::ok(format!(
                    "queued for approval: id={} risk={} expires_at={}\nreason: {}",
                    approval.id.as_uuid(),
                    approval.risk,
                    approval.expires_at.to_rfc3339(),
                    approval.reason,
                )),
                Err(e) => ToolOutcome::error(e.to_string()),
            };
        }
        PolicyOutcome::Allow => {}
    }

    let wait = args.get("wait").and_then(Value::as_bool).unwrap_or(true);
    let policy = if wait {
        DispatchPolicy::wait(payload.timeout)
    } else {
        DispatchPolicy::fire_and_forget()
    }
    .with_stream(payload.stream);

    let ctx = CancellationToken::new();
    let envelope = state
        .dispatch
        .dispatch_with_policy(&ctx, &probe.id, payload, policy)
        .await;
    let projection = CommandInvokeProjection::new(envelope, wait);
    render_command_outcome(&projection)
}

async fn decide_approval(state: &AppState, args: &Value) -> ToolOutcome {
    let decision = str_arg(args, "decision");
    let decided_by = str_arg(args, "decided_by");
    let (Some(decision_str), Some(decided_by)) = (decision, decided_by) else {
        return render_decide_outcome(&DecideApprovalProjection::missing_fields());
    };
    let Some(id) = str_arg(args, "approval_id") else {
        return ToolOutcome::error("approval_id is required");
    };
    let Ok(id) = id.parse::<uuid::Uuid>() else {
        return ToolOutcome::error(format!("invalid approval_id {id:?}"));
    };
    let decision = match decision_str.parse::<ApprovalDecision>() {
        Ok(decision) => decision,
        Err(e) => return ToolOutcome::error(e),
    };

    let dispatch = state.dispatch.clone();
    let outcome = state
        .approvals
        .decide_and_dispatch(
            ApprovalId::from(id),
            decision,
            decided_by,
            move |probe_id, cmd| async move {
                let ctx = CancellationToken::new();
                let envelope = dispatch
                    .dispatch_with_policy(&ctx, &probe_id, cmd, DispatchPolicy::fire_and_forget())
                    .await;
                match envelope.error {
                    Some(error) => Err(anyhow::Error::new(error)),
                    None => Ok(()),
                }
            },
        )
        .await;

    let projection = match outcome {
        Ok(result) => DecideApprovalProjection::from_result(&result),
        Err(e) => DecideApprovalProjection::from_error(&e),
    };
    render_decide_outcome(&projection)
}

fn list_approvals(state: &AppState, args: &Value) -> ToolOutcome {
    let pending_only = args.get("pending_only").and_then(Value::as_bool).unwrap_or(false);
    let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(50) as usize;

    let approvals = if pending_only {
        state.approvals.queue().pending()
    } else {
        state.approvals.queue().all(limit)
    };

    if approvals.is_empty() {
        return ToolOutcome::ok("no approval requests");
    }
    match serde_json::to_string_pretty(&approvals) {
        Ok(text) => ToolOutcome::ok(text),
        Err(e) => ToolOutcome::error(e.to_string()),
    }
}

async fn capacity_status(state: &AppState) -> ToolOutcome {
    match state.signals.capacity_signals().await {
        Ok(Some(signals)) => match serde_json::to_string_pretty(&signals) {
            Ok(text) => ToolOutcome::ok(text),
            Err(e) => ToolOutcome::error(e.to_string()),
        },
        Ok(None) => ToolOutcome::ok("capacity signals unavailable"),
        Err(e) => ToolOutcome::error(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::types::CapabilityLevel;
    use chrono::Utc;

    fn state() -> AppState {
        AppState::from_config(Config::default())
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let state = state();
        let outcome = call_tool(&state, "fly_a_kite", &json!({})).await;
        assert!(outcome.is_error);
        assert!(outcome.text.contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_invoke_requires_probe() {
        let state = state();
        let outcome = call_tool(
            &state,
            "invoke_command",
            &json!({"probe_id": "ghost", "command": "uptime"}),
        )
        .await;
        assert!(outcome.is_error);
        assert!(outcome.text.contains("not found"));
    }

    #[tokio::test]
    async fn test_invoke_risky_command_queues() {
        let state = state();
        state.fleet.register("probe-a", "a", CapabilityLevel::Remediate);

        let outcome = call_tool(
            &state,
            "invoke_command",
            &json!({"probe_id": "probe-a", "command": "reboot", "requested_by": "keith"}),
        )
        .await;

        assert!(!outcome.is_error);
        assert!(outcome.text.starts_with("queued for approval"));
        assert_eq!(state.approvals.queue().pending().len(), 1);
    }

    #[tokio::test]
    async fn test_invoke_and_wait_returns_result_text() {
        let state = state();
        state.fleet.register("probe-a", "a", CapabilityLevel::Observe);
        let mut outbound = state.fleet.connect("probe-a");

        // Fake probe: answer the first command that arrives.
        let tracker = state.dispatch.tracker().clone();
        tokio::spawn(async move {
            if let Some(message) = outbound.recv().await {
                let request_id = message.payload["request_id"].as_str().unwrap().to_string();
                tracker.complete(
                    &request_id,
                    crate::dispatch::CommandResult {
                        request_id: request_id.clone(),
                        exit_code: 0,
                        stdout: "up 3 days".to_string(),
                        stderr: String::new(),
                        completed_at: Utc::now(),
                    },
                );
            }
        });

        let outcome = call_tool(
            &state,
            "invoke_command",
            &json!({"probe_id": "probe-a", "command": "uptime", "timeout_secs": 2}),
        )
        .await;

        assert!(!outcome.is_error, "got error: {}", outcome.text);
        assert_eq!(outcome.text, "up 3 days");
    }

    #[tokio::test]
    async fn test_decide_approval_validation() {
        let state = state();
        let outcome = call_tool(&state, "decide_approval", &json!({"decision": "approved"})).await;
        assert!(outcome.is_error);
        assert_eq!(outcome.text, "decision and decided_by are required");
    }

    #[tokio::test]
    async fn test_decide_approval_round_trip() {
        let state = state();
        state.fleet.register("probe-a", "a", CapabilityLevel::Remediate);
        let _outbound = state.fleet.connect("probe-a");

        let queued = call_tool(
            &state,
            "invoke_command",
            &json!({"probe_id": "probe-a", "command": "reboot"}),
        )
        .await;
        assert!(queued.text.starts_with("queued for approval"));
        let approval = &state.approvals.queue().pending()[0];

        let outcome = call_tool(
            &state,
            "decide_approval",
            &json!({
                "approval_id": approval.id.as_uuid().to_string(),
                "decision": "approved",
                "decided_by": "keith",
            }),
        )
        .await;

        assert!(!outcome.is_error, "got error: {}", outcome.text);
        let payload: Value = serde_json::from_str(&outcome.text).unwrap();
        assert_eq!(payload["status"], "approved");
        assert_eq!(payload["request"]["decided_by"], "keith");
    }

    #[tokio::test]
    async fn test_list_approvals_empty() {
        let state = state();
        let outcome = call_tool(&state, "list_approvals", &json!({})).await;
        assert!(!outcome.is_error);
        assert_eq!(outcome.text, "no approval requests");
    }

    #[tokio::test]
    async fn test_capacity_status_without_source() {
        let state = state();
        let outcome = call_tool(&state, "capacity_status", &json!({})).await;
        assert!(!outcome.is_error);
        assert_eq!(outcome.text, "capacity signals unavailable");
    }
}
