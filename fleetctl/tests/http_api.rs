//! End-to-end tests of the HTTP API: policy gating, approval round-trips,
//! dispatch outcomes, and the error contracts of the decide endpoint.

use axum_test::TestServer;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

use fleetctl::policy::models::CapacitySignals;
use fleetctl::types::{Availability, CapabilityLevel};
use fleetctl::{AppState, Application, Config};

fn quick_config() -> Config {
    let mut config = Config::default();
    config.approvals.ttl = Duration::from_secs(60);
    config.approvals.poll_interval = Duration::from_millis(10);
    config.approvals.wait_timeout = Duration::from_secs(2);
    config
}

fn ready_signals() -> CapacitySignals {
    CapacitySignals {
        source: "grafana".to_string(),
        availability: Availability::Ready,
        dashboard_coverage: 0.9,
        query_coverage: 0.9,
        datasource_count: 3,
        partial: false,
        warnings: vec![],
        panels_by_datasource: HashMap::new(),
    }
}

fn server_with(config: Config) -> (AppState, TestServer) {
    let state = AppState::from_config(config);
    let server = TestServer::new(Application::build_router(state.clone())).unwrap();
    (state, server)
}

/// Fake probe: drains the outbound channel and answers every command.
fn answer_commands(state: &AppState, probe_id: &str, stdout: &'static str, exit_code: i32) {
    let mut outbound = state.fleet.connect(probe_id);
    let tracker = state.dispatch.tracker().clone();
    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let Some(request_id) = message.payload["request_id"].as_str() else {
                continue;
            };
            tracker.complete(
                request_id,
                fleetctl::dispatch::CommandResult {
                    request_id: request_id.to_string(),
                    exit_code,
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                    completed_at: chrono::Utc::now(),
                },
            );
        }
    });
}

#[tokio::test]
async fn test_low_risk_command_dispatches_and_waits() {
    let (state, server) = server_with(quick_config());
    state.fleet.register("probe-a", "edge", CapabilityLevel::Observe);
    answer_commands(&state, "probe-a", "up 3 days", 0);

    let response = server
        .post("/api/v1/probes/probe-a/commands")
        .json(&json!({"command": "uptime", "wait": true, "timeout": "2s"}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["exit_code"], 0);
    assert_eq!(body["stdout"], "up 3 days");
    assert_eq!(state.dispatch.tracker().in_flight(), 0);
}

#[tokio::test]
async fn test_fire_and_forget_returns_dispatch_ack() {
    let (state, server) = server_with(quick_config());
    state.fleet.register("probe-a", "edge", CapabilityLevel::Observe);
    let mut outbound = state.fleet.connect("probe-a");

    let response = server
        .post("/api/v1/probes/probe-a/commands")
        .json(&json!({"command": "echo", "args": ["ping"], "stream": true}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "dispatched");
    let request_id = body["request_id"].as_str().unwrap();
    assert!(request_id.starts_with("cmd-"));

    let message = outbound.recv().await.unwrap();
    assert_eq!(message.payload["command"], "echo");
    assert_eq!(message.payload["stream"], true);
    assert_eq!(message.payload["request_id"], request_id);
}

#[tokio::test]
async fn test_unknown_probe_is_404() {
    let (_state, server) = server_with(quick_config());

    let response = server
        .post("/api/v1/probes/ghost/commands")
        .json(&json!({"command": "uptime"}))
        .await;

    response.assert_status_not_found();
    let body: Value = response.json();
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_wait_times_out_with_504() {
    let (state, server) = server_with(quick_config());
    state.fleet.register("probe-a", "edge", CapabilityLevel::Observe);
    // Connected but never answers.
    let _outbound = state.fleet.connect("probe-a");

    let response = server
        .post("/api/v1/probes/probe-a/commands")
        .json(&json!({"command": "uptime", "wait": true, "timeout": "50ms"}))
        .await;

    assert_eq!(response.status_code(), 504);
    let body: Value = response.json();
    assert_eq!(body["error"], "timeout");
    assert_eq!(body["message"], "timeout waiting for probe response");
    assert_eq!(state.dispatch.tracker().in_flight(), 0);
}

#[tokio::test]
async fn test_disconnected_probe_is_bad_gateway() {
    let (state, server) = server_with(quick_config());
    state.fleet.register("probe-a", "edge", CapabilityLevel::Observe);

    let response = server
        .post("/api/v1/probes/probe-a/commands")
        .json(&json!({"command": "uptime", "wait": true}))
        .await;

    assert_eq!(response.status_code(), 502);
    let body: Value = response.json();
    assert_eq!(body["error"], "bad_gateway");
    assert!(body["message"].as_str().unwrap().contains("not connected"));
}

#[tokio::test]
async fn test_risky_command_queues_for_approval() {
    let (state, server) = server_with(quick_config());
    state.fleet.register("probe-a", "edge", CapabilityLevel::Remediate);

    let response = server
        .post("/api/v1/probes/probe-a/commands")
        .json(&json!({
            "command": "systemctl",
            "args": ["restart", "nginx"],
            "reason": "worker wedged",
            "requested_by": "oncall",
        }))
        .await;

    assert_eq!(response.status_code(), 202);
    let body: Value = response.json();
    assert_eq!(body["status"], "queued");
    assert_eq!(body["approval"]["risk"], "high");
    assert_eq!(body["approval"]["requested_by"], "oncall");
    assert_eq!(body["rationale"]["fallback"], true, "no capacity source configured");

    let pending = server.get("/api/v1/approvals/pending").await;
    pending.assert_status_ok();
    let list: Value = pending.json();
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_approve_and_dispatch_round_trip() {
    let (state, server) = server_with(quick_config());
    state.fleet.register("probe-a", "edge", CapabilityLevel::Remediate);
    let mut outbound = state.fleet.connect("probe-a");

    let queued = server
        .post("/api/v1/probes/probe-a/commands")
        .json(&json!({"command": "reboot", "requested_by": "oncall"}))
        .await;
    let approval_id = queued.json::<Value>()["approval"]["id"].as_str().unwrap().to_string();

    let decided = server
        .post(&format!("/api/v1/approvals/{approval_id}/decision"))
        .json(&json!({"decision": "approved", "decided_by": "keith"}))
        .await;

    decided.assert_status_ok();
    let body: Value = decided.json();
    assert_eq!(body["status"], "approved");
    assert_eq!(body["request"]["decision"], "approved");
    assert_eq!(body["request"]["decided_by"], "keith");

    // The stored command went out to the probe exactly once.
    let message = outbound.recv().await.unwrap();
    assert_eq!(message.payload["command"], "reboot");
    assert!(outbound.try_recv().is_err());

    // Second decision on the same request is rejected by the queue.
    let again = server
        .post(&format!("/api/v1/approvals/{approval_id}/decision"))
        .json(&json!({"decision": "denied", "decided_by": "mallory"}))
        .await;
    assert_eq!(again.status_code(), 400);
    let body: Value = again.json();
    assert_eq!(body["error"], "invalid_request");
    assert!(body["message"].as_str().unwrap().contains("already approved"));
}

#[tokio::test]
async fn test_denied_approval_does_not_dispatch() {
    let (state, server) = server_with(quick_config());
    state.fleet.register("probe-a", "edge", CapabilityLevel::Remediate);
    let mut outbound = state.fleet.connect("probe-a");

    let queued = server
        .post("/api/v1/probes/probe-a/commands")
        .json(&json!({"command": "reboot"}))
        .await;
    let approval_id = queued.json::<Value>()["approval"]["id"].as_str().unwrap().to_string();

    let decided = server
        .post(&format!("/api/v1/approvals/{approval_id}/decision"))
        .json(&json!({"decision": "denied", "decided_by": "keith"}))
        .await;

    decided.assert_status_ok();
    assert_eq!(decided.json::<Value>()["status"], "denied");
    assert!(outbound.try_recv().is_err(), "denied commands never reach the probe");
}

#[tokio::test]
async fn test_approved_dispatch_failure_is_bad_gateway() {
    let (state, server) = server_with(quick_config());
    state.fleet.register("probe-a", "edge", CapabilityLevel::Remediate);
    // Probe registered but not connected: the approved dispatch will fail.

    let queued = server
        .post("/api/v1/probes/probe-a/commands")
        .json(&json!({"command": "reboot"}))
        .await;
    let approval_id = queued.json::<Value>()["approval"]["id"].as_str().unwrap().to_string();

    let decided = server
        .post(&format!("/api/v1/approvals/{approval_id}/decision"))
        .json(&json!({"decision": "approved", "decided_by": "keith"}))
        .await;

    assert_eq!(decided.status_code(), 502);
    let body: Value = decided.json();
    assert_eq!(body["error"], "bad_gateway");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("approved but dispatch failed:"));

    // The decision itself is recorded despite the failed dispatch.
    let snapshot = server.get(&format!("/api/v1/approvals/{approval_id}")).await;
    assert_eq!(snapshot.json::<Value>()["decision"], "approved");
}

#[tokio::test]
async fn test_decide_validation_contract() {
    let (_state, server) = server_with(quick_config());
    let id = uuid::Uuid::new_v4();

    // Missing fields.
    let response = server
        .post(&format!("/api/v1/approvals/{id}/decision"))
        .json(&json!({"decision": "", "decided_by": ""}))
        .await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_request");
    assert_eq!(body["message"], "decision and decided_by are required");

    // Malformed body.
    let response = server
        .post(&format!("/api/v1/approvals/{id}/decision"))
        .content_type("application/json")
        .text("{not json")
        .await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(response.json::<Value>()["message"], "invalid request body");

    // Unknown id surfaces the queue error.
    let response = server
        .post(&format!("/api/v1/approvals/{id}/decision"))
        .json(&json!({"decision": "approved", "decided_by": "keith"}))
        .await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_request");
    assert!(body["message"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_degraded_capacity_denies_commands() {
    let mut config = quick_config();
    let mut signals = ready_signals();
    signals.availability = Availability::Degraded;
    config.capacity.static_signals = Some(signals);

    let (state, server) = server_with(config);
    state.fleet.register("probe-a", "edge", CapabilityLevel::Observe);

    let response = server
        .post("/api/v1/probes/probe-a/commands")
        .json(&json!({"command": "ls"}))
        .await;

    assert_eq!(response.status_code(), 403);
    let body: Value = response.json();
    assert_eq!(body["error"], "policy_denied");
    assert!(body["message"].as_str().unwrap().contains("degraded"));
    let drivers: Vec<&str> = body["rationale"]["indicators"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|i| i["drove_outcome"] == true)
        .filter_map(|i| i["name"].as_str())
        .collect();
    assert_eq!(drivers, vec!["availability"]);
}

#[tokio::test]
async fn test_wait_for_approval_inline_dispatch() {
    let mut config = quick_config();
    config.capacity.static_signals = Some(ready_signals());
    let (state, server) = server_with(config);
    state.fleet.register("probe-a", "edge", CapabilityLevel::Remediate);
    answer_commands(&state, "probe-a", "nginx restarted", 0);

    // Approve from a background task once the request shows up.
    let approver = state.clone();
    tokio::spawn(async move {
        loop {
            if let Some(request) = approver.approvals.queue().pending().into_iter().next() {
                approver
                    .approvals
                    .queue()
                    .decide(request.id, fleetctl::types::ApprovalDecision::Approved, "keith")
                    .unwrap();
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    let response = server
        .post("/api/v1/probes/probe-a/commands")
        .json(&json!({
            "command": "systemctl",
            "args": ["restart", "nginx"],
            "wait_for_approval": true,
            "wait": true,
            "timeout": "2s",
        }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["stdout"], "nginx restarted");
}

#[tokio::test]
async fn test_grafana_endpoints() {
    let mut config = quick_config();
    config.capacity.static_signals = Some(ready_signals());
    let (_state, server) = server_with(config);

    let status = server.get("/api/v1/grafana/status").await;
    status.assert_status_ok();
    let body: Value = status.json();
    assert_eq!(body["availability"], "ready");
    assert_eq!(body["datasource_count"], 3);

    let snapshot = server.get("/api/v1/grafana/snapshot").await;
    snapshot.assert_status_ok();
    assert_eq!(snapshot.json::<Value>()["source"], "grafana");

    // Without a source the endpoints report unavailability.
    let (_state, bare) = server_with(quick_config());
    let status = bare.get("/api/v1/grafana/status").await;
    assert_eq!(status.status_code(), 503);
}

#[tokio::test]
async fn test_policy_preview() {
    let mut config = quick_config();
    config.capacity.static_signals = Some(ready_signals());
    let (_state, server) = server_with(config);

    let response = server
        .post("/api/v1/policy/preview")
        .json(&json!({"command": "rm", "args": ["-rf", "/var/cache"]}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["outcome"], "queue");
    assert_eq!(body["risk"], "critical");
    assert_eq!(body["rationale"]["policy_version"], "capacity-policy/v1");
}

#[tokio::test]
async fn test_apply_policy_template_flow() {
    let mut config = quick_config();
    config.policy_templates = vec![fleetctl::fleet::PolicyTemplate {
        id: "remediate".to_string(),
        name: "Full remediation".to_string(),
        level: CapabilityLevel::Remediate,
        description: String::new(),
    }];
    let (state, server) = server_with(config);

    server
        .post("/api/v1/probes")
        .json(&json!({"id": "probe-a", "name": "edge", "level": "observe"}))
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    // Probe not connected: stored but not pushed.
    let response = server
        .post("/api/v1/probes/probe-a/policy")
        .json(&json!({"policy_id": "remediate"}))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["pushed"], false);
    assert_eq!(body["template"]["level"], "remediate");
    assert_eq!(state.fleet.get("probe-a").unwrap().level, CapabilityLevel::Remediate);

    // Connected: stored and pushed.
    let mut outbound = state.fleet.connect("probe-a");
    let response = server
        .post("/api/v1/probes/probe-a/policy")
        .json(&json!({"policy_id": "remediate"}))
        .await;
    assert_eq!(response.json::<Value>()["pushed"], true);
    let message = outbound.recv().await.unwrap();
    assert_eq!(message.payload["template_id"], "remediate");

    // Unknown template.
    let response = server
        .post("/api/v1/probes/probe-a/policy")
        .json(&json!({"policy_id": "ghost"}))
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_result_ingest_without_waiter() {
    let (_state, server) = server_with(quick_config());

    let response = server
        .post("/api/v1/probes/probe-a/results")
        .json(&json!({
            "request_id": "cmd-404",
            "exit_code": 0,
            "stdout": "late",
            "completed_at": chrono::Utc::now(),
        }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["delivered"], false);
}

#[tokio::test]
async fn test_long_poll_returns_pending_snapshot_on_timeout() {
    let (state, server) = server_with(quick_config());
    state.fleet.register("probe-a", "edge", CapabilityLevel::Remediate);

    let queued = server
        .post("/api/v1/probes/probe-a/commands")
        .json(&json!({"command": "reboot"}))
        .await;
    let approval_id = queued.json::<Value>()["approval"]["id"].as_str().unwrap().to_string();

    let response = server
        .get(&format!("/api/v1/approvals/{approval_id}/decision?timeout=50ms"))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["decision"], "pending");
}
