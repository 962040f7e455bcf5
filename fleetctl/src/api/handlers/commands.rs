//! Handler for the command invoke endpoint.
//!
//! The full request path: decode → policy evaluation → allow (dispatch) /
//! queue (submit for approval, optionally wait) / deny (emit error) → render
//! through the command invoke codec.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::api::models::commands::InvokeCommandRequest;
use crate::approvals::queue::ApprovalError;
use crate::approvals::service::ServiceError;
use crate::dispatch::{CommandPayload, DispatchPolicy};
use crate::errors::Error;
use crate::surface::commands::CommandInvokeProjection;
use crate::surface::envelope::Surface;
use crate::surface::render_command;
use crate::types::{ApprovalDecision, PolicyOutcome};
use crate::AppState;

use super::respond_via;

#[utoipa::path(
    post,
    path = "/probes/{probe_id}/commands",
    tag = "commands",
    summary = "Invoke a command on a probe",
    description = "Evaluates capacity policy first: allowed commands dispatch immediately, \
                   queue-class commands are submitted for operator approval, denied commands \
                   return the rationale.",
    params(("probe_id" = String, Path, description = "Target probe ID")),
    request_body = InvokeCommandRequest,
    responses(
        (status = 200, description = "Dispatched (ack or full result)"),
        (status = 202, description = "Queued for approval"),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Denied by policy or operator"),
        (status = 404, description = "Unknown probe"),
        (status = 429, description = "Approval queue full"),
        (status = 502, description = "Dispatch failed"),
        (status = 504, description = "Timed out waiting for the probe"),
    )
)]
pub async fn invoke_command(
    State(state): State<AppState>,
    Path(probe_id): Path<String>,
    body: Result<Json<InvokeCommandRequest>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(_) => {
            return Error::BadRequest {
                message: "invalid request body".to_string(),
            }
            .into_response();
        }
    };
    if body.command.trim().is_empty() {
        return Error::BadRequest {
            message: "command is required".to_string(),
        }
        .into_response();
    }

    let Some(probe) = state.fleet.get(&probe_id) else {
        return Error::NotFound {
            resource: "probe".to_string(),
            id: probe_id,
        }
        .into_response();
    };

    let payload = CommandPayload {
        request_id: body.request_id.clone(),
        command: body.command.clone(),
        args: body.args.clone(),
        level: body.level.unwrap_or(probe.level),
        stream: body.stream,
        timeout: body.timeout.unwrap_or(state.config.dispatch.default_timeout),
    };

    let decision = state.engine.evaluate_command_policy(&payload, probe.level).await;
    tracing::debug!(
        probe_id = %probe.id,
        command = %payload.command_line(),
        outcome = %decision.outcome,
        risk = %decision.risk,
        "command policy evaluated"
    );

    match decision.outcome {
        PolicyOutcome::Deny => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "policy_denied",
                "message": decision.rationale.summary.clone(),
                "rationale": decision.rationale,
            })),
        )
            .into_response(),

        PolicyOutcome::Queue => {
            let requested_by = if body.requested_by.trim().is_empty() {
                "api"
            } else {
                body.requested_by.trim()
            };
            let reason = if body.reason.trim().is_empty() {
                decision.rationale.summary.as_str()
            } else {
                body.reason.trim()
            };

            let approval = match state.approvals.queue_command(
                &probe.id,
                payload.clone(),
                decision.risk,
                reason,
                requested_by,
            ) {
                Ok(approval) => approval,
                Err(e) => return Error::from(e).into_response(),
            };

            if !body.wait_for_approval {
                return (
                    StatusCode::ACCEPTED,
                    Json(json!({
                        "status": "queued",
                        "approval": approval,
                        "rationale": decision.rationale,
                    })),
                )
                    .into_response();
            }

            let wait = state.config.approvals.wait_timeout;
            match state.approvals.wait_for_decision(approval.id, wait).await {
                Ok(decided) => match decided.decision {
                    ApprovalDecision::Approved => {
                        dispatch_and_render(&state, &probe.id, payload, &body).await
                    }
                    ApprovalDecision::Denied => (
                        StatusCode::FORBIDDEN,
                        Json(json!({
                            "error": "approval_denied",
                            "message": format!(
                                "denied by {}",
                                decided.decided_by.as_deref().unwrap_or("operator")
                            ),
                            "approval": decided,
                        })),
                    )
                        .into_response(),
                    _ => Error::Approval(ApprovalError::Expired { id: decided.id }).into_response(),
                },
                Err(ServiceError::Approval(ApprovalError::DecisionTimeout { snapshot })) => (
                    StatusCode::ACCEPTED,
                    Json(json!({
                        "status": "queued",
                        "approval": *snapshot,
                        "rationale": decision.rationale,
                    })),
                )
                    .into_response(),
                Err(e) => Error::from(e).into_response(),
            }
        }

        PolicyOutcome::Allow => dispatch_and_render(&state, &probe.id, payload, &body).await,
    }
}

/// Dispatch the payload and render the envelope through the command codec.
async fn dispatch_and_render(
    state: &AppState,
    probe_id: &str,
    payload: CommandPayload,
    body: &InvokeCommandRequest,
) -> Response {
    let policy = if body.wait {
        DispatchPolicy::wait(payload.timeout)
    } else {
        DispatchPolicy::fire_and_forget()
    }
    .with_stream(body.stream);

    let ctx = CancellationToken::new();
    let envelope = state
        .dispatch
        .dispatch_with_policy(&ctx, probe_id, payload, policy)
        .await;

    let projection = CommandInvokeProjection::new(envelope, body.wait);
    respond_via(|kernel| render_command(&Surface::Http, &projection, kernel))
}
