//! Handlers for the approval queue endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::models::approvals::{DecideApprovalBody, ListApprovalsQuery, WaitDecisionQuery};
use crate::approvals::models::ApprovalRequest;
use crate::approvals::queue::ApprovalError;
use crate::dispatch::DispatchPolicy;
use crate::errors::Error;
use crate::surface::approvals::DecideApprovalProjection;
use crate::surface::envelope::{HttpErrorBody, Surface};
use crate::surface::render_decide;
use crate::types::{ApprovalDecision, ApprovalId};
use crate::AppState;

use super::respond_via;

/// Longest long-poll budget the wait endpoint will honor.
const MAX_WAIT_TIMEOUT: Duration = Duration::from_secs(120);

#[utoipa::path(
    post,
    path = "/approvals/{id}/decision",
    tag = "approvals",
    summary = "Decide a pending approval",
    description = "Record an approved/denied decision and, on approval, dispatch the stored command to its probe.",
    params(("id" = Uuid, Path, description = "Approval request ID")),
    request_body = DecideApprovalBody,
    responses(
        (status = 200, description = "Decision recorded"),
        (status = 400, description = "Invalid body or queue rejection"),
        (status = 502, description = "Approved but dispatch failed"),
        (status = 500, description = "Decision hook failed"),
    )
)]
pub async fn decide_approval(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<DecideApprovalBody>, JsonRejection>,
) -> Response {
    let projection = decide_projection(&state, ApprovalId::from(id), body).await;
    respond_via(|kernel| render_decide(&Surface::Http, &projection, kernel))
}

/// Run the decide flow and fold every outcome into the surface projection.
pub(crate) async fn decide_projection(
    state: &AppState,
    id: ApprovalId,
    body: Result<Json<DecideApprovalBody>, JsonRejection>,
) -> DecideApprovalProjection {
    let body = match body {
        Ok(Json(body)) => body,
        Err(_) => return DecideApprovalProjection::invalid_body(),
    };

    let decision = body.decision.trim();
    let decided_by = body.decided_by.trim();
    if decision.is_empty() || decided_by.is_empty() {
        return DecideApprovalProjection::missing_fields();
    }

    let decision = match decision.parse::<ApprovalDecision>() {
        Ok(decision) => decision,
        Err(e) => {
            return DecideApprovalProjection::Error(HttpErrorBody::new(400, "invalid_request", e));
        }
    };

    let dispatch = state.dispatch.clone();
    let outcome = state
        .approvals
        .decide_and_dispatch(id, decision, decided_by, move |probe_id, cmd| async move {
            let ctx = CancellationToken::new();
            let envelope = dispatch
                .dispatch_with_policy(&ctx, &probe_id, cmd, DispatchPolicy::fire_and_forget())
                .await;
            match envelope.error {
                Some(error) => Err(anyhow::Error::new(error)),
                None => Ok(()),
            }
        })
        .await;

    match outcome {
        Ok(result) => DecideApprovalProjection::from_result(&result),
        Err(e) => DecideApprovalProjection::from_error(&e),
    }
}

#[utoipa::path(
    get,
    path = "/approvals",
    tag = "approvals",
    summary = "List approval requests",
    description = "All retained approval requests including terminal ones, newest first.",
    params(ListApprovalsQuery),
    responses((status = 200, description = "Approval requests", body = Vec<ApprovalRequest>))
)]
pub async fn list_approvals(
    State(state): State<AppState>,
    Query(query): Query<ListApprovalsQuery>,
) -> Json<Vec<ApprovalRequest>> {
    let limit = query.limit.unwrap_or(100);
    Json(state.approvals.queue().all(limit))
}

#[utoipa::path(
    get,
    path = "/approvals/pending",
    tag = "approvals",
    summary = "List pending approval requests",
    responses((status = 200, description = "Pending approval requests", body = Vec<ApprovalRequest>))
)]
pub async fn list_pending_approvals(State(state): State<AppState>) -> Json<Vec<ApprovalRequest>> {
    Json(state.approvals.queue().pending())
}

#[utoipa::path(
    get,
    path = "/approvals/{id}",
    tag = "approvals",
    summary = "Get an approval request",
    params(("id" = Uuid, Path, description = "Approval request ID")),
    responses(
        (status = 200, description = "Approval request", body = ApprovalRequest),
        (status = 404, description = "Unknown approval request"),
    )
)]
pub async fn get_approval(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApprovalRequest>, Error> {
    let request = state.approvals.queue().get(ApprovalId::from(id))?;
    Ok(Json(request))
}

#[utoipa::path(
    get,
    path = "/approvals/{id}/decision",
    tag = "approvals",
    summary = "Wait for a decision",
    description = "Long-poll until the request reaches a terminal state or the timeout elapses; \
                   on timeout the current (still pending) snapshot is returned.",
    params(("id" = Uuid, Path, description = "Approval request ID"), WaitDecisionQuery),
    responses(
        (status = 200, description = "Request snapshot", body = ApprovalRequest),
        (status = 404, description = "Unknown approval request"),
    )
)]
pub async fn wait_for_decision(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<WaitDecisionQuery>,
) -> Result<Json<ApprovalRequest>, Error> {
    let timeout = match &query.timeout {
        Some(raw) => humantime::parse_duration(raw).map_err(|e| Error::BadRequest {
            message: format!("invalid timeout: {e}"),
        })?,
        None => state.config.approvals.wait_timeout,
    };
    let timeout = timeout.min(MAX_WAIT_TIMEOUT);

    match state.approvals.wait_for_decision(ApprovalId::from(id), timeout).await {
        Ok(request) => Ok(Json(request)),
        Err(crate::approvals::service::ServiceError::Approval(ApprovalError::DecisionTimeout {
            snapshot,
        })) => Ok(Json(*snapshot)),
        Err(e) => Err(e.into()),
    }
}
