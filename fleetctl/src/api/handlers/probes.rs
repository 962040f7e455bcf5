//! Handlers for the probe fleet endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::api::models::probes::{
    ApplyPolicyRequest, IngestResultResponse, PolicyApplicationResponse, RegisterProbeRequest,
};
use crate::dispatch::{CommandResult, MessageType};
use crate::errors::Error;
use crate::fleet::store::ProbeState;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/probes",
    tag = "probes",
    summary = "Register a probe",
    request_body = RegisterProbeRequest,
    responses(
        (status = 201, description = "Probe registered", body = ProbeState),
        (status = 400, description = "Invalid probe data"),
    )
)]
pub async fn register_probe(
    State(state): State<AppState>,
    Json(body): Json<RegisterProbeRequest>,
) -> Result<(StatusCode, Json<ProbeState>), Error> {
    if body.id.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "probe id is required".to_string(),
        });
    }
    let name = if body.name.is_empty() { body.id.clone() } else { body.name };
    let probe = state.fleet.register(body.id.trim(), &name, body.level);
    Ok((StatusCode::CREATED, Json(probe)))
}

#[utoipa::path(
    get,
    path = "/probes",
    tag = "probes",
    summary = "List registered probes",
    responses((status = 200, description = "Probe fleet", body = Vec<ProbeState>))
)]
pub async fn list_probes(State(state): State<AppState>) -> Json<Vec<ProbeState>> {
    Json(state.fleet.list())
}

#[utoipa::path(
    get,
    path = "/probes/{probe_id}",
    tag = "probes",
    summary = "Get a probe",
    params(("probe_id" = String, Path, description = "Probe ID")),
    responses(
        (status = 200, description = "Probe state", body = ProbeState),
        (status = 404, description = "Unknown probe"),
    )
)]
pub async fn get_probe(
    State(state): State<AppState>,
    Path(probe_id): Path<String>,
) -> Result<Json<ProbeState>, Error> {
    state.fleet.get(&probe_id).map(Json).ok_or(Error::NotFound {
        resource: "probe".to_string(),
        id: probe_id,
    })
}

#[utoipa::path(
    post,
    path = "/probes/{probe_id}/results",
    tag = "probes",
    summary = "Ingest a command result from a probe",
    description = "Feeds the per-request tracker; `delivered` reports whether anything was \
                   still waiting for this request id.",
    params(("probe_id" = String, Path, description = "Reporting probe ID")),
    request_body = CommandResult,
    responses((status = 200, description = "Result accepted", body = IngestResultResponse))
)]
pub async fn ingest_result(
    State(state): State<AppState>,
    Path(probe_id): Path<String>,
    Json(result): Json<CommandResult>,
) -> Result<Json<IngestResultResponse>, Error> {
    if result.request_id.is_empty() {
        return Err(Error::BadRequest {
            message: "request_id is required".to_string(),
        });
    }
    state.fleet.touch(&probe_id);
    let request_id = result.request_id.clone();
    let delivered = state.dispatch.tracker().complete(&request_id, result);
    Ok(Json(IngestResultResponse { delivered }))
}

#[utoipa::path(
    post,
    path = "/probes/{probe_id}/policy",
    tag = "probes",
    summary = "Apply a policy template to a probe",
    description = "Stores the template's capability level and pushes it to the probe. A failed \
                   push is a partial success: the policy is stored, `pushed` is false.",
    params(("probe_id" = String, Path, description = "Target probe ID")),
    request_body = ApplyPolicyRequest,
    responses(
        (status = 200, description = "Template applied", body = PolicyApplicationResponse),
        (status = 404, description = "Unknown probe or template"),
    )
)]
pub async fn apply_policy(
    State(state): State<AppState>,
    Path(probe_id): Path<String>,
    Json(body): Json<ApplyPolicyRequest>,
) -> Result<Json<PolicyApplicationResponse>, Error> {
    let sender = state.sender.clone();
    let applied = state
        .approvals
        .apply_policy_template(
            &probe_id,
            &body.policy_id,
            Some(move |probe: String, policy: serde_json::Value| async move {
                sender
                    .send_to(&probe, MessageType::PolicyUpdate, policy)
                    .await
                    .map_err(anyhow::Error::new)
            }),
        )
        .await?;

    Ok(Json(PolicyApplicationResponse {
        template: applied.template,
        pushed: applied.pushed,
    }))
}
