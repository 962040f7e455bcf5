//! Policy evaluation preview endpoint.

use axum::extract::State;
use axum::Json;

use crate::api::models::commands::InvokeCommandRequest;
use crate::dispatch::CommandPayload;
use crate::errors::Error;
use crate::policy::models::CommandPolicyDecision;
use crate::types::CapabilityLevel;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/policy/preview",
    tag = "policy",
    summary = "Evaluate command policy without dispatching",
    description = "Returns the allow/queue/deny decision and full rationale for a command as if \
                   it were invoked now.",
    request_body = InvokeCommandRequest,
    responses(
        (status = 200, description = "Policy decision", body = CommandPolicyDecision),
        (status = 400, description = "Invalid request"),
    )
)]
pub async fn preview_policy(
    State(state): State<AppState>,
    Json(body): Json<InvokeCommandRequest>,
) -> Result<Json<CommandPolicyDecision>, Error> {
    if body.command.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "command is required".to_string(),
        });
    }

    let level = body.level.unwrap_or(CapabilityLevel::Observe);
    let mut payload = CommandPayload::new(body.command.trim());
    payload.args = body.args;
    payload.level = level;

    let decision = state.engine.evaluate_command_policy(&payload, level).await;
    Ok(Json(decision))
}
