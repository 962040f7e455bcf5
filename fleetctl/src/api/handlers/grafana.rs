//! Read-only endpoints over the capacity signal provider.

use axum::extract::State;
use axum::Json;
use serde_json::json;

use crate::errors::Error;
use crate::policy::models::CapacitySignals;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/grafana/status",
    tag = "grafana",
    summary = "Capacity source status summary",
    responses(
        (status = 200, description = "Availability summary"),
        (status = 503, description = "Capacity signals unavailable"),
    )
)]
pub async fn grafana_status(State(state): State<AppState>) -> Result<Json<serde_json::Value>, Error> {
    let signals = read_signals(&state).await?;
    Ok(Json(json!({
        "source": signals.source,
        "availability": signals.availability,
        "datasource_count": signals.datasource_count,
        "partial": signals.partial,
    })))
}

#[utoipa::path(
    get,
    path = "/grafana/snapshot",
    tag = "grafana",
    summary = "Full capacity snapshot",
    responses(
        (status = 200, description = "Capacity snapshot", body = CapacitySignals),
        (status = 503, description = "Capacity signals unavailable"),
    )
)]
pub async fn grafana_snapshot(State(state): State<AppState>) -> Result<Json<CapacitySignals>, Error> {
    Ok(Json(read_signals(&state).await?))
}

async fn read_signals(state: &AppState) -> Result<CapacitySignals, Error> {
    match state.signals.capacity_signals().await {
        Ok(Some(signals)) => Ok(signals),
        Ok(None) => Err(Error::Unavailable {
            message: "capacity signals unavailable".to_string(),
        }),
        Err(e) => Err(Error::Unavailable {
            message: e.to_string(),
        }),
    }
}
