//! OpenAPI document assembly.

use utoipa::OpenApi;

use crate::api::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "fleetctl",
        description = "Fleet operations control plane: command dispatch and approval pipeline for remote probe agents."
    ),
    paths(
        handlers::commands::invoke_command,
        handlers::approvals::decide_approval,
        handlers::approvals::list_approvals,
        handlers::approvals::list_pending_approvals,
        handlers::approvals::get_approval,
        handlers::approvals::wait_for_decision,
        handlers::probes::register_probe,
        handlers::probes::list_probes,
        handlers::probes::get_probe,
        handlers::probes::ingest_result,
        handlers::probes::apply_policy,
        handlers::policy::preview_policy,
        handlers::grafana::grafana_status,
        handlers::grafana::grafana_snapshot,
    ),
    components(schemas(
        crate::api::models::approvals::DecideApprovalBody,
        crate::api::models::commands::InvokeCommandRequest,
        crate::api::models::probes::RegisterProbeRequest,
        crate::api::models::probes::ApplyPolicyRequest,
        crate::api::models::probes::PolicyApplicationResponse,
        crate::api::models::probes::IngestResultResponse,
        crate::approvals::models::ApprovalRequest,
        crate::dispatch::models::CommandPayload,
        crate::dispatch::models::CommandResult,
        crate::fleet::store::ProbeState,
        crate::fleet::templates::PolicyTemplate,
        crate::policy::models::CapacitySignals,
        crate::policy::models::CapacityThresholds,
        crate::policy::models::CommandPolicyDecision,
        crate::policy::models::Indicator,
        crate::policy::models::PolicyRationale,
        crate::types::ApprovalDecision,
        crate::types::ApprovalId,
        crate::types::Availability,
        crate::types::CapabilityLevel,
        crate::types::PolicyOutcome,
        crate::types::RiskLevel,
        crate::types::Severity,
    ))
)]
pub struct ApiDoc;
