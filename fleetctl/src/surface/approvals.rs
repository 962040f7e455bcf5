//! Envelope codec for the approval decide flow.
//!
//! One projection, one builder, one registry: HTTP and MCP render the same
//! decide outcome with identical semantics.

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::approvals::models::ApprovalRequest;
use crate::approvals::service::{ApprovalDecisionResult, ServiceError};

use super::envelope::{write_for_surface, HttpErrorBody, ResponseEnvelope, Surface, WriterKernel};
use super::registry::{dispatch_for_surface, unsupported_surface, PolicyRegistry};

/// Success body shared by every surface: the recorded decision plus a full
/// request snapshot.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DecideApprovalSuccess {
    pub status: String,
    pub request: ApprovalRequest,
}

/// Domain projection of a decide attempt.
#[derive(Debug)]
pub enum DecideApprovalProjection {
    Success(DecideApprovalSuccess),
    Error(HttpErrorBody),
}

impl DecideApprovalProjection {
    pub fn from_result(result: &ApprovalDecisionResult) -> Self {
        Self::Success(DecideApprovalSuccess {
            status: result.request.decision.to_string(),
            request: result.request.clone(),
        })
    }

    pub fn from_error(err: &ServiceError) -> Self {
        Self::Error(project_service_error(err))
    }

    /// The request body could not be parsed at all.
    pub fn invalid_body() -> Self {
        Self::Error(HttpErrorBody::new(400, "invalid_request", "invalid request body"))
    }

    /// The request body parsed but is missing required fields.
    pub fn missing_fields() -> Self {
        Self::Error(HttpErrorBody::new(
            400,
            "invalid_request",
            "decision and decided_by are required",
        ))
    }
}

/// Map an orchestration error onto the HTTP error contract for this flow.
///
/// Queue errors are the caller's problem (400); a dispatch failure after a
/// recorded approval is an upstream failure (502); hook failures are ours
/// (500).
pub fn project_service_error(err: &ServiceError) -> HttpErrorBody {
    match err {
        ServiceError::Approval(e) => HttpErrorBody::new(400, "invalid_request", e.to_string()),
        ServiceError::ApprovedDispatch { .. } => {
            HttpErrorBody::new(502, "bad_gateway", err.to_string())
        }
        ServiceError::Hook(e) => HttpErrorBody::new(500, "internal_error", e.to_string()),
        ServiceError::ProbeNotFound { .. } | ServiceError::PolicyTemplateNotFound { .. } => {
            HttpErrorBody::new(404, "not_found", err.to_string())
        }
    }
}

/// Build the envelope from the projection. Both surface payloads are
/// populated; [`write_for_surface`] picks the right side. Unknown surfaces
/// never reach the builder: the registry resolves them to the shared
/// fallback first.
pub fn build_decide_envelope(projection: &DecideApprovalProjection) -> ResponseEnvelope {
    match projection {
        DecideApprovalProjection::Success(success) => {
            let payload = json!(success);
            ResponseEnvelope {
                http_success: Some(payload.clone()),
                mcp_success: Some(payload),
                ..Default::default()
            }
        }
        DecideApprovalProjection::Error(error) => ResponseEnvelope {
            http_error: Some(error.clone()),
            mcp_error: Some(error.message.clone()),
            ..Default::default()
        },
    }
}

type DecidePolicy = fn(&DecideApprovalProjection, &WriterKernel) -> bool;

static DECIDE_REGISTRY: Lazy<PolicyRegistry<DecidePolicy>> = Lazy::new(|| {
    PolicyRegistry::new()
        .register(
            Surface::Http,
            (|projection, kernel| {
                let envelope = build_decide_envelope(projection);
                write_for_surface(&Surface::Http, &envelope, kernel)
            }) as DecidePolicy,
        )
        .register(
            Surface::Mcp,
            (|projection, kernel| {
                let envelope = build_decide_envelope(projection);
                write_for_surface(&Surface::Mcp, &envelope, kernel)
            }) as DecidePolicy,
        )
});

/// Render a decide projection on a surface through the shared registry.
pub fn render_decide(
    surface: &Surface,
    projection: &DecideApprovalProjection,
    kernel: &WriterKernel,
) -> bool {
    dispatch_for_surface(&DECIDE_REGISTRY, surface, projection, kernel, |surface, kernel| {
        unsupported_surface("approval decision", surface, kernel)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approvals::queue::ApprovalError;
    use crate::dispatch::CommandPayload;
    use crate::types::{ApprovalDecision, ApprovalId, RiskLevel};
    use chrono::Utc;
    use serde_json::Value;
    use std::cell::RefCell;

    fn decided_request() -> ApprovalDecisionResult {
        let now = Utc::now();
        ApprovalDecisionResult {
            request: ApprovalRequest {
                id: ApprovalId::new(),
                probe_id: "probe-a".to_string(),
                command: CommandPayload::new("reboot"),
                reason: "kernel update".to_string(),
                risk: RiskLevel::Critical,
                requested_by: "oncall".to_string(),
                decision: ApprovalDecision::Approved,
                decided_by: Some("keith".to_string()),
                decided_at: Some(now),
                created_at: now,
                expires_at: now + chrono::Duration::minutes(10),
            },
            requires_dispatch: true,
        }
    }

    #[test]
    fn test_success_renders_same_payload_on_both_surfaces() {
        let projection = DecideApprovalProjection::from_result(&decided_request());

        let http = RefCell::new(None::<Value>);
        let kernel = WriterKernel::http(|_| {}, |v| *http.borrow_mut() = Some(v.clone()));
        assert!(!render_decide(&Surface::Http, &projection, &kernel));
        drop(kernel);

        let mcp = RefCell::new(None::<Value>);
        let kernel = WriterKernel::mcp(|_| {}, |v| *mcp.borrow_mut() = Some(v.clone()));
        assert!(!render_decide(&Surface::Mcp, &projection, &kernel));
        drop(kernel);

        let http = http.into_inner().unwrap();
        let mcp = mcp.into_inner().unwrap();
        assert_eq!(http, mcp, "identical semantics across surfaces");
        assert_eq!(http["status"], "approved");
        assert_eq!(http["request"]["decided_by"], "keith");
    }

    #[test]
    fn test_queue_error_maps_to_invalid_request() {
        let err = ServiceError::Approval(ApprovalError::NotFound {
            id: ApprovalId::new(),
        });
        let projection = DecideApprovalProjection::from_error(&err);

        match &projection {
            DecideApprovalProjection::Error(body) => {
                assert_eq!(body.status, 400);
                assert_eq!(body.code, "invalid_request");
                assert!(body.message.contains("not found"));
            }
            other => panic!("expected error projection, got {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_failure_maps_to_bad_gateway() {
        let err = ServiceError::ApprovedDispatch {
            source: anyhow::anyhow!("probe probe-a not connected"),
        };
        let body = project_service_error(&err);
        assert_eq!(body.status, 502);
        assert_eq!(body.code, "bad_gateway");
        assert_eq!(
            body.message,
            "approved but dispatch failed: probe probe-a not connected"
        );
    }

    #[test]
    fn test_error_mcp_side_is_the_message() {
        let projection = DecideApprovalProjection::missing_fields();
        let envelope = build_decide_envelope(&projection);
        assert_eq!(
            envelope.mcp_error.as_deref(),
            Some("decision and decided_by are required")
        );
    }

    #[test]
    fn test_registry_dispatch_matches_direct_codec() {
        let projection = DecideApprovalProjection::from_result(&decided_request());

        let direct = build_decide_envelope(&projection);
        let via_registry = RefCell::new(None::<Value>);
        let kernel = WriterKernel::http(|_| {}, |v| *via_registry.borrow_mut() = Some(v.clone()));
        render_decide(&Surface::Http, &projection, &kernel);
        drop(kernel);

        assert_eq!(direct.http_success, via_registry.into_inner());
    }

    #[test]
    fn test_unknown_surface_is_rejected_with_scope() {
        let projection = DecideApprovalProjection::from_result(&decided_request());
        let errors = RefCell::new(Vec::new());
        let kernel = WriterKernel {
            write_http_error: Some(Box::new(|e: &HttpErrorBody| {
                errors.borrow_mut().push(e.message.clone())
            })),
            ..Default::default()
        };
        assert!(render_decide(
            &Surface::Other("grpc".to_string()),
            &projection,
            &kernel
        ));
        drop(kernel);
        assert_eq!(
            errors.into_inner(),
            vec!["unsupported approval decision surface \"grpc\""]
        );
    }
}
