//! The approval pipeline: bounded queue, risk classification, decision
//! hooks, and the orchestration service that ties them together.

pub mod hooks;
pub mod models;
pub mod queue;
pub mod risk;
pub mod service;

pub use hooks::{AuditLogHook, DecisionHook, DecisionHookError, HookStage};
pub use models::ApprovalRequest;
pub use queue::{ApprovalError, ApprovalQueue, ApprovalQueueConfig};
pub use risk::{classify_risk, needs_approval};
pub use service::{
    ApprovalDecisionResult, ApprovalPolicyService, PolicyApplication, ServiceError, NO_PUSH,
};
