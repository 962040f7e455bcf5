//! Pluggable side-effects around decision recording and approved dispatch.
//!
//! Hooks run in a fixed order after the decision is already recorded; a hook
//! failure is reported with its stage but never rolls the decision back.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

use super::service::ApprovalDecisionResult;

/// Which point in the decide-and-dispatch chain a hook fired at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    DecisionRecorded,
    DispatchComplete,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookStage::DecisionRecorded => write!(f, "decision_recorded"),
            HookStage::DispatchComplete => write!(f, "dispatch_complete"),
        }
    }
}

/// A hook failed in a named stage.
#[derive(Debug, Error)]
#[error("decision hook failed at {stage}: {source}")]
pub struct DecisionHookError {
    pub stage: HookStage,
    #[source]
    pub source: anyhow::Error,
}

/// Side-effect invoked around approval decisions.
#[async_trait]
pub trait DecisionHook: Send + Sync {
    /// Runs after the decision is recorded, for approved and denied alike.
    async fn on_decision_recorded(&self, result: &ApprovalDecisionResult) -> anyhow::Result<()>;

    /// Runs after an approved command was handed to the dispatcher.
    async fn on_approved_dispatch(&self, result: &ApprovalDecisionResult) -> anyhow::Result<()>;
}

/// Default hook: writes the decision trail to the structured log.
pub struct AuditLogHook;

#[async_trait]
impl DecisionHook for AuditLogHook {
    async fn on_decision_recorded(&self, result: &ApprovalDecisionResult) -> anyhow::Result<()> {
        let request = &result.request;
        tracing::info!(
            approval_id = %request.id,
            probe_id = %request.probe_id,
            command = %request.command.command_line(),
            decision = %request.decision,
            decided_by = request.decided_by.as_deref().unwrap_or(""),
            requires_dispatch = result.requires_dispatch,
            "approval decision recorded"
        );
        Ok(())
    }

    async fn on_approved_dispatch(&self, result: &ApprovalDecisionResult) -> anyhow::Result<()> {
        let request = &result.request;
        tracing::info!(
            approval_id = %request.id,
            probe_id = %request.probe_id,
            command = %request.command.command_line(),
            "approved command dispatched"
        );
        Ok(())
    }
}
