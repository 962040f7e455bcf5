//! Orchestration of the approval pipeline.
//!
//! [`ApprovalPolicyService`] composes the queue, the risk classifier, the
//! fleet and policy-template stores, and the decision hook chain. It owns the
//! decide-and-dispatch sequencing: record the decision, run the decision
//! hook, dispatch if approved, run the dispatch hook, failing fast at each
//! step without un-recording anything.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::dispatch::CommandPayload;
use crate::fleet::store::FleetStore;
use crate::fleet::templates::{PolicyTemplate, PolicyTemplateStore};
use crate::types::{ApprovalDecision, ApprovalId, CapabilityLevel, RiskLevel};

use super::hooks::{DecisionHook, DecisionHookError, HookStage};
use super::models::ApprovalRequest;
use super::queue::{ApprovalError, ApprovalQueue};
use super::risk::{classify_risk, needs_approval};

/// Errors produced by the orchestration layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error("probe {id} not found")]
    ProbeNotFound { id: String },

    #[error("policy template {id} not found")]
    PolicyTemplateNotFound { id: String },

    /// The decision was recorded and is final, but handing the approved
    /// command to the dispatcher failed.
    #[error("approved but dispatch failed: {source}")]
    ApprovedDispatch {
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Hook(#[from] DecisionHookError),
}

/// Outcome of recording a decision.
#[derive(Debug, Clone)]
pub struct ApprovalDecisionResult {
    pub request: ApprovalRequest,
    /// True when the decision was an approval and the stored command is
    /// present, i.e. there is something to dispatch.
    pub requires_dispatch: bool,
}

/// Outcome of applying a policy template to a probe.
#[derive(Debug, Clone)]
pub struct PolicyApplication {
    pub template: PolicyTemplate,
    /// False when the template was stored but the push to the probe failed;
    /// that is a partial success, not an error.
    pub pushed: bool,
}

/// Convenience for callers that apply a template without pushing it.
pub const NO_PUSH: Option<fn(String, serde_json::Value) -> std::future::Ready<anyhow::Result<()>>> =
    None;

/// Composes queue, classifier, stores, and hooks into the approval pipeline.
pub struct ApprovalPolicyService {
    queue: Arc<ApprovalQueue>,
    fleet: Arc<FleetStore>,
    templates: Arc<PolicyTemplateStore>,
    hooks: Vec<Arc<dyn DecisionHook>>,
}

impl ApprovalPolicyService {
    pub fn new(
        queue: Arc<ApprovalQueue>,
        fleet: Arc<FleetStore>,
        templates: Arc<PolicyTemplateStore>,
        hooks: Vec<Arc<dyn DecisionHook>>,
    ) -> Self {
        Self {
            queue,
            fleet,
            templates,
            hooks,
        }
    }

    pub fn queue(&self) -> &Arc<ApprovalQueue> {
        &self.queue
    }

    pub fn templates(&self) -> &Arc<PolicyTemplateStore> {
        &self.templates
    }

    /// Submit a command for approval when its risk calls for one.
    ///
    /// Returns `Ok(None)` when the command can run without a human decision.
    pub fn submit_command_approval(
        &self,
        probe_id: &str,
        command: CommandPayload,
        probe_level: CapabilityLevel,
        reason: &str,
        requested_by: &str,
    ) -> Result<Option<ApprovalRequest>, ServiceError> {
        let risk = classify_risk(&command.command, &command.args, probe_level);
        if !needs_approval(risk) {
            return Ok(None);
        }
        let request = self.queue.submit(probe_id, command, reason, risk, requested_by)?;
        Ok(Some(request))
    }

    /// Queue a command for approval unconditionally, at the given risk.
    ///
    /// Used when the capacity policy engine chose `queue` for reasons beyond
    /// the command's own risk.
    pub fn queue_command(
        &self,
        probe_id: &str,
        command: CommandPayload,
        risk: RiskLevel,
        reason: &str,
        requested_by: &str,
    ) -> Result<ApprovalRequest, ServiceError> {
        Ok(self.queue.submit(probe_id, command, reason, risk, requested_by)?)
    }

    pub async fn wait_for_decision(
        &self,
        id: ApprovalId,
        timeout: Duration,
    ) -> Result<ApprovalRequest, ServiceError> {
        Ok(self.queue.wait_for_decision(id, timeout).await?)
    }

    /// Record a decision and work out whether it needs a dispatch.
    pub fn decide_approval(
        &self,
        id: ApprovalId,
        decision: ApprovalDecision,
        decided_by: &str,
    ) -> Result<ApprovalDecisionResult, ServiceError> {
        let request = self.queue.decide(id, decision, decided_by)?;
        let requires_dispatch =
            decision == ApprovalDecision::Approved && !request.command.command.is_empty();
        Ok(ApprovalDecisionResult {
            request,
            requires_dispatch,
        })
    }

    /// Hand an approved command to `dispatch_fn`; a no-op unless the decision
    /// requires a dispatch.
    pub async fn dispatch_approved_command<F, Fut>(
        &self,
        result: &ApprovalDecisionResult,
        dispatch_fn: F,
    ) -> Result<(), ServiceError>
    where
        F: FnOnce(String, CommandPayload) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        if !result.requires_dispatch {
            return Ok(());
        }
        dispatch_fn(result.request.probe_id.clone(), result.request.command.clone())
            .await
            .map_err(|source| ServiceError::ApprovedDispatch { source })
    }

    /// The full chain: record, hook, dispatch, hook.
    ///
    /// For approved decisions the invocation order is
    /// `[hook:decision_recorded, dispatch_fn, hook:dispatch_complete]`; denied
    /// decisions run only the decision hook. Each step fails fast, and a
    /// recorded decision stays recorded whatever happens afterwards.
    pub async fn decide_and_dispatch<F, Fut>(
        &self,
        id: ApprovalId,
        decision: ApprovalDecision,
        decided_by: &str,
        dispatch_fn: F,
    ) -> Result<ApprovalDecisionResult, ServiceError>
    where
        F: FnOnce(String, CommandPayload) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let result = self.decide_approval(id, decision, decided_by)?;

        self.run_hooks(HookStage::DecisionRecorded, &result).await?;
        self.dispatch_approved_command(&result, dispatch_fn).await?;
        if result.requires_dispatch {
            self.run_hooks(HookStage::DispatchComplete, &result).await?;
        }

        Ok(result)
    }

    /// Look up a policy template and apply it to a probe.
    ///
    /// The capability level is stored in the fleet store first; when a
    /// `push_fn` is supplied its failure is reported as `pushed: false`
    /// rather than an error; the policy is in effect even if the probe has
    /// not heard about it yet.
    pub async fn apply_policy_template<F, Fut>(
        &self,
        probe_id: &str,
        policy_id: &str,
        push_fn: Option<F>,
    ) -> Result<PolicyApplication, ServiceError>
    where
        F: FnOnce(String, serde_json::Value) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        if self.fleet.get(probe_id).is_none() {
            return Err(ServiceError::ProbeNotFound {
                id: probe_id.to_string(),
            });
        }
        let template = self
            .templates
            .get(policy_id)
            .ok_or_else(|| ServiceError::PolicyTemplateNotFound {
                id: policy_id.to_string(),
            })?;

        self.fleet
            .set_policy(probe_id, template.level)
            .map_err(|_| ServiceError::ProbeNotFound {
                id: probe_id.to_string(),
            })?;

        let mut pushed = false;
        if let Some(push) = push_fn {
            match push(probe_id.to_string(), template.to_policy()).await {
                Ok(()) => pushed = true,
                Err(e) => {
                    tracing::warn!(
                        probe_id,
                        policy_id,
                        error = %e,
                        "policy stored but push to probe failed"
                    );
                }
            }
        }

        Ok(PolicyApplication { template, pushed })
    }

    async fn run_hooks(
        &self,
        stage: HookStage,
        result: &ApprovalDecisionResult,
    ) -> Result<(), DecisionHookError> {
        for hook in &self.hooks {
            let outcome = match stage {
                HookStage::DecisionRecorded => hook.on_decision_recorded(result).await,
                HookStage::DispatchComplete => hook.on_approved_dispatch(result).await,
            };
            outcome.map_err(|source| DecisionHookError { stage, source })?;
        }
        Ok(())
    }
}
