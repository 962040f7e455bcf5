//! In-memory approval queue.
//!
//! Bounded, time-bounded storage for pending decisions. A single `RwLock`
//! guards the request map: snapshots take the read side, mutations and
//! eviction take the write side, and nothing is ever held across an await.
//! Expiry is lazy: a request past its deadline stays `pending` in memory
//! until the next eviction touches it, but every mutation path evicts first
//! so the window is never observable through the public API.

use crate::dispatch::CommandPayload;
use crate::types::{ApprovalDecision, ApprovalId, RiskLevel};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::models::ApprovalRequest;

/// Errors produced by the approval queue.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("approval queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("approval request {id} not found")]
    NotFound { id: ApprovalId },

    #[error("approval request {id} already {decision}")]
    AlreadyDecided {
        id: ApprovalId,
        decision: ApprovalDecision,
    },

    #[error("approval request {id} expired")]
    Expired { id: ApprovalId },

    #[error("invalid decision {decision}: must be approved or denied")]
    InvalidDecision { decision: ApprovalDecision },

    /// The wait deadline elapsed while the request was still pending. Carries
    /// the snapshot observed at the deadline.
    #[error("timed out waiting for decision on {}", .snapshot.id)]
    DecisionTimeout { snapshot: Box<ApprovalRequest> },
}

/// Tunables for the queue.
#[derive(Debug, Clone)]
pub struct ApprovalQueueConfig {
    /// Maximum number of live (pending, unexpired) requests.
    pub capacity: usize,
    /// How long a request stays decidable after submission.
    pub ttl: Duration,
    /// How long terminal requests are retained for audit listing.
    pub retention: Duration,
    /// Polling cadence for `wait_for_decision`.
    pub poll_interval: Duration,
}

impl Default for ApprovalQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl: Duration::from_secs(600),
            retention: Duration::from_secs(24 * 60 * 60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Bounded in-memory queue of approval requests.
pub struct ApprovalQueue {
    requests: RwLock<HashMap<ApprovalId, ApprovalRequest>>,
    config: ApprovalQueueConfig,
}

impl ApprovalQueue {
    pub fn new(config: ApprovalQueueConfig) -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &ApprovalQueueConfig {
        &self.config
    }

    /// Submit a command for approval.
    ///
    /// Expired entries are evicted first; if the live count is still at
    /// capacity the submission is rejected rather than queued unboundedly.
    pub fn submit(
        &self,
        probe_id: &str,
        command: CommandPayload,
        reason: &str,
        risk: RiskLevel,
        requested_by: &str,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let now = Utc::now();
        let ttl = ChronoDuration::from_std(self.config.ttl).unwrap_or(ChronoDuration::minutes(10));

        let mut requests = self.requests.write().unwrap();
        Self::evict_locked(&mut requests, now, self.config.retention);

        let live = requests.values().filter(|r| r.is_live(now)).count();
        if live >= self.config.capacity {
            return Err(ApprovalError::QueueFull {
                capacity: self.config.capacity,
            });
        }

        let request = ApprovalRequest {
            id: ApprovalId::new(),
            probe_id: probe_id.to_string(),
            command,
            reason: reason.to_string(),
            risk,
            requested_by: requested_by.to_string(),
            decision: ApprovalDecision::Pending,
            decided_by: None,
            decided_at: None,
            created_at: now,
            expires_at: now + ttl,
        };

        tracing::info!(
            approval_id = %request.id,
            probe_id,
            command = %request.command.command_line(),
            risk = %risk,
            requested_by,
            "approval requested"
        );

        requests.insert(request.id, request.clone());
        Ok(request)
    }

    /// Record a terminal decision for a pending request.
    pub fn decide(
        &self,
        id: ApprovalId,
        decision: ApprovalDecision,
        decided_by: &str,
    ) -> Result<ApprovalRequest, ApprovalError> {
        if !matches!(decision, ApprovalDecision::Approved | ApprovalDecision::Denied) {
            return Err(ApprovalError::InvalidDecision { decision });
        }

        let now = Utc::now();
        let mut requests = self.requests.write().unwrap();
        let request = requests.get_mut(&id).ok_or(ApprovalError::NotFound { id })?;

        match request.decision {
            ApprovalDecision::Pending => {}
            ApprovalDecision::Expired => return Err(ApprovalError::Expired { id }),
            decided => return Err(ApprovalError::AlreadyDecided { id, decision: decided }),
        }

        if request.is_past_expiry(now) {
            request.decision = ApprovalDecision::Expired;
            return Err(ApprovalError::Expired { id });
        }

        request.decision = decision;
        request.decided_by = Some(decided_by.to_string());
        request.decided_at = Some(now);

        tracing::info!(
            approval_id = %id,
            decision = %decision,
            decided_by,
            "approval decided"
        );

        Ok(request.clone())
    }

    /// Read-only snapshot of a single request.
    pub fn get(&self, id: ApprovalId) -> Result<ApprovalRequest, ApprovalError> {
        let requests = self.requests.read().unwrap();
        requests.get(&id).cloned().ok_or(ApprovalError::NotFound { id })
    }

    /// Still-pending, unexpired requests, newest first.
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        let now = Utc::now();
        let mut pending: Vec<ApprovalRequest> = {
            let mut requests = self.requests.write().unwrap();
            Self::evict_locked(&mut requests, now, self.config.retention);
            requests
                .values()
                .filter(|r| r.decision == ApprovalDecision::Pending)
                .cloned()
                .collect()
        };
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        pending
    }

    /// All retained requests including terminal ones, newest first, clipped
    /// to `limit`.
    pub fn all(&self, limit: usize) -> Vec<ApprovalRequest> {
        let mut all: Vec<ApprovalRequest> = {
            let requests = self.requests.read().unwrap();
            requests.values().cloned().collect()
        };
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        all
    }

    /// Block until the request reaches a terminal state or the timeout
    /// elapses.
    ///
    /// Returns the terminal snapshot (including `Expired`). On timeout the
    /// error carries the pending snapshot observed at the deadline. Caller
    /// cancellation is deliberately ignored; waiters have only their
    /// deadline and may be retried.
    pub async fn wait_for_decision(
        &self,
        id: ApprovalId,
        timeout: Duration,
    ) -> Result<ApprovalRequest, ApprovalError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let snapshot = self.get(id)?;
            if snapshot.is_terminal() {
                return Ok(snapshot);
            }
            if snapshot.is_past_expiry(Utc::now()) {
                // Nudge the lazy transition so the caller sees `expired`
                // instead of a stale `pending`.
                self.evict();
                return self.get(id);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(ApprovalError::DecisionTimeout {
                    snapshot: Box::new(snapshot),
                });
            }
            let sleep = self.config.poll_interval.min(deadline - now);
            tokio::time::sleep(sleep).await;
        }
    }

    /// One eviction pass: expire overdue pending entries and purge terminal
    /// entries past the retention window. Returns (expired, purged).
    pub fn evict(&self) -> (usize, usize) {
        let now = Utc::now();
        let mut requests = self.requests.write().unwrap();
        Self::evict_locked(&mut requests, now, self.config.retention)
    }

    fn evict_locked(
        requests: &mut HashMap<ApprovalId, ApprovalRequest>,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> (usize, usize) {
        let retention =
            ChronoDuration::from_std(retention).unwrap_or(ChronoDuration::hours(24));

        let mut expired = 0usize;
        for request in requests.values_mut() {
            if request.decision == ApprovalDecision::Pending && request.is_past_expiry(now) {
                request.decision = ApprovalDecision::Expired;
                expired += 1;
                tracing::debug!(approval_id = %request.id, "approval request expired");
            }
        }

        let before = requests.len();
        requests.retain(|_, request| match request.terminal_at() {
            Some(terminal_at) => now - terminal_at <= retention,
            None => true,
        });
        let purged = before - requests.len();

        (expired, purged)
    }

    /// Background reaper: periodically evicts until shutdown.
    pub async fn run_reaper(&self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("approval queue reaper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let (expired, purged) = self.evict();
                    if expired > 0 || purged > 0 {
                        tracing::debug!(expired, purged, "approval queue reaped");
                    }
                }
            }
        }
    }
}
