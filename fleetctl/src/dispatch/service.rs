//! Policy-driven command dispatch.
//!
//! [`DispatchService`] is the single entry point for getting a command onto a
//! probe: it registers the request with the [`CommandTracker`] (when a
//! response is expected), hands the payload to the [`CommandSender`], and
//! waits on the result slot, a timer, and caller cancellation simultaneously.
//! Whatever happens, the caller gets back one [`CommandResultEnvelope`].

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::models::{
    CommandPayload, CommandResult, CommandResultEnvelope, DispatchError, DEFAULT_DISPATCH_TIMEOUT,
};
use super::sender::{CommandSender, MessageType};
use super::tracker::CommandTracker;

/// How a single dispatch should behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// Block until a result arrives (or the wait fails).
    pub wait_for_result: bool,
    /// ORed into the outgoing command's stream flag.
    pub stream_output: bool,
    /// Wait budget; zero falls back to [`DEFAULT_DISPATCH_TIMEOUT`].
    pub timeout: Duration,
    /// Release the tracker entry when the caller goes away. When false the
    /// entry persists so a late probe response is still absorbed.
    pub cancel_on_context_done: bool,
}

impl DispatchPolicy {
    /// Send and wait up to `timeout` for the probe's response.
    pub fn wait(timeout: Duration) -> Self {
        Self {
            wait_for_result: true,
            stream_output: false,
            timeout,
            cancel_on_context_done: true,
        }
    }

    /// Send without waiting for any response.
    pub fn fire_and_forget() -> Self {
        Self {
            wait_for_result: false,
            stream_output: false,
            timeout: Duration::ZERO,
            cancel_on_context_done: false,
        }
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream_output = stream;
        self
    }

    fn normalized(mut self) -> Self {
        if self.timeout.is_zero() {
            self.timeout = DEFAULT_DISPATCH_TIMEOUT;
        }
        self
    }
}

/// Dispatches commands to probes with per-request tracking.
pub struct DispatchService {
    tracker: Arc<CommandTracker>,
    sender: Arc<dyn CommandSender>,
}

impl DispatchService {
    pub fn new(tracker: Arc<CommandTracker>, sender: Arc<dyn CommandSender>) -> Self {
        Self { tracker, sender }
    }

    pub fn tracker(&self) -> &Arc<CommandTracker> {
        &self.tracker
    }

    /// Dispatch `cmd` to `probe_id` under `policy`.
    ///
    /// Never returns an error directly: every outcome, including send
    /// failures, is folded into the envelope so the surface codecs have one
    /// shape to render.
    pub async fn dispatch_with_policy(
        &self,
        ctx: &CancellationToken,
        probe_id: &str,
        mut cmd: CommandPayload,
        policy: DispatchPolicy,
    ) -> CommandResultEnvelope {
        let policy = policy.normalized();
        cmd.ensure_request_id();
        cmd.stream = cmd.stream || policy.stream_output;
        let request_id = cmd.request_id.clone();

        let payload = match serde_json::to_value(&cmd) {
            Ok(payload) => payload,
            Err(e) => {
                return CommandResultEnvelope::dispatch_error(request_id, DispatchError::Send(e.into()));
            }
        };

        if !policy.wait_for_result {
            return match self.sender.send_to(probe_id, MessageType::Command, payload).await {
                Ok(()) => {
                    tracing::debug!(request_id = %request_id, probe_id, command = %cmd.command, "command dispatched");
                    CommandResultEnvelope::dispatched(request_id)
                }
                Err(e) => {
                    tracing::warn!(request_id = %request_id, probe_id, error = %e, "command dispatch failed");
                    CommandResultEnvelope::dispatch_error(request_id, e.into())
                }
            };
        }

        // Track before sending so the probe's response always has a slot,
        // even if it answers faster than we get back here.
        let mut pending = self.tracker.track(&request_id, probe_id, &cmd.command, cmd.level);

        if let Err(e) = self.sender.send_to(probe_id, MessageType::Command, payload).await {
            self.tracker.cancel(&request_id);
            tracing::warn!(request_id = %request_id, probe_id, error = %e, "command dispatch failed");
            return CommandResultEnvelope::dispatch_error(request_id, e.into());
        }

        tracing::debug!(
            request_id = %request_id,
            probe_id,
            command = %cmd.command,
            timeout = ?policy.timeout,
            "command dispatched; waiting for result"
        );

        tokio::select! {
            result = pending.wait() => match result {
                Some(result) => {
                    tracing::debug!(request_id = %request_id, exit_code = result.exit_code, "command completed");
                    CommandResultEnvelope::completed(request_id, Some(result))
                }
                // Slot closed underneath us: someone canceled the entry.
                None => CommandResultEnvelope::canceled(request_id, true),
            },
            _ = tokio::time::sleep(policy.timeout) => {
                self.tracker.cancel(&request_id);
                tracing::warn!(request_id = %request_id, probe_id, timeout = ?policy.timeout, "timed out waiting for probe response");
                CommandResultEnvelope::timeout(request_id)
            }
            _ = ctx.cancelled() => {
                if policy.cancel_on_context_done {
                    self.tracker.cancel(&request_id);
                }
                tracing::debug!(request_id = %request_id, probe_id, "caller canceled while waiting for result");
                CommandResultEnvelope::canceled(request_id, true)
            }
        }
    }

    /// Dispatch and wait, unwrapping the envelope into a plain result.
    pub async fn dispatch_and_wait(
        &self,
        ctx: &CancellationToken,
        probe_id: &str,
        cmd: CommandPayload,
        timeout: Duration,
    ) -> Result<CommandResult, DispatchError> {
        let envelope = self
            .dispatch_with_policy(ctx, probe_id, cmd, DispatchPolicy::wait(timeout))
            .await;
        match (envelope.result, envelope.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(error),
            (None, None) => Err(DispatchError::EmptyResult),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::models::DispatchState;
    use crate::dispatch::sender::SendError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Sender that records every outgoing message and can be told to fail.
    struct RecordingSender {
        sent: Mutex<Vec<(String, MessageType, serde_json::Value)>>,
        fail: bool,
    }

    impl RecordingSender {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn sent(&self) -> Vec<(String, MessageType, serde_json::Value)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandSender for RecordingSender {
        async fn send_to(
            &self,
            probe_id: &str,
            message_type: MessageType,
            payload: serde_json::Value,
        ) -> Result<(), SendError> {
            if self.fail {
                return Err(SendError::NotConnected {
                    probe_id: probe_id.to_string(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((probe_id.to_string(), message_type, payload));
            Ok(())
        }
    }

    fn service_with(sender: Arc<RecordingSender>) -> (DispatchService, Arc<CommandTracker>) {
        let tracker = Arc::new(CommandTracker::new());
        (DispatchService::new(tracker.clone(), sender), tracker)
    }

    fn result_for(request_id: &str, stdout: &str) -> CommandResult {
        CommandResult {
            request_id: request_id.to_string(),
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_fire_and_forget_sets_stream_flag() {
        let sender = RecordingSender::new();
        let (service, tracker) = service_with(sender.clone());
        let ctx = CancellationToken::new();

        let envelope = service
            .dispatch_with_policy(
                &ctx,
                "probe-a",
                CommandPayload::new("journalctl"),
                DispatchPolicy::fire_and_forget().with_stream(true),
            )
            .await;

        assert_eq!(envelope.state, DispatchState::Dispatched);
        assert!(envelope.dispatched);
        assert!(envelope.result.is_none() && envelope.error.is_none());
        assert_eq!(tracker.in_flight(), 0, "no tracking without a wait");

        let sent = sender.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "probe-a");
        assert_eq!(sent[0].1, MessageType::Command);
        assert_eq!(sent[0].2["stream"], serde_json::Value::Bool(true));
    }

    #[tokio::test]
    async fn test_send_failure_without_wait() {
        let (service, _) = service_with(RecordingSender::failing());
        let ctx = CancellationToken::new();

        let envelope = service
            .dispatch_with_policy(
                &ctx,
                "probe-a",
                CommandPayload::new("uptime"),
                DispatchPolicy::fire_and_forget(),
            )
            .await;

        assert_eq!(envelope.state, DispatchState::DispatchError);
        assert!(!envelope.dispatched);
    }

    #[tokio::test]
    async fn test_send_failure_releases_tracking() {
        let (service, tracker) = service_with(RecordingSender::failing());
        let ctx = CancellationToken::new();

        let envelope = service
            .dispatch_with_policy(
                &ctx,
                "probe-a",
                CommandPayload::new("uptime"),
                DispatchPolicy::wait(Duration::from_secs(1)),
            )
            .await;

        assert_eq!(envelope.state, DispatchState::DispatchError);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_wait_receives_completed_result() {
        let sender = RecordingSender::new();
        let (service, tracker) = service_with(sender);
        let service = Arc::new(service);
        let ctx = CancellationToken::new();

        let mut cmd = CommandPayload::new("uptime");
        cmd.request_id = "cmd-42".to_string();

        let completer = tracker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            completer.complete("cmd-42", result_for("cmd-42", "up 3 days"));
        });

        let envelope = service
            .dispatch_with_policy(&ctx, "probe-a", cmd, DispatchPolicy::wait(Duration::from_secs(2)))
            .await;

        assert_eq!(envelope.state, DispatchState::Completed);
        assert!(envelope.dispatched);
        assert_eq!(envelope.result.unwrap().stdout, "up 3 days");
        assert_eq!(tracker.in_flight(), 0, "completed entries are gone");
    }

    #[tokio::test]
    async fn test_timeout_cancels_tracking() {
        let sender = RecordingSender::new();
        let (service, tracker) = service_with(sender);
        let ctx = CancellationToken::new();

        let envelope = service
            .dispatch_with_policy(
                &ctx,
                "probe-a",
                CommandPayload::new("uptime"),
                DispatchPolicy::wait(Duration::from_millis(15)),
            )
            .await;

        assert_eq!(envelope.state, DispatchState::Timeout);
        assert!(envelope.dispatched);
        assert!(matches!(envelope.error, Some(DispatchError::Timeout)));
        assert_eq!(tracker.in_flight(), 0);

        let body = envelope.http_error().unwrap();
        assert_eq!(body.status, 504);
        assert_eq!(body.code, "timeout");
    }

    #[tokio::test]
    async fn test_caller_cancel_keeps_entry_when_configured() {
        let sender = RecordingSender::new();
        let (service, tracker) = service_with(sender);
        let ctx = CancellationToken::new();
        ctx.cancel();

        let mut policy = DispatchPolicy::wait(Duration::from_secs(5));
        policy.cancel_on_context_done = false;

        let mut cmd = CommandPayload::new("uptime");
        cmd.request_id = "cmd-7".to_string();

        let envelope = service.dispatch_with_policy(&ctx, "probe-a", cmd, policy).await;

        assert_eq!(envelope.state, DispatchState::Canceled);
        assert!(matches!(envelope.error, Some(DispatchError::Canceled)));
        assert_eq!(tracker.in_flight(), 1, "entry persists for the late probe response");

        tracker.cancel("cmd-7");
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_caller_cancel_releases_entry_by_default() {
        let sender = RecordingSender::new();
        let (service, tracker) = service_with(sender);
        let ctx = CancellationToken::new();
        ctx.cancel();

        let envelope = service
            .dispatch_with_policy(
                &ctx,
                "probe-a",
                CommandPayload::new("uptime"),
                DispatchPolicy::wait(Duration::from_secs(5)),
            )
            .await;

        assert_eq!(envelope.state, DispatchState::Canceled);
        assert_eq!(tracker.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_and_wait_unwraps() {
        let sender = RecordingSender::new();
        let (service, tracker) = service_with(sender);
        let ctx = CancellationToken::new();

        let mut cmd = CommandPayload::new("hostname");
        cmd.request_id = "cmd-9".to_string();

        let completer = tracker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            completer.complete("cmd-9", result_for("cmd-9", "web-01"));
        });

        let result = service
            .dispatch_and_wait(&ctx, "probe-a", cmd, Duration::from_secs(2))
            .await
            .expect("should resolve");
        assert_eq!(result.stdout, "web-01");
    }

    #[tokio::test]
    async fn test_zero_timeout_defaults() {
        let policy = DispatchPolicy::wait(Duration::ZERO).normalized();
        assert_eq!(policy.timeout, DEFAULT_DISPATCH_TIMEOUT);
    }
}
