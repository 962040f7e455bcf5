//! Data models for command dispatch.
//!
//! A [`CommandPayload`] travels to a probe, a [`CommandResult`] comes back,
//! and every dispatch attempt is summarized in a [`CommandResultEnvelope`]
//! that the surface codecs render to HTTP or MCP.

use crate::surface::envelope::HttpErrorBody;
use crate::types::CapabilityLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use utoipa::ToSchema;

/// Default time to wait for a probe response when the caller does not pick one.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

fn default_command_timeout() -> Duration {
    DEFAULT_DISPATCH_TIMEOUT
}

/// A shell-style command sent to a probe agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CommandPayload {
    /// Unique per-in-flight-dispatch id; auto-generated when left empty.
    #[serde(default)]
    pub request_id: String,
    /// The command binary or builtin to run.
    pub command: String,
    /// Arguments passed to the command.
    #[serde(default)]
    pub args: Vec<String>,
    /// Capability level the command claims to need.
    #[serde(default)]
    pub level: CapabilityLevel,
    /// Whether the probe should stream output as it is produced.
    #[serde(default)]
    pub stream: bool,
    /// Per-command execution timeout on the probe side.
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    #[schema(value_type = String, example = "30s")]
    pub timeout: Duration,
}

impl CommandPayload {
    /// Create a payload for `command` with an empty argument list.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            request_id: String::new(),
            command: command.into(),
            args: Vec::new(),
            level: CapabilityLevel::Observe,
            stream: false,
            timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }

    /// Fill in a generated request id if the caller did not supply one.
    ///
    /// Generated ids have the form `cmd-<n>` where `n` is the current unix
    /// nanosecond clock modulo 100000.
    pub fn ensure_request_id(&mut self) {
        if self.request_id.is_empty() {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            self.request_id = format!("cmd-{}", nanos % 100000);
        }
    }

    /// The full command line, space-joined, as a human would read it.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// The outcome of executing a command on a probe.
///
/// Exit code 0 signifies success; anything non-zero is a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CommandResult {
    /// Matches the request id of the originating [`CommandPayload`].
    pub request_id: String,
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub completed_at: DateTime<Utc>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Render a command result as display text.
///
/// Uses trimmed stdout, falling back to trimmed stderr, falling back to a
/// synthetic completion line. Failed commands get an `exit_code=` prefix so
/// the failure is visible even when the probe wrote output.
pub fn result_text(result: &CommandResult) -> String {
    let mut body = result.stdout.trim().to_string();
    if body.is_empty() {
        body = result.stderr.trim().to_string();
    }
    if body.is_empty() {
        body = format!("command completed with exit_code={}", result.exit_code);
    }
    if result.exit_code != 0 {
        format!("exit_code={}\n{}", result.exit_code, body)
    } else {
        body
    }
}

/// Where a dispatch attempt ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    /// Sent without waiting; no result expected through this envelope.
    Dispatched,
    Completed,
    Timeout,
    Canceled,
    DispatchError,
    ResultError,
}

/// Errors produced by the dispatch pipeline.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("timeout waiting for probe response")]
    Timeout,

    #[error("command canceled")]
    Canceled,

    #[error("empty result from probe")]
    EmptyResult,

    /// The send to the probe itself failed.
    #[error("{0}")]
    Send(#[from] crate::dispatch::sender::SendError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Normalized outcome of a single dispatch attempt.
///
/// For terminal states exactly one of `result` / `error` is set; a plain
/// `Dispatched` envelope carries neither.
#[derive(Debug)]
pub struct CommandResultEnvelope {
    pub request_id: String,
    pub state: DispatchState,
    /// True once the send to the probe succeeded, even if waiting failed later.
    pub dispatched: bool,
    pub result: Option<CommandResult>,
    pub error: Option<DispatchError>,
}

impl CommandResultEnvelope {
    /// Fire-and-forget send succeeded.
    pub fn dispatched(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            state: DispatchState::Dispatched,
            dispatched: true,
            result: None,
            error: None,
        }
    }

    /// A result arrived. A missing result on this path is coerced to
    /// [`DispatchState::ResultError`] so callers never observe a completed
    /// envelope with nothing in it.
    pub fn completed(request_id: impl Into<String>, result: Option<CommandResult>) -> Self {
        let request_id = request_id.into();
        match result {
            Some(result) => Self {
                request_id,
                state: DispatchState::Completed,
                dispatched: true,
                result: Some(result),
                error: None,
            },
            None => Self {
                request_id,
                state: DispatchState::ResultError,
                dispatched: true,
                result: None,
                error: Some(DispatchError::EmptyResult),
            },
        }
    }

    pub fn timeout(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            state: DispatchState::Timeout,
            dispatched: true,
            result: None,
            error: Some(DispatchError::Timeout),
        }
    }

    pub fn canceled(request_id: impl Into<String>, dispatched: bool) -> Self {
        Self {
            request_id: request_id.into(),
            state: DispatchState::Canceled,
            dispatched,
            result: None,
            error: Some(DispatchError::Canceled),
        }
    }

    pub fn dispatch_error(request_id: impl Into<String>, error: DispatchError) -> Self {
        Self {
            request_id: request_id.into(),
            state: DispatchState::DispatchError,
            dispatched: false,
            result: None,
            error: Some(error),
        }
    }

    /// Map the envelope's error, if any, onto the HTTP error contract.
    ///
    /// Timeouts map to 504; caller cancellation suppresses the write entirely
    /// (the client is already gone); everything else is a 502 upstream
    /// failure.
    pub fn http_error(&self) -> Option<HttpErrorBody> {
        let error = self.error.as_ref()?;
        Some(match error {
            DispatchError::Timeout => {
                HttpErrorBody::new(504, "timeout", "timeout waiting for probe response")
            }
            DispatchError::Canceled => HttpErrorBody::suppressed(),
            other => HttpErrorBody::new(502, "bad_gateway", other.to_string()),
        })
    }

    /// Map the envelope's error, if any, onto the MCP error contract.
    ///
    /// Timeout, cancellation, and empty-result errors pass through unchanged;
    /// anything else is wrapped with dispatch context.
    pub fn mcp_error(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        Some(match error {
            DispatchError::Timeout | DispatchError::Canceled | DispatchError::EmptyResult => {
                error.to_string()
            }
            other => format!("dispatch command: {other}"),
        })
    }
}
