//! Envelope codec for the command invoke flow.

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use crate::dispatch::models::{result_text, CommandResultEnvelope};

use super::envelope::{write_for_surface, HttpErrorBody, ResponseEnvelope, Surface, WriterKernel};
use super::registry::{dispatch_for_surface, unsupported_surface, PolicyRegistry};

/// Domain projection of a dispatch attempt.
///
/// A missing envelope means the dispatcher never produced one; rendered as
/// an upstream failure on every surface.
#[derive(Debug)]
pub struct CommandInvokeProjection {
    pub envelope: Option<CommandResultEnvelope>,
    pub wait_for_result: bool,
}

impl CommandInvokeProjection {
    pub fn new(envelope: CommandResultEnvelope, wait_for_result: bool) -> Self {
        Self {
            envelope: Some(envelope),
            wait_for_result,
        }
    }

    pub fn missing() -> Self {
        Self {
            envelope: None,
            wait_for_result: false,
        }
    }
}

/// Build the envelope from the projection. Both surface payloads are
/// populated; [`write_for_surface`] picks the right side. Unknown surfaces
/// never reach the builder: the registry resolves them to the shared
/// fallback first.
pub fn build_command_envelope(projection: &CommandInvokeProjection) -> ResponseEnvelope {
    let Some(core) = &projection.envelope else {
        return ResponseEnvelope {
            http_error: Some(HttpErrorBody::new(502, "bad_gateway", "command dispatch failed")),
            mcp_error: Some("empty result from probe".to_string()),
            ..Default::default()
        };
    };

    let mut envelope = ResponseEnvelope {
        http_error: core.http_error(),
        mcp_error: core.mcp_error(),
        ..Default::default()
    };

    if envelope.http_error.is_none() {
        envelope.http_success = match &core.result {
            Some(result) => Some(json!(result)),
            None if !projection.wait_for_result => Some(json!({
                "status": "dispatched",
                "request_id": core.request_id,
            })),
            // A waited dispatch without result or error should not happen;
            // surface it as the generic upstream failure.
            None => {
                envelope.http_error =
                    Some(HttpErrorBody::new(502, "bad_gateway", "command dispatch failed"));
                None
            }
        };
    }

    if envelope.mcp_error.is_none() {
        envelope.mcp_success = match &core.result {
            Some(result) => Some(Value::String(result_text(result))),
            None => {
                envelope.mcp_error = Some("empty result from probe".to_string());
                None
            }
        };
    }

    envelope
}

type CommandPolicy = fn(&CommandInvokeProjection, &WriterKernel) -> bool;

static COMMAND_REGISTRY: Lazy<PolicyRegistry<CommandPolicy>> = Lazy::new(|| {
    PolicyRegistry::new()
        .register(
            Surface::Http,
            (|projection, kernel| {
                let envelope = build_command_envelope(projection);
                write_for_surface(&Surface::Http, &envelope, kernel)
            }) as CommandPolicy,
        )
        .register(
            Surface::Mcp,
            (|projection, kernel| {
                let envelope = build_command_envelope(projection);
                write_for_surface(&Surface::Mcp, &envelope, kernel)
            }) as CommandPolicy,
        )
});

/// Render a command invoke projection on a surface through the shared
/// registry.
pub fn render_command(
    surface: &Surface,
    projection: &CommandInvokeProjection,
    kernel: &WriterKernel,
) -> bool {
    dispatch_for_surface(&COMMAND_REGISTRY, surface, projection, kernel, |surface, kernel| {
        unsupported_surface("command", surface, kernel)
    })
}
