//! Transport-neutral response envelope and writer kernel.
//!
//! Every caller surface (HTTP, MCP) renders outcomes through a
//! [`ResponseEnvelope`]: the per-flow codecs fill it from their domain
//! projection, and [`write_for_surface`] plays it back through whichever
//! writer callbacks the transport shell supplied. Writing is read-only over
//! the envelope, so replaying the same envelope produces the same callback
//! invocations.

use serde_json::Value;
use std::fmt;

/// A caller-facing transport.
///
/// `Other` carries surface names this core does not understand; both flows
/// render those as internal errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Surface {
    Http,
    Mcp,
    Other(String),
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Surface::Http => write!(f, "http"),
            Surface::Mcp => write!(f, "mcp"),
            Surface::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Canonical HTTP error shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpErrorBody {
    pub status: u16,
    pub code: String,
    pub message: String,
    /// Instructs the HTTP writer to emit nothing (the caller is gone).
    pub suppress_write: bool,
}

impl HttpErrorBody {
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            suppress_write: false,
        }
    }

    /// An error the HTTP writer should swallow silently.
    pub fn suppressed() -> Self {
        Self {
            status: 499,
            code: "canceled".to_string(),
            message: "client closed request".to_string(),
            suppress_write: true,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, "internal_error", message)
    }
}

/// Surface-neutral response: at most one error and one success payload per
/// surface.
#[derive(Debug, Default)]
pub struct ResponseEnvelope {
    pub http_error: Option<HttpErrorBody>,
    pub mcp_error: Option<String>,
    pub http_success: Option<Value>,
    pub mcp_success: Option<Value>,
}

/// Writer callbacks supplied by the transport shell. All four are optional;
/// surfaces simply skip writers they were not given.
#[derive(Default)]
pub struct WriterKernel<'a> {
    pub write_http_error: Option<Box<dyn Fn(&HttpErrorBody) + 'a>>,
    pub write_mcp_error: Option<Box<dyn Fn(&str) + 'a>>,
    pub write_http_success: Option<Box<dyn Fn(&Value) + 'a>>,
    pub write_mcp_success: Option<Box<dyn Fn(&Value) + 'a>>,
}

impl<'a> WriterKernel<'a> {
    /// Kernel with only the HTTP writers attached.
    pub fn http(
        error: impl Fn(&HttpErrorBody) + 'a,
        success: impl Fn(&Value) + 'a,
    ) -> Self {
        Self {
            write_http_error: Some(Box::new(error)),
            write_http_success: Some(Box::new(success)),
            ..Default::default()
        }
    }

    /// Kernel with only the MCP writers attached.
    pub fn mcp(error: impl Fn(&str) + 'a, success: impl Fn(&Value) + 'a) -> Self {
        Self {
            write_mcp_error: Some(Box::new(error)),
            write_mcp_success: Some(Box::new(success)),
            ..Default::default()
        }
    }
}

/// Play an envelope back through the kernel for one surface.
///
/// Returns true when an error was handled (including a suppressed HTTP
/// write). Unsupported surfaces are routed through the shared
/// [`unsupported_surface`](super::registry::unsupported_surface) fallback;
/// callers that resolve surfaces through the registry never reach that arm.
pub fn write_for_surface(surface: &Surface, envelope: &ResponseEnvelope, kernel: &WriterKernel) -> bool {
    match surface {
        Surface::Http => {
            if let Some(error) = &envelope.http_error {
                if !error.suppress_write {
                    if let Some(write) = &kernel.write_http_error {
                        write(error);
                    }
                }
                return true;
            }
            if let Some(payload) = &envelope.http_success {
                if let Some(write) = &kernel.write_http_success {
                    write(payload);
                }
            }
            false
        }
        Surface::Mcp => {
            if let Some(error) = &envelope.mcp_error {
                if let Some(write) = &kernel.write_mcp_error {
                    write(error);
                }
                return true;
            }
            if let Some(payload) = &envelope.mcp_success {
                if let Some(write) = &kernel.write_mcp_success {
                    write(payload);
                }
            }
            false
        }
        Surface::Other(_) => super::registry::unsupported_surface("response", surface, kernel),
    }
}
