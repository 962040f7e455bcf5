//! Surface routing: a small registry mapping surfaces to dispatch policies.
//!
//! Each flow (approval decide, command invoke) registers one policy per
//! supported surface; resolution is uniform, and unsupported surfaces fall
//! through to a scope-labeled error with HTTP-first writer precedence.

use std::collections::HashMap;

use super::envelope::{HttpErrorBody, Surface, WriterKernel};

/// Maps a surface to the policy that renders a projection on it.
pub struct PolicyRegistry<P> {
    policies: HashMap<Surface, P>,
}

impl<P> PolicyRegistry<P> {
    pub fn new() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    pub fn register(mut self, surface: Surface, policy: P) -> Self {
        self.policies.insert(surface, policy);
        self
    }

    pub fn get(&self, surface: &Surface) -> Option<&P> {
        self.policies.get(surface)
    }
}

impl<P> Default for PolicyRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve the policy for `surface` and invoke it, or fall back to
/// `on_unsupported`.
pub fn dispatch_for_surface<P, Proj, F>(
    registry: &PolicyRegistry<P>,
    surface: &Surface,
    projection: &Proj,
    kernel: &WriterKernel,
    on_unsupported: F,
) -> bool
where
    P: Fn(&Proj, &WriterKernel) -> bool,
    F: FnOnce(&Surface, &WriterKernel) -> bool,
{
    match registry.get(surface) {
        Some(policy) => policy(projection, kernel),
        None => on_unsupported(surface, kernel),
    }
}

/// The standard unsupported-surface fallback for a given flow scope.
///
/// Emits `unsupported <scope> surface "<name>"` through the HTTP error
/// writer when present, else the MCP error writer.
pub fn unsupported_surface(scope: &str, surface: &Surface, kernel: &WriterKernel) -> bool {
    let message = format!("unsupported {scope} surface \"{surface}\"");
    tracing::warn!(scope, surface = %surface, "request for unsupported surface");
    let error = HttpErrorBody::internal(message.clone());
    if let Some(write) = &kernel.write_http_error {
        write(&error);
    } else if let Some(write) = &kernel.write_mcp_error {
        write(&message);
    }
    true
}
