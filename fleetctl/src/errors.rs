//! Error types and HTTP response conversion.
//!
//! The main [`Error`] enum covers the handler-facing error cases and
//! implements [`IntoResponse`] so handlers can return `Result<T, Error>`.
//! Responses carry a JSON body of the shape:
//!
//! ```json
//! {
//!   "error": "not_found",
//!   "message": "probe with ID edge-7 not found"
//! }
//! ```
//!
//! The approval decide and command invoke endpoints do not go through this
//! conversion; their contracts are owned by the surface codecs in
//! [`crate::surface`].

use crate::approvals::queue::ApprovalError;
use crate::approvals::service::ServiceError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// The capacity policy refused the command
    #[error("{message}")]
    PolicyDenied { message: String },

    /// A dependency (capacity source, probe transport) is not reachable
    #[error("{message}")]
    Unavailable { message: String },

    /// Approval queue error
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    /// Orchestration error
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::PolicyDenied { .. } => StatusCode::FORBIDDEN,
            Error::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Error::Approval(e) => approval_status(e),
            Error::Service(e) => match e {
                ServiceError::Approval(inner) => approval_status(inner),
                ServiceError::ProbeNotFound { .. } => StatusCode::NOT_FOUND,
                ServiceError::PolicyTemplateNotFound { .. } => StatusCode::NOT_FOUND,
                ServiceError::ApprovedDispatch { .. } => StatusCode::BAD_GATEWAY,
                ServiceError::Hook(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable code for the JSON body.
    pub fn error_code(&self) -> &'static str {
        match self.status_code() {
            StatusCode::BAD_REQUEST => "invalid_request",
            StatusCode::NOT_FOUND => "not_found",
            StatusCode::FORBIDDEN => "policy_denied",
            StatusCode::CONFLICT => "conflict",
            StatusCode::GONE => "expired",
            StatusCode::TOO_MANY_REQUESTS => "queue_full",
            StatusCode::REQUEST_TIMEOUT => "timeout",
            StatusCode::BAD_GATEWAY => "bad_gateway",
            StatusCode::SERVICE_UNAVAILABLE => "service_unavailable",
            _ => "internal_error",
        }
    }

    /// Returns a user-safe error message, without leaking internals.
    pub fn user_message(&self) -> String {
        match self {
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Service(ServiceError::Hook(_)) | Error::Service(ServiceError::ApprovedDispatch { .. }) => {
                tracing::warn!("Pipeline error: {}", self);
            }
            Error::Unavailable { .. } => {
                tracing::warn!("Dependency unavailable: {}", self);
            }
            _ => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.user_message(),
        });
        (status, axum::response::Json(body)).into_response()
    }
}

fn approval_status(e: &ApprovalError) -> StatusCode {
    match e {
        ApprovalError::QueueFull { .. } => StatusCode::TOO_MANY_REQUESTS,
        ApprovalError::NotFound { .. } => StatusCode::NOT_FOUND,
        ApprovalError::AlreadyDecided { .. } => StatusCode::CONFLICT,
        ApprovalError::Expired { .. } => StatusCode::GONE,
        ApprovalError::InvalidDecision { .. } => StatusCode::BAD_REQUEST,
        ApprovalError::DecisionTimeout { .. } => StatusCode::REQUEST_TIMEOUT,
    }
}

/// Type alias for handler results
pub type Result<T> = std::result::Result<T, Error>;
