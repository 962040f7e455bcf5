//! Axum route handlers for the HTTP API.

pub mod approvals;
pub mod commands;
pub mod grafana;
pub mod policy;
pub mod probes;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::cell::RefCell;

use crate::surface::envelope::{HttpErrorBody, WriterKernel};

/// Render an envelope flow into an axum response.
///
/// Builds a writer kernel whose HTTP callbacks capture the response, runs the
/// given render function against it, and returns whatever was written. A
/// suppressed error write leaves the body empty on purpose.
pub(crate) fn respond_via<F>(render: F) -> Response
where
    F: FnOnce(&WriterKernel) -> bool,
{
    let response = RefCell::new(None::<Response>);
    let kernel = WriterKernel {
        write_http_error: Some(Box::new(|error: &HttpErrorBody| {
            *response.borrow_mut() = Some(http_error_response(error));
        })),
        write_http_success: Some(Box::new(|payload: &serde_json::Value| {
            *response.borrow_mut() = Some((StatusCode::OK, Json(payload.clone())).into_response());
        })),
        ..Default::default()
    };
    render(&kernel);
    drop(kernel);
    response
        .into_inner()
        .unwrap_or_else(|| StatusCode::NO_CONTENT.into_response())
}

fn http_error_response(error: &HttpErrorBody) -> Response {
    let status = StatusCode::from_u16(error.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({
        "error": error.code,
        "message": error.message,
    });
    (status, Json(body)).into_response()
}
