//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`].  Caller and internal errors become a
//! JSON body `{"error": "..."}`; a failing IR stage has its own status, content
//! type and body forwarded unchanged.
//!
//! Internal errors are logged with full detail (including redacted tool
//! diagnostics) but only a fixed message per kind reaches the caller.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};
use xmi_core::{ErrorClass, PipelineError};

#[derive(Debug, Error)]
pub enum ServerError {
    /// Raised by the conversion pipeline.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The upload exceeded the configured ceiling.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match self {
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ServerError::PayloadTooLarge(m) => (StatusCode::PAYLOAD_TOO_LARGE, m),
            ServerError::Pipeline(PipelineError::Downstream(failure)) => {
                warn!(status = failure.status, "forwarding IR stage failure");
                let status = StatusCode::from_u16(failure.status).unwrap_or(StatusCode::BAD_GATEWAY);
                let content_type = failure
                    .content_type
                    .as_deref()
                    .and_then(|ct| HeaderValue::from_str(ct).ok())
                    .unwrap_or(HeaderValue::from_static("application/json"));
                return (status, [(header::CONTENT_TYPE, content_type)], failure.body).into_response();
            }
            ServerError::Pipeline(e) => match e.class() {
                ErrorClass::Caller => (StatusCode::BAD_REQUEST, e.client_message()),
                _ => {
                    error!(
                        error = %e,
                        diagnostics = e.diagnostics().unwrap_or(""),
                        "conversion failed"
                    );
                    (StatusCode::INTERNAL_SERVER_ERROR, e.client_message())
                }
            },
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
