//! Conversion route (`POST /v1/xmi`).
//!
//! Reads the multipart body into a [`RawForm`] (enforcing the upload
//! ceiling while streaming), runs the pipeline and frames its output as a
//! download.

use std::sync::Arc;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use bytes::BytesMut;
use tracing::{debug, warn};
use utoipa::OpenApi;
use xmi_core::request::{FIELD_INPUT_ZIP, FIELD_IR_FILE};
use xmi_core::{PipelineOutput, RawForm, Upload};

use crate::error::ServerError;
use crate::middleware::trace::X_TRACE_ID;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(convert), components(schemas(crate::schemas::v1::xmi::XmiRequestUpload)))]
pub struct XmiApi;

/// Register conversion routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/xmi", post(convert))
}

/// Convert a project into an XMI model (`POST /v1/xmi`).
///
/// `java` sources are handed straight to the model tool.  Front-end languages
/// (`ts`, `js`, `react`, `angular`) go through the IR stage first; with
/// `resultFormat=ir` the IR itself is returned.  A failing IR stage's status
/// and body are returned unchanged.
#[utoipa::path(
    post,
    path = "/v1/xmi",
    tag = "xmi",
    request_body(content = crate::schemas::v1::xmi::XmiRequestUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Model file (application/xml) or IR document (application/json)"),
        (status = 400, description = "Missing or invalid field, unsupported language, or unusable source"),
        (status = 413, description = "Upload too large"),
        (status = 500, description = "Model generation failed or the IR stage is unreachable"),
    )
)]
pub async fn convert(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ServerError> {
    let multipart = multipart.map_err(|e| {
        debug!(error = %e, "rejecting non-multipart body");
        ServerError::BadRequest(format!("Expected a multipart/form-data body: {}", e.body_text()))
    })?;
    let form = read_form(multipart, state.config.max_upload_bytes()).await?;

    let mut forward = HeaderMap::new();
    if let Some(trace_id) = headers.get(X_TRACE_ID) {
        forward.insert(X_TRACE_ID, trace_id.clone());
    }

    let output = state.pipeline.handle(form, forward).await?;
    Ok(into_download(output))
}

/// Collect every part.  File parts are kept for the upload fields; all other
/// parts are read as text.
async fn read_form(mut multipart: Multipart, max_bytes: usize) -> Result<RawForm, ServerError> {
    let mut form = RawForm::new();
    let mut total = 0usize;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_owned) else {
            debug!("skipping unnamed multipart part");
            continue;
        };
        let file_name = field.file_name().map(str::to_owned);

        let mut buf = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            total += chunk.len();
            if total > max_bytes {
                warn!(field = %name, limit_bytes = max_bytes, "upload exceeds ceiling");
                return Err(ServerError::PayloadTooLarge(format!(
                    "Upload exceeds the maximum of {} MB",
                    max_bytes / (1024 * 1024)
                )));
            }
            buf.extend_from_slice(&chunk);
        }

        if name == FIELD_INPUT_ZIP || name == FIELD_IR_FILE {
            debug!(field = %name, size_bytes = buf.len(), "received file part");
            form.push_file(
                name.clone(),
                Upload {
                    file_name: file_name.unwrap_or(name),
                    bytes: buf.freeze(),
                },
            );
        } else {
            let text = String::from_utf8(buf.to_vec())
                .map_err(|_| ServerError::BadRequest(format!("Field {name} is not valid UTF-8")))?;
            form.push_text(name, text);
        }
    }
    Ok(form)
}

fn multipart_error(e: MultipartError) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(e.body_text())
    } else {
        ServerError::BadRequest(format!("Failed to read multipart body: {}", e.body_text()))
    }
}

fn into_download(output: PipelineOutput) -> Response {
    let mut response = (StatusCode::OK, output.body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(output.content_type));
    if let Ok(v) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", output.file_name)) {
        headers.insert(header::CONTENT_DISPOSITION, v);
    }
    for (name, value) in output.headers {
        if let Ok(v) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), v);
        }
    }
    response
}

// ── Tests ──────────────────────────────────────────────────────────────────────
