use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, header};
use tower_http::cors::{Any, CorsLayer};
use xmi_core::pipeline::SCHEMA_WARNING_HEADER;
use xmi_core::stage::SCHEMA_VERSION_HEADER;

use crate::middleware::trace::X_TRACE_ID;
use crate::state::AppState;

pub fn cors_layer(state: Arc<AppState>) -> CorsLayer {
    // Browsers only let scripts read these when they are exposed.
    let exposed = [
        header::CONTENT_DISPOSITION,
        HeaderName::from_static(SCHEMA_VERSION_HEADER),
        HeaderName::from_static(SCHEMA_WARNING_HEADER),
        HeaderName::from_static(X_TRACE_ID),
    ];
    let base = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .expose_headers(exposed);

    let origins: Vec<HeaderValue> = state
        .config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    if origins.is_empty() {
        // Wildcard; set XMI_CORS_ORIGINS in production.
        base.allow_origin(Any)
    } else {
        base.allow_origin(origins)
    }
}
