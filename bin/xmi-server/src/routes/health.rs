//! Health / heartbeat endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_health))]
pub struct HealthApi;

/// Register health-check routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// Heartbeat endpoint.
///
/// Returns `{"status": "ok", "version": "...", "tool": "..."}` with HTTP 200.
/// `tool` reports whether the model tool could be located; the server stays
/// up either way so the IR-only route keeps working.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = Value)
    )
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let tool = match state.pipeline.tool().launcher() {
        Ok(_) => "available",
        Err(_) => "unavailable",
    };
    Json(json!({
        "status":  "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "tool":    tool,
    }))
}
