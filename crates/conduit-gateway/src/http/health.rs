use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health — overall status.
pub async fn health(State(_state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /health/ready — readiness probe. Always ready once the router is
/// serving; backend outages surface per-request instead of flipping this.
pub async fn ready() -> Json<Value> {
    Json(json!({ "status": "ready" }))
}

/// GET /health/live — liveness probe.
pub async fn live() -> Json<Value> {
    Json(json!({ "status": "alive" }))
}
