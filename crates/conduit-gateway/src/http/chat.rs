use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use conduit_core::SessionId;
use serde::Deserialize;
use serde_json::Value;

use crate::app::AppState;
use crate::coordinator::ConversationResponse;
use crate::error::Result;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub context: Option<HashMap<String, Value>>,
}

/// POST /api/v1/conversation/chat — the one synchronous entry point for
/// chat clients (§4.I). Workflow execution happens off this call's
/// critical path.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ConversationResponse>> {
    let session_id = req.session_id.as_deref().map(SessionId::from);
    let response = state
        .coordinator
        .handle_message(&req.message, session_id, req.context)
        .await?;
    Ok(Json(response))
}
