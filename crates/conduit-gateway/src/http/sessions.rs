use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use conduit_core::{ConversationState, Message, ProjectState, SessionId};
use conduit_sessions::SessionStore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::{GatewayError, Result};

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
    pub conversation_state: ConversationState,
    pub project_state: Option<ProjectState>,
}

/// GET /api/v1/sessions/{id}/info
pub async fn info(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<SessionInfo>> {
    let id = SessionId::from(id);
    let session = state
        .coordinator
        .store()
        .get(&id)
        .await?
        .ok_or_else(|| GatewayError::Session(conduit_sessions::SessionError::NotFound(id.to_string())))?;
    Ok(Json(SessionInfo {
        id: session.id.to_string(),
        created_at: session.created_at,
        last_activity: session.last_activity,
        message_count: session.messages.len(),
        conversation_state: session.conversation_state,
        project_state: session.project.as_ref().map(|p| p.state),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    #[serde(default)]
    pub history: bool,
}

/// GET /api/v1/sessions/{id}/context?history=true
pub async fn context(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<ContextQuery>,
) -> Result<Json<Value>> {
    let id = SessionId::from(id);
    let ctx = state.coordinator.context().relevant_context(&id, q.history).await?;
    Ok(Json(serde_json::to_value(ctx).unwrap_or(Value::Null)))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/sessions/{id}/history?limit=
pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<Message>>> {
    let id = SessionId::from(id);
    let messages = state.coordinator.store().history(&id, q.limit).await?;
    Ok(Json(messages))
}

#[derive(Debug, Deserialize)]
pub struct StateOverrideRequest {
    pub conversation_state: Option<ConversationState>,
    pub project_state: Option<ProjectState>,
}

fn state_error(status: StatusCode, error_type: &str, message: impl Into<String>) -> (StatusCode, Json<Value>) {
    (status, Json(json!({ "error": message.into(), "errorType": error_type })))
}

/// POST /api/v1/sessions/{id}/state — admin override of either state
/// machine (§6: `{conversation_state?, project_state?}`). A rejected
/// `conversation_state` transition surfaces as 400
/// `invalid_state_transition` and leaves the session untouched (O-2);
/// this is the one place that rejection is surfaced to a caller rather
/// than only logged. A non-monotonic `project_state` move (invariant 4)
/// surfaces the same way.
pub async fn override_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<StateOverrideRequest>,
) -> std::result::Result<Json<Value>, (StatusCode, Json<Value>)> {
    let id = SessionId::from(id);
    let mut result = json!({});

    if let Some(target) = req.conversation_state {
        let applied = state.coordinator.state().transition_conversation(&id, target).await.map_err(|e| {
            let kind = conduit_core::HasErrorKind::kind(&e);
            state_error(StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), kind.code(), e.to_string())
        })?;
        if !applied {
            return Err(state_error(
                StatusCode::BAD_REQUEST,
                "invalid_state_transition",
                "that transition is not allowed from the current state",
            ));
        }
        result["conversation_state"] = json!(target);
    }

    if let Some(target) = req.project_state {
        state.coordinator.state().update_project(&id, target).await.map_err(|e| {
            let kind = conduit_core::HasErrorKind::kind(&e);
            state_error(StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR), kind.code(), e.to_string())
        })?;
        result["project_state"] = json!(target);
    }

    Ok(Json(result))
}

/// DELETE /api/v1/sessions/{id}
pub async fn remove(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<StatusCode> {
    let id = SessionId::from(id);
    state.coordinator.store().delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/sessions/active
pub async fn list_active(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>> {
    let ids = state.coordinator.store().list_active().await?;
    Ok(Json(ids.into_iter().map(|id| id.to_string()).collect()))
}
