use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use conduit_core::{ErrorKind, HasErrorKind};
use serde_json::json;
use thiserror::Error;

/// Umbrella error the HTTP layer converts to a response (§7). Every
/// crate-local error enum already knows its `ErrorKind`; this just picks
/// the status code and body shape once, at the boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Session(#[from] conduit_sessions::SessionError),
    #[error(transparent)]
    Context(#[from] conduit_context::ContextError),
    #[error(transparent)]
    State(#[from] conduit_state::StateError),
    #[error(transparent)]
    Mcp(#[from] conduit_mcp::McpError),
    #[error(transparent)]
    Bus(#[from] conduit_bus::BusError),
    #[error(transparent)]
    Workflow(#[from] conduit_workflow::WorkflowError),
    #[error("invalid request: {0}")]
    Validation(String),
}

impl HasErrorKind for GatewayError {
    fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Session(e) => e.kind(),
            GatewayError::Context(e) => e.kind(),
            GatewayError::State(e) => e.kind(),
            GatewayError::Mcp(e) => e.kind(),
            GatewayError::Bus(e) => e.kind(),
            GatewayError::Workflow(e) => e.kind(),
            GatewayError::Validation(_) => ErrorKind::Validation,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = StatusCode::from_u16(kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "error": self.to_string(),
            "errorType": kind.code(),
        }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
