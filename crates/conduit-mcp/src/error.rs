use conduit_core::{ErrorKind, HasErrorKind};
use thiserror::Error;

/// Surface for every remote call in §4.E. The client never retries — the
/// Workflow Driver decides what to do with these.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("MCP returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("MCP unreachable: {0}")]
    Unreachable(String),

    #[error("malformed MCP response: {0}")]
    Parse(String),
}

impl HasErrorKind for McpError {
    fn kind(&self) -> ErrorKind {
        match self {
            McpError::Api { .. } => ErrorKind::McpError,
            McpError::Unreachable(_) => ErrorKind::McpUnreachable,
            McpError::Parse(_) => ErrorKind::Internal,
        }
    }
}

impl From<reqwest::Error> for McpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            McpError::Unreachable(e.to_string())
        } else {
            McpError::Parse(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, McpError>;
