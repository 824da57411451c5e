use thiserror::Error;

/// Stable error-kind taxonomy (§7). Used in logs, event `errorType` fields,
/// and to pick an HTTP status code at the gateway boundary without a match
/// over every concrete error type in every crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; surfaced to the caller as 400.
    Validation,
    /// Unknown session/project; 404.
    NotFound,
    /// KV backend failure; 503, retry-safe.
    StoreUnavailable,
    /// MCP returned >= 400; 502, `error` event emitted.
    McpError,
    /// Network/timeout to MCP; 502, `error` event emitted.
    McpUnreachable,
    /// Rejected by the state table (§4.D); logged, not surfaced, state unchanged.
    InvalidStateTransition,
    /// One event-bus handler raised; isolated, logged, other handlers continue.
    HandlerFailure,
    /// Anything else; 500.
    Internal,
}

impl ErrorKind {
    /// Stable name used in logs and event `errorType` fields.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::McpError => "mcp_error",
            ErrorKind::McpUnreachable => "mcp_unreachable",
            ErrorKind::InvalidStateTransition => "invalid_state_transition",
            ErrorKind::HandlerFailure => "handler_failure",
            ErrorKind::Internal => "internal",
        }
    }

    /// HTTP status this error kind maps to at the gateway boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::StoreUnavailable => 503,
            ErrorKind::McpError => 502,
            ErrorKind::McpUnreachable => 502,
            // Never surfaced directly — callers should not render this as a response,
            // but 500 is the safe fallback if one escapes.
            ErrorKind::InvalidStateTransition => 500,
            ErrorKind::HandlerFailure => 500,
            ErrorKind::Internal => 500,
        }
    }

    /// Whether the Coordinator should emit an `error` event for this kind (§7).
    pub fn emits_error_event(&self) -> bool {
        matches!(self, ErrorKind::StoreUnavailable | ErrorKind::McpError | ErrorKind::McpUnreachable)
    }
}

/// Implemented by every crate-local error enum so the gateway can convert
/// any error into the right HTTP response / event without depending on
/// every crate's concrete error type.
pub trait HasErrorKind {
    fn kind(&self) -> ErrorKind;
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HasErrorKind for CoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Config(_) => ErrorKind::Internal,
            CoreError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
