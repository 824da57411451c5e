use conduit_core::{ErrorKind, HasErrorKind};
use thiserror::Error;

/// Errors surfaced by the Session Store. Backing-store failures are never
/// swallowed by a read — the caller decides what to do (§4.A).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] redis::RedisError),

    #[error("malformed session record for {id}: {source}")]
    Corrupt { id: String, source: serde_json::Error },
}

impl HasErrorKind for SessionError {
    fn kind(&self) -> ErrorKind {
        match self {
            SessionError::NotFound(_) => ErrorKind::NotFound,
            SessionError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            SessionError::Corrupt { .. } => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
