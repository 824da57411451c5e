use conduit_core::{ErrorKind, HasErrorKind};
use conduit_sessions::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("session has no project context")]
    NoProject,
}

impl HasErrorKind for ContextError {
    fn kind(&self) -> ErrorKind {
        match self {
            ContextError::Session(e) => e.kind(),
            ContextError::NoProject => ErrorKind::NotFound,
        }
    }
}

pub type Result<T> = std::result::Result<T, ContextError>;
