use conduit_core::{ErrorKind, HasErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error(transparent)]
    Session(#[from] conduit_sessions::SessionError),

    #[error(transparent)]
    Context(#[from] conduit_context::ContextError),

    /// `update_project` attempted a non-monotonic move (invariant 4).
    /// Logged and rejected per §7's `invalid_state_transition`; never
    /// surfaced to the caller as an HTTP error.
    #[error("project state {from} cannot move to {to}")]
    NonMonotonic { from: String, to: String },
}

impl HasErrorKind for StateError {
    fn kind(&self) -> ErrorKind {
        match self {
            StateError::Session(e) => e.kind(),
            StateError::Context(e) => e.kind(),
            StateError::NonMonotonic { .. } => ErrorKind::InvalidStateTransition,
        }
    }
}

pub type Result<T> = std::result::Result<T, StateError>;
