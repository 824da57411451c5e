use conduit_core::{ErrorKind, HasErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
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

    /// Modification workflow kicked off against a session with no
    /// ProjectContext — the Coordinator should never reach this, since
    /// `next_action` only returns `StartModification` when one exists.
    #[error("no project context for session {0}")]
    NoProject(String),
}

impl HasErrorKind for WorkflowError {
    fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Session(e) => e.kind(),
            WorkflowError::Context(e) => e.kind(),
            WorkflowError::State(e) => e.kind(),
            WorkflowError::Mcp(e) => e.kind(),
            WorkflowError::Bus(e) => e.kind(),
            WorkflowError::NoProject(_) => ErrorKind::NotFound,
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
