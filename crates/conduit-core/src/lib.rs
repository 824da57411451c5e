pub mod config;
pub mod error;
pub mod types;

pub use config::ConductorConfig;
pub use error::{CoreError, ErrorKind, HasErrorKind};
pub use types::{
    ConversationState, Entities, Event, Intent, Message, Modification, ProjectContext,
    ProjectState, Role, Session, SessionId,
};
