use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque session identifier. Callers may supply their own on first
/// contact; the Coordinator mints one with `SessionId::new()` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One append-only entry in a session's message log (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }
}

/// Closed intent enum (§3). Declaration order is the tie-break order for
/// O-6: when two intents score equal, the earlier one in this list wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ProjectCreate,
    ProjectModify,
    ProjectInfo,
    Clarification,
    GeneralQuery,
    Help,
    Greeting,
    Unknown,
}

impl Intent {
    /// Stable ordinal matching declaration order, used to break score ties.
    pub fn ordinal(&self) -> u8 {
        match self {
            Intent::ProjectCreate => 0,
            Intent::ProjectModify => 1,
            Intent::ProjectInfo => 2,
            Intent::Clarification => 3,
            Intent::GeneralQuery => 4,
            Intent::Help => 5,
            Intent::Greeting => 6,
            Intent::Unknown => 7,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Intent::ProjectCreate => "project_create",
            Intent::ProjectModify => "project_modify",
            Intent::ProjectInfo => "project_info",
            Intent::Clarification => "clarification",
            Intent::GeneralQuery => "general_query",
            Intent::Help => "help",
            Intent::Greeting => "greeting",
            Intent::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Entity map produced by `extract_entities` / carried on a classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub project_types: Vec<String>,
}

/// Dialogue-level state machine (§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Initial,
    GatheringRequirements,
    ConfirmingDetails,
    Processing,
    AwaitingFeedback,
    Completed,
    Error,
}

impl ConversationState {
    /// Valid next states per the table in §4.D, in the same order.
    pub fn allowed_next(&self) -> &'static [ConversationState] {
        use ConversationState::*;
        match self {
            Initial => &[GatheringRequirements, ConfirmingDetails, Error],
            GatheringRequirements => &[GatheringRequirements, ConfirmingDetails, Error],
            ConfirmingDetails => &[Processing, GatheringRequirements, Error],
            Processing => &[AwaitingFeedback, Completed, Error],
            AwaitingFeedback => &[Processing, Completed, GatheringRequirements, Error],
            Completed => &[GatheringRequirements, Initial],
            Error => &[Initial, GatheringRequirements],
        }
    }

    pub fn can_transition_to(&self, target: ConversationState) -> bool {
        self.allowed_next().contains(&target)
    }
}

impl std::fmt::Display for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConversationState::Initial => "initial",
            ConversationState::GatheringRequirements => "gathering_requirements",
            ConversationState::ConfirmingDetails => "confirming_details",
            ConversationState::Processing => "processing",
            ConversationState::AwaitingFeedback => "awaiting_feedback",
            ConversationState::Completed => "completed",
            ConversationState::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Project-level lifecycle state (§3/§4.D invariant 4: monotonic except a
/// new modification can move `completed`/`failed` back to `modifying`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectState {
    NotStarted,
    Planning,
    InProgress,
    Modifying,
    Completed,
    Failed,
}

impl std::fmt::Display for ProjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProjectState::NotStarted => "not_started",
            ProjectState::Planning => "planning",
            ProjectState::InProgress => "in_progress",
            ProjectState::Modifying => "modifying",
            ProjectState::Completed => "completed",
            ProjectState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One modification request recorded against a ProjectContext (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Modification {
    pub timestamp: DateTime<Utc>,
    pub original_text: String,
    pub impact_analysis: Option<serde_json::Value>,
    pub execution_result: Option<serde_json::Value>,
}

/// The in-progress generated project tracked inside a Session's context
/// (§3). At most one per session; `project_id` is immutable once set
/// (invariant O-4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectContext {
    pub project_id: String,
    pub project_type: Option<String>,
    #[serde(default)]
    pub current_state: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub requirements: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub modifications: Vec<Modification>,
    pub state: ProjectState,
}

/// Durable per-session record (§3). Owned exclusively by the Session
/// Store; every other component observes or mutates it only through that
/// store's interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Free-form context, including the optional `project` sub-value.
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    pub project: Option<ProjectContext>,
    pub conversation_state: ConversationState,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_activity: now,
            messages: Vec::new(),
            context: HashMap::new(),
            project: None,
            conversation_state: ConversationState::Initial,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

/// A typed, timestamped record published to the bus and/or pushed to WS
/// clients (§3/§4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: Utc::now(),
            source: source.into(),
            data,
        }
    }

    /// Topic an event lands on, a pure function of the type prefix (§4.G, O-5).
    pub fn topic(&self) -> &'static str {
        if self.event_type.starts_with("project.") || self.event_type.starts_with("validation.") {
            "project-updates"
        } else {
            "conversation-events"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_state_table_closure() {
        assert!(ConversationState::Initial.can_transition_to(ConversationState::GatheringRequirements));
        assert!(!ConversationState::Initial.can_transition_to(ConversationState::Completed));
        assert!(!ConversationState::Completed.can_transition_to(ConversationState::Processing));
    }

    #[test]
    fn intent_ordinal_matches_declaration_order() {
        assert!(Intent::ProjectCreate.ordinal() < Intent::ProjectModify.ordinal());
        assert!(Intent::Help.ordinal() < Intent::Greeting.ordinal());
    }

    #[test]
    fn event_topic_routing() {
        let e = Event::new("project.updated", "test", serde_json::json!({}));
        assert_eq!(e.topic(), "project-updates");
        let e = Event::new("validation.complete", "test", serde_json::json!({}));
        assert_eq!(e.topic(), "project-updates");
        let e = Event::new("conversation.message.received", "test", serde_json::json!({}));
        assert_eq!(e.topic(), "conversation-events");
        let e = Event::new("progress.update", "test", serde_json::json!({}));
        assert_eq!(e.topic(), "conversation-events");
        let e = Event::new("error", "test", serde_json::json!({}));
        assert_eq!(e.topic(), "conversation-events");
    }
}
