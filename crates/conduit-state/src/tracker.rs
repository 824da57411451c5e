use std::sync::Arc;

use conduit_context::ContextManager;
use conduit_core::{ConversationState, Intent, ProjectState, SessionId};
use conduit_sessions::SessionStore;
use serde::Serialize;
use tracing::{instrument, warn};

use crate::error::{Result, StateError};

/// The action tag the Coordinator dispatches on (§4.D/§4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTag {
    AskClarifyingQuestion,
    ConfirmDetails,
    /// Workflow kickoff: creation (§4.F), fired when state reaches `processing`.
    StartProcessing,
    /// Workflow kickoff: modification (§4.F).
    StartModification,
    /// Re-entry from `awaiting_feedback` after a high-risk modification
    /// confirmation (§9 open question — see `NextAction::is_confirmation`).
    ResumeModification,
    Respond,
}

#[derive(Debug, Clone, Serialize)]
pub struct NextAction {
    pub action: ActionTag,
    pub next_state: ConversationState,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateSummary {
    pub conversation_state: ConversationState,
    pub project_state: Option<ProjectState>,
    pub message_count: usize,
    pub has_project: bool,
}

/// Enforces the conversation and project state machines (§4.D).
pub struct StateTracker<S: SessionStore> {
    store: Arc<S>,
    context: Arc<ContextManager<S>>,
}

impl<S: SessionStore> StateTracker<S> {
    pub fn new(store: Arc<S>, context: Arc<ContextManager<S>>) -> Self {
        Self { store, context }
    }

    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn conversation_state(&self, id: &SessionId) -> Result<ConversationState> {
        let session = self.store.get(id).await?.ok_or_else(|| {
            StateError::Session(conduit_sessions::SessionError::NotFound(id.to_string()))
        })?;
        Ok(session.conversation_state)
    }

    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn project_state(&self, id: &SessionId) -> Result<Option<ProjectState>> {
        let project = self.context.project_context(id).await?;
        Ok(project.map(|p| p.state))
    }

    /// Validates against the transition table (§4.D) and persists on
    /// success. Returns `false` and leaves state unchanged on a rejected
    /// transition — it is never surfaced as an error (O-2).
    #[instrument(skip(self), fields(session_id = %id, target = %target))]
    pub async fn transition_conversation(&self, id: &SessionId, target: ConversationState) -> Result<bool> {
        let mut session = self.store.get(id).await?.ok_or_else(|| {
            StateError::Session(conduit_sessions::SessionError::NotFound(id.to_string()))
        })?;
        if !session.conversation_state.can_transition_to(target) {
            warn!(session_id = %id, from = %session.conversation_state, to = %target, "rejected conversation state transition");
            return Ok(false);
        }
        session.conversation_state = target;
        self.store.save(&session).await?;
        Ok(true)
    }

    /// The driver is the sole writer of `ProjectState` for workflow
    /// transitions; this enforces invariant 4 (monotonic except a new
    /// modification moving `completed`/`failed` back to `modifying`).
    #[instrument(skip(self), fields(session_id = %id, target = %target))]
    pub async fn update_project(&self, id: &SessionId, target: ProjectState) -> Result<()> {
        let current = self.project_state(id).await?;
        if let Some(current) = current {
            let locked = matches!(current, ProjectState::Completed | ProjectState::Failed);
            if locked && target != ProjectState::Modifying {
                return Err(StateError::NonMonotonic {
                    from: current.to_string(),
                    to: target.to_string(),
                });
            }
        }
        self.context.update_project_state(id, target).await?;
        Ok(())
    }

    /// True when no ProjectContext exists, or any of {type, requirements,
    /// current_state} is empty, or `requirements` has fewer than 3 keys.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn should_gather_more(&self, id: &SessionId) -> Result<bool> {
        let project = self.context.project_context(id).await?;
        let project = match project {
            None => return Ok(true),
            Some(p) => p,
        };
        if project.project_type.is_none() {
            return Ok(true);
        }
        if project.requirements.is_empty() || project.requirements.len() < 3 {
            return Ok(true);
        }
        if project.current_state.is_empty() {
            return Ok(true);
        }
        Ok(false)
    }

    /// Pure function of (state, intent, context) per §4.D — the only
    /// branch point with side effects is `should_gather_more`'s own store
    /// read, already folded in above.
    #[instrument(skip(self), fields(session_id = %id, intent = %intent))]
    pub async fn next_action(&self, id: &SessionId, intent: Intent) -> Result<NextAction> {
        let current = self.conversation_state(id).await?;
        let has_project = self.project_state(id).await?.is_some();

        let result = match intent {
            Intent::Greeting | Intent::Help | Intent::ProjectInfo | Intent::GeneralQuery | Intent::Unknown => {
                NextAction {
                    action: ActionTag::Respond,
                    next_state: current,
                    message: String::new(),
                }
            }
            Intent::ProjectCreate => {
                if has_project {
                    NextAction {
                        action: ActionTag::Respond,
                        next_state: current,
                        message: "You already have a project in this session.".to_string(),
                    }
                } else if self.should_gather_more(id).await? {
                    NextAction {
                        action: ActionTag::AskClarifyingQuestion,
                        next_state: ConversationState::GatheringRequirements,
                        message: "What would you like this project to do?".to_string(),
                    }
                } else {
                    NextAction {
                        action: ActionTag::ConfirmDetails,
                        next_state: ConversationState::ConfirmingDetails,
                        message: "Here's what I'll build — shall I proceed?".to_string(),
                    }
                }
            }
            Intent::ProjectModify => {
                if has_project {
                    NextAction {
                        action: ActionTag::StartModification,
                        next_state: ConversationState::Processing,
                        message: "Working on that change.".to_string(),
                    }
                } else {
                    NextAction {
                        action: ActionTag::Respond,
                        next_state: ConversationState::GatheringRequirements,
                        message: "There's no project yet to modify — want to create one?".to_string(),
                    }
                }
            }
            Intent::Clarification => {
                if current == ConversationState::AwaitingFeedback {
                    NextAction {
                        action: ActionTag::ResumeModification,
                        next_state: ConversationState::Processing,
                        message: "Got it, continuing.".to_string(),
                    }
                } else if current == ConversationState::ConfirmingDetails {
                    NextAction {
                        action: ActionTag::StartProcessing,
                        next_state: ConversationState::Processing,
                        message: "Starting now.".to_string(),
                    }
                } else {
                    NextAction {
                        action: ActionTag::Respond,
                        next_state: current,
                        message: "Could you say a bit more?".to_string(),
                    }
                }
            }
        };

        Ok(result)
    }

    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn summary(&self, id: &SessionId) -> Result<StateSummary> {
        let session = self.store.get(id).await?.ok_or_else(|| {
            StateError::Session(conduit_sessions::SessionError::NotFound(id.to_string()))
        })?;
        Ok(StateSummary {
            conversation_state: session.conversation_state,
            project_state: session.project.as_ref().map(|p| p.state),
            message_count: session.messages.len(),
            has_project: session.project.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_sessions::FakeSessionStore;

    fn tracker() -> StateTracker<FakeSessionStore> {
        let store = Arc::new(FakeSessionStore::new());
        let context = Arc::new(ContextManager::new(store.clone()));
        StateTracker::new(store, context)
    }

    #[tokio::test]
    async fn rejects_transition_outside_table() {
        let t = tracker();
        let id = SessionId::from("s-1");
        t.store.create(&id).await.unwrap();
        let ok = t.transition_conversation(&id, ConversationState::Completed).await.unwrap();
        assert!(!ok);
        assert_eq!(t.conversation_state(&id).await.unwrap(), ConversationState::Initial);
    }

    #[tokio::test]
    async fn allows_transition_in_table() {
        let t = tracker();
        let id = SessionId::from("s-2");
        t.store.create(&id).await.unwrap();
        let ok = t.transition_conversation(&id, ConversationState::GatheringRequirements).await.unwrap();
        assert!(ok);
        assert_eq!(t.conversation_state(&id).await.unwrap(), ConversationState::GatheringRequirements);
    }

    #[tokio::test]
    async fn rejects_self_transition_not_listed_as_its_own_successor() {
        let t = tracker();
        let id = SessionId::from("s-5");
        t.store.create(&id).await.unwrap();
        // `Initial` does not list itself in `allowed_next` (§4.D) — posting
        // the current state back must be rejected like any other
        // out-of-table pair (O-2), not short-circuited to success.
        let ok = t.transition_conversation(&id, ConversationState::Initial).await.unwrap();
        assert!(!ok);
        assert_eq!(t.conversation_state(&id).await.unwrap(), ConversationState::Initial);
    }

    #[tokio::test]
    async fn allows_self_transition_where_the_table_lists_it() {
        let t = tracker();
        let id = SessionId::from("s-6");
        t.store.create(&id).await.unwrap();
        t.transition_conversation(&id, ConversationState::GatheringRequirements).await.unwrap();
        // `GatheringRequirements` is the one state that lists itself.
        let ok = t.transition_conversation(&id, ConversationState::GatheringRequirements).await.unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn should_gather_more_true_without_project() {
        let t = tracker();
        let id = SessionId::from("s-3");
        t.store.create(&id).await.unwrap();
        assert!(t.should_gather_more(&id).await.unwrap());
    }

    #[tokio::test]
    async fn next_action_for_greeting_keeps_state() {
        let t = tracker();
        let id = SessionId::from("s-4");
        t.store.create(&id).await.unwrap();
        let action = t.next_action(&id, Intent::Greeting).await.unwrap();
        assert_eq!(action.action, ActionTag::Respond);
        assert_eq!(action.next_state, ConversationState::Initial);
    }
}
