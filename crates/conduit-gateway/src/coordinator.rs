use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use conduit_bus::EventPublisher;
use conduit_context::ContextManager;
use conduit_core::{Intent, Message, Role, SessionId};
use conduit_intent::IntentClassifier;
use conduit_sessions::SessionStore;
use conduit_state::{ActionTag, StateSummary, StateTracker};
use conduit_workflow::WorkflowDriver;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{instrument, warn};

use crate::error::{GatewayError, Result};
use crate::response::{ResponseGenerator, ResponseRequest};

const HISTORY_WINDOW: usize = 8;

/// `{response, session_id, intent, state_info, timestamp}` per §4.I —
/// the shape both the HTTP chat endpoint and the WS `chat` frame return.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationResponse {
    pub response: String,
    pub session_id: String,
    pub intent: Intent,
    pub confidence: f64,
    pub state_info: StateSummary,
    pub timestamp: DateTime<Utc>,
}

/// Top-level per-message routine (§4.I). Orchestrates the Session Store,
/// Context Manager, Intent Classifier, State Tracker, Workflow Driver,
/// and Event Bus for one inbound chat message; does not block on
/// workflow completion — a kicked-off workflow runs as an independent
/// task (§5).
pub struct Coordinator<S: SessionStore, B: EventPublisher> {
    store: Arc<S>,
    context: Arc<ContextManager<S>>,
    classifier: Arc<IntentClassifier<S>>,
    state: Arc<StateTracker<S>>,
    workflow: Arc<WorkflowDriver<S, B>>,
    bus: Arc<B>,
    responder: Arc<dyn ResponseGenerator>,
}

impl<S: SessionStore + 'static, B: EventPublisher + 'static> Coordinator<S, B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        context: Arc<ContextManager<S>>,
        classifier: Arc<IntentClassifier<S>>,
        state: Arc<StateTracker<S>>,
        workflow: Arc<WorkflowDriver<S, B>>,
        bus: Arc<B>,
        responder: Arc<dyn ResponseGenerator>,
    ) -> Self {
        Self { store, context, classifier, state, workflow, bus, responder }
    }

    #[instrument(skip(self, text, context_patch), fields(session_id))]
    pub async fn handle_message(
        &self,
        text: &str,
        session_id: Option<SessionId>,
        context_patch: Option<HashMap<String, Value>>,
    ) -> Result<ConversationResponse> {
        let id = session_id.unwrap_or_else(SessionId::new);
        self.store.create(&id).await?;
        if let Some(patch) = context_patch {
            self.store.update_context(&id, patch).await?;
        }

        let user_message = Message::new(Role::User, text);
        self.store.append_message(&id, user_message).await?;
        let _ = self.bus.conversation_message_received(&id.to_string()).await;

        let classification = self.classifier.classify(text, &id).await?;
        let current = self.state.conversation_state(&id).await?;
        let next = self.state.next_action(&id, classification.intent).await?;

        let recent_messages = self.store.history(&id, Some(HISTORY_WINDOW)).await?;
        let response_text = self
            .responder
            .generate(ResponseRequest {
                user_text: text.to_string(),
                intent: classification.intent,
                action: next.action,
                next_action_message: next.message.clone(),
                recent_messages,
            })
            .await;

        self.maybe_start_workflow(&id, next.action, text, &classification.metadata).await?;

        let mut metadata = classification.metadata.clone();
        metadata.insert("action".to_string(), serde_json::to_value(next.action).unwrap_or(Value::Null));
        let mut assistant_message = Message::new(Role::Assistant, response_text.clone());
        assistant_message.metadata = metadata.into_iter().collect();
        self.store.append_message(&id, assistant_message).await?;

        if next.next_state != current {
            let applied = self.state.transition_conversation(&id, next.next_state).await?;
            if !applied {
                warn!(session_id = %id, from = %current, to = %next.next_state, "rejected conversation state transition");
            }
        }

        let _ = self.bus.conversation_response_generated(&id.to_string()).await;

        let state_info = self.state.summary(&id).await?;
        Ok(ConversationResponse {
            response: response_text,
            session_id: id.to_string(),
            intent: classification.intent,
            confidence: classification.confidence,
            state_info,
            timestamp: Utc::now(),
        })
    }

    /// Kicks off the workflow task for a `start_processing`/`start_modification`
    /// action tag. The task runs independently of this call (§4.I step 8,
    /// §5 cancellation: "a workflow already handed to the driver continues
    /// independently").
    async fn maybe_start_workflow(
        &self,
        id: &SessionId,
        action: ActionTag,
        text: &str,
        metadata: &serde_json::Map<String, Value>,
    ) -> Result<()> {
        match action {
            ActionTag::StartProcessing => {
                let session = self.store.get(id).await?.ok_or_else(|| {
                    GatewayError::Session(conduit_sessions::SessionError::NotFound(id.to_string()))
                })?;
                let requirements = session
                    .context
                    .get("requirements")
                    .cloned()
                    .unwrap_or_else(|| json!({}));
                let project_type = session
                    .context
                    .get("project_type")
                    .and_then(Value::as_str)
                    .or_else(|| metadata.get("project_type").and_then(Value::as_str))
                    .unwrap_or("web_app")
                    .to_string();

                let workflow = self.workflow.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    if let Err(e) = workflow.run_creation(&id, requirements, &project_type).await {
                        warn!(session_id = %id, error = %e, "creation workflow task failed");
                    }
                });
            }
            ActionTag::StartModification => {
                // Stash the request before spawning so a high-risk
                // `ConfirmationNeeded` outcome leaves something for
                // `ResumeModification` to read back later (§9).
                let mut patch = HashMap::new();
                patch.insert("pending_modification".to_string(), Value::String(text.to_string()));
                self.store.update_context(id, patch).await?;

                let workflow = self.workflow.clone();
                let id = id.clone();
                let requested_change = text.to_string();
                tokio::spawn(async move {
                    if let Err(e) = workflow.run_modification(&id, &requested_change).await {
                        warn!(session_id = %id, error = %e, "modification workflow task failed");
                    }
                });
            }
            ActionTag::ResumeModification => {
                // §9 open question: re-enter only from `awaiting_feedback` on a
                // classified confirmation; replay the original request text
                // stashed on confirmation rather than guessing at the
                // confirmation phrase itself.
                let session = self.store.get(id).await?;
                let requested_change = session
                    .and_then(|s| s.context.get("pending_modification").and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_else(|| text.to_string());
                let mut clear_patch = HashMap::new();
                clear_patch.insert("pending_modification".to_string(), Value::Null);
                self.store.update_context(id, clear_patch).await?;
                let workflow = self.workflow.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    if let Err(e) = workflow.run_modification(&id, &requested_change).await {
                        warn!(session_id = %id, error = %e, "resumed modification workflow task failed");
                    }
                });
            }
            _ => {}
        }
        Ok(())
    }

    pub fn context(&self) -> &Arc<ContextManager<S>> {
        &self.context
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn state(&self) -> &Arc<StateTracker<S>> {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_bus::FakeEventPublisher;
    use conduit_core::ConversationState;
    use conduit_mcp::McpClient;
    use conduit_sessions::FakeSessionStore;
    use std::time::Duration;

    fn coordinator() -> Coordinator<FakeSessionStore, FakeEventPublisher> {
        let store = Arc::new(FakeSessionStore::new());
        let context = Arc::new(ContextManager::new(store.clone()));
        let classifier = Arc::new(IntentClassifier::new(store.clone(), context.clone()));
        let state = Arc::new(StateTracker::new(store.clone(), context.clone()));
        let mcp = Arc::new(McpClient::new("http://127.0.0.1:1", Duration::from_millis(50)));
        let bus = Arc::new(FakeEventPublisher::new());
        let workflow = Arc::new(WorkflowDriver::new(context.clone(), state.clone(), mcp, bus.clone()));
        Coordinator::new(store, context, classifier, state, workflow, bus, Arc::new(crate::response::TemplatedResponder))
    }

    #[tokio::test]
    async fn greeting_stays_in_initial_state_with_no_workflow() {
        let c = coordinator();
        let result = c.handle_message("Hello!", None, None).await.unwrap();
        assert_eq!(result.intent, Intent::Greeting);
        assert_eq!(result.state_info.conversation_state, ConversationState::Initial);

        let history = c.store().history(&SessionId::from(result.session_id.as_str()), None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn create_trigger_moves_to_gathering_requirements() {
        let c = coordinator();
        let result = c
            .handle_message("Create a new web application with user authentication", None, None)
            .await
            .unwrap();
        assert_eq!(result.intent, Intent::ProjectCreate);
        assert_eq!(result.state_info.conversation_state, ConversationState::GatheringRequirements);
        assert!(!result.state_info.has_project);
    }

    #[tokio::test]
    async fn start_modification_stashes_pending_modification_before_workflow_runs() {
        let c = coordinator();
        let id = SessionId::from("stash-1");
        c.store().create(&id).await.unwrap();
        c.context()
            .initialize_project(&id, "proj-stash", Some("web_app".to_string()), HashMap::new())
            .await
            .unwrap();

        let result = c.handle_message("please add a dark mode toggle", Some(id.clone()), None).await.unwrap();
        assert_eq!(result.intent, Intent::ProjectModify);

        let session = c.store().get(&id).await.unwrap().unwrap();
        assert_eq!(
            session.context.get("pending_modification").and_then(Value::as_str),
            Some("please add a dark mode toggle")
        );
    }

    #[tokio::test]
    async fn invalid_admin_transition_is_rejected_without_events() {
        let c = coordinator();
        let result = c.handle_message("Hello!", None, None).await.unwrap();
        let id = SessionId::from(result.session_id.as_str());
        let ok = c.state().transition_conversation(&id, ConversationState::Completed).await.unwrap();
        assert!(!ok);
        assert_eq!(c.state().conversation_state(&id).await.unwrap(), ConversationState::Initial);
    }
}
