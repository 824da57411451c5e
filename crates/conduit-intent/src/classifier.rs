use std::sync::Arc;

use conduit_context::ContextManager;
use conduit_core::{Intent, Role, SessionId};
use conduit_sessions::SessionStore;
use serde_json::{Map, Value};
use tracing::instrument;

use crate::patterns::{
    any_match, first_captured_project_type, first_modification_verb, GREETING, HELP,
    PROJECT_CREATE, PROJECT_INFO, PROJECT_MODIFY,
};

/// Intents the regex table covers, in the order the table lists them —
/// also the tie-break order for O-6 (it matches `Intent`'s own
/// declaration order for these five variants).
const REGEX_INTENTS: &[Intent] = &[
    Intent::ProjectCreate,
    Intent::ProjectModify,
    Intent::ProjectInfo,
    Intent::Help,
    Intent::Greeting,
];

#[derive(Debug, Clone)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f64,
    pub metadata: Map<String, Value>,
}

/// Deterministic, regex-driven intent classifier (§4.C). No LLM dependency
/// on the core path.
pub struct IntentClassifier<S: SessionStore> {
    store: Arc<S>,
    context: Arc<ContextManager<S>>,
}

impl<S: SessionStore> IntentClassifier<S> {
    pub fn new(store: Arc<S>, context: Arc<ContextManager<S>>) -> Self {
        Self { store, context }
    }

    #[instrument(skip(self, message), fields(session_id = %session_id))]
    pub async fn classify(&self, message: &str, session_id: &SessionId) -> conduit_sessions::Result<Classification> {
        let normalized = message.trim().to_lowercase();
        let session = self.store.get(session_id).await?;
        let has_project = session.as_ref().map(|s| s.project.is_some()).unwrap_or(false);

        let mut best: Option<(Intent, f64)> = None;
        for &intent in REGEX_INTENTS {
            let hit = match intent {
                Intent::ProjectCreate => any_match(&PROJECT_CREATE, &normalized),
                Intent::ProjectModify => any_match(&PROJECT_MODIFY, &normalized),
                Intent::ProjectInfo => any_match(&PROJECT_INFO, &normalized),
                Intent::Help => any_match(&HELP, &normalized),
                Intent::Greeting => any_match(&GREETING, &normalized),
                _ => false,
            };
            if !hit {
                continue;
            }
            let mut score = 0.7;
            if intent == Intent::ProjectModify && has_project {
                score += 0.2;
            }
            if intent == Intent::ProjectCreate && !has_project {
                score += 0.2;
            }
            best = match best {
                None => Some((intent, score)),
                Some((cur_intent, cur_score)) => {
                    if score > cur_score || (score == cur_score && intent.ordinal() < cur_intent.ordinal()) {
                        Some((intent, score))
                    } else {
                        Some((cur_intent, cur_score))
                    }
                }
            };
        }

        let entities = self.context.extract_entities(message);
        let mut metadata = Map::new();
        metadata.insert("entities".to_string(), serde_json::to_value(&entities).unwrap_or(Value::Null));

        let (intent, confidence) = match best {
            Some((intent, score)) => {
                match intent {
                    Intent::ProjectCreate => {
                        if let Some(pt) = first_captured_project_type(&normalized) {
                            metadata.insert("project_type".to_string(), Value::String(pt));
                        }
                    }
                    Intent::ProjectModify => {
                        if let Some(verb) = first_modification_verb(&normalized) {
                            metadata.insert("modification_verb".to_string(), Value::String(verb));
                        }
                    }
                    _ => {}
                }
                (intent, score.min(1.0))
            }
            None => self.fallback(session.as_ref(), message),
        };

        Ok(Classification { intent, confidence, metadata })
    }

    /// No regex fired (§4.C step 5). `previous` is the message before the
    /// one just appended for the current turn — the Coordinator appends
    /// the user message before calling `classify`.
    fn fallback(&self, session: Option<&conduit_core::Session>, message: &str) -> (Intent, f64) {
        let previous_was_assistant = session
            .map(|s| s.messages.iter().rev().nth(1).map(|m| m.role) == Some(Role::Assistant))
            .unwrap_or(false);
        if previous_was_assistant {
            return (Intent::Clarification, 0.6);
        }
        if message.split_whitespace().count() < 5 {
            return (Intent::Clarification, 0.5);
        }
        (Intent::Unknown, 0.3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_context::ContextManager;
    use conduit_core::Message;
    use conduit_sessions::FakeSessionStore;

    fn classifier() -> IntentClassifier<FakeSessionStore> {
        let store = Arc::new(FakeSessionStore::new());
        let context = Arc::new(ContextManager::new(store.clone()));
        IntentClassifier::new(store, context)
    }

    #[tokio::test]
    async fn greeting_scores_point_seven() {
        let c = classifier();
        let id = SessionId::from("t-1");
        c.store.create(&id).await.unwrap();
        let result = c.classify("Hello!", &id).await.unwrap();
        assert_eq!(result.intent, Intent::Greeting);
        assert!((result.confidence - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn project_create_boosted_without_existing_project() {
        let c = classifier();
        let id = SessionId::from("t-2");
        c.store.create(&id).await.unwrap();
        let result = c
            .classify("Create a new web application with user authentication", &id)
            .await
            .unwrap();
        assert_eq!(result.intent, Intent::ProjectCreate);
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn fallback_unknown_for_unmatched_long_message() {
        let c = classifier();
        let id = SessionId::from("t-3");
        c.store.create(&id).await.unwrap();
        let result = c
            .classify("the quick brown fox jumps over the lazy dog today", &id)
            .await
            .unwrap();
        assert_eq!(result.intent, Intent::Unknown);
        assert!((result.confidence - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn fallback_clarification_after_assistant_message() {
        let c = classifier();
        let id = SessionId::from("t-4");
        c.store.create(&id).await.unwrap();
        c.store
            .append_message(&id, Message::new(conduit_core::Role::Assistant, "What would you like to name it?"))
            .await
            .unwrap();
        c.store
            .append_message(&id, Message::new(conduit_core::Role::User, "xyz"))
            .await
            .unwrap();
        let result = c.classify("xyz", &id).await.unwrap();
        assert_eq!(result.intent, Intent::Clarification);
        assert!((result.confidence - 0.6).abs() < 1e-9);
    }
}
