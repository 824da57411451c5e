use std::collections::HashMap;
use std::sync::Arc;

use conduit_core::{Entities, Modification, ProjectContext, ProjectState, SessionId};
use conduit_sessions::SessionStore;
use serde::Serialize;
use tracing::instrument;

use crate::error::{ContextError, Result};
use crate::vocab::{FEATURES, PROJECT_TYPES, TECHNOLOGIES};

const HISTORY_WINDOW: usize = 5;
const MESSAGE_TRUNCATE_LEN: usize = 100;

/// Summary of a session's ProjectContext, the shape `relevant_context`
/// embeds (§4.B).
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub project_type: Option<String>,
    pub current_state: HashMap<String, serde_json::Value>,
    pub requirements: HashMap<String, serde_json::Value>,
    pub modification_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelevantContext {
    pub session_id: String,
    pub message_count: usize,
    pub project: Option<ProjectSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_messages: Option<Vec<String>>,
}

/// Derives prompt/decision context from a session (§4.B). Holds no state
/// of its own; every operation reads through the Session Store.
pub struct ContextManager<S: SessionStore> {
    store: Arc<S>,
}

impl<S: SessionStore> ContextManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<S> {
        self.store.clone()
    }

    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn project_context(&self, id: &SessionId) -> Result<Option<ProjectContext>> {
        let session = self.store.get(id).await?;
        Ok(session.and_then(|s| s.project))
    }

    /// Materializes a session's ProjectContext the first time a creation
    /// workflow mints a `project_id`. A no-op if one already exists —
    /// `project_id`, once set, never changes (invariant 2 / O-4).
    #[instrument(skip(self, requirements), fields(session_id = %id, project_id))]
    pub async fn initialize_project(
        &self,
        id: &SessionId,
        project_id: &str,
        project_type: Option<String>,
        requirements: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let mut session = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ContextError::Session(conduit_sessions::SessionError::NotFound(id.to_string())))?;
        if session.project.is_some() {
            return Ok(());
        }
        session.project = Some(ProjectContext {
            project_id: project_id.to_string(),
            project_type,
            current_state: HashMap::new(),
            requirements,
            modifications: Vec::new(),
            state: ProjectState::Planning,
        });
        self.store.save(&session).await?;
        Ok(())
    }

    #[instrument(skip(self, patch), fields(session_id = %id))]
    pub async fn update_project_state(
        &self,
        id: &SessionId,
        patch: ProjectState,
    ) -> Result<()> {
        let mut session = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ContextError::Session(conduit_sessions::SessionError::NotFound(id.to_string())))?;
        let project = session.project.as_mut().ok_or(ContextError::NoProject)?;
        project.state = patch;
        self.store.save(&session).await?;
        Ok(())
    }

    /// Merges fields into a session's `ProjectContext.current_state` (§4.G
    /// `project.updated`/`validation.complete` handlers patch this map
    /// rather than replacing it wholesale).
    #[instrument(skip(self, patch), fields(session_id = %id))]
    pub async fn patch_current_state(
        &self,
        id: &SessionId,
        patch: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let mut session = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ContextError::Session(conduit_sessions::SessionError::NotFound(id.to_string())))?;
        let project = session.project.as_mut().ok_or(ContextError::NoProject)?;
        project.current_state.extend(patch);
        self.store.save(&session).await?;
        Ok(())
    }

    #[instrument(skip(self, modification), fields(session_id = %id))]
    pub async fn add_modification(&self, id: &SessionId, modification: Modification) -> Result<()> {
        let mut session = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ContextError::Session(conduit_sessions::SessionError::NotFound(id.to_string())))?;
        let project = session.project.as_mut().ok_or(ContextError::NoProject)?;
        project.modifications.push(modification);
        self.store.save(&session).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(session_id = %id, include_history))]
    pub async fn relevant_context(&self, id: &SessionId, include_history: bool) -> Result<RelevantContext> {
        let session = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ContextError::Session(conduit_sessions::SessionError::NotFound(id.to_string())))?;

        let project = session.project.as_ref().map(|p| ProjectSummary {
            id: p.project_id.clone(),
            project_type: p.project_type.clone(),
            current_state: p.current_state.clone(),
            requirements: p.requirements.clone(),
            modification_count: p.modifications.len(),
        });

        let recent_messages = if include_history {
            Some(
                session
                    .messages
                    .iter()
                    .rev()
                    .take(HISTORY_WINDOW)
                    .map(|m| truncate(&m.content, MESSAGE_TRUNCATE_LEN))
                    .rev()
                    .collect(),
            )
        } else {
            None
        };

        Ok(RelevantContext {
            session_id: id.to_string(),
            message_count: session.messages.len(),
            project,
            recent_messages,
        })
    }

    /// Deterministic lexical entity pass over the fixed vocabularies
    /// (§4.B). Case-insensitive substring match; output is three sorted,
    /// de-duplicated lists — order-insensitive, satisfying R-3.
    pub fn extract_entities(&self, text: &str) -> Entities {
        let lower = text.to_lowercase();
        Entities {
            technologies: matches(&lower, TECHNOLOGIES),
            features: matches(&lower, FEATURES),
            project_types: matches(&lower, PROJECT_TYPES),
        }
    }
}

fn matches(lower_text: &str, vocab: &[&str]) -> Vec<String> {
    let mut found: Vec<String> = vocab
        .iter()
        .filter(|token| lower_text.contains(*token))
        .map(|s| s.to_string())
        .collect();
    found.sort();
    found.dedup();
    found
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_sessions::FakeSessionStore;

    fn manager() -> ContextManager<FakeSessionStore> {
        ContextManager::new(Arc::new(FakeSessionStore::new()))
    }

    #[test]
    fn extract_entities_is_sorted_and_deduped() {
        let mgr = manager();
        let entities = mgr.extract_entities("Build a React and react web app with authentication and authentication");
        assert_eq!(entities.technologies, vec!["react".to_string()]);
        assert_eq!(entities.features, vec!["authentication".to_string()]);
        assert!(entities.project_types.contains(&"web app".to_string()));
    }

    #[test]
    fn extract_entities_order_insensitive() {
        let mgr = manager();
        let a = mgr.extract_entities("redis and kafka and docker");
        let b = mgr.extract_entities("docker and kafka and redis");
        assert_eq!(a.technologies, b.technologies);
    }

    #[tokio::test]
    async fn relevant_context_without_project() {
        let store = Arc::new(FakeSessionStore::new());
        let id = SessionId::from("ctx-1");
        store.create(&id).await.unwrap();
        let mgr = ContextManager::new(store);
        let ctx = mgr.relevant_context(&id, false).await.unwrap();
        assert!(ctx.project.is_none());
        assert!(ctx.recent_messages.is_none());
        assert_eq!(ctx.message_count, 0);
    }

    #[tokio::test]
    async fn patch_current_state_merges_into_existing_project() {
        let store = Arc::new(FakeSessionStore::new());
        let id = SessionId::from("ctx-2");
        store.create(&id).await.unwrap();
        let mgr = ContextManager::new(store);
        mgr.initialize_project(&id, "proj-9", Some("web_app".to_string()), HashMap::new()).await.unwrap();

        let mut patch = HashMap::new();
        patch.insert("last_validation".to_string(), serde_json::json!({ "status": "ok" }));
        mgr.patch_current_state(&id, patch).await.unwrap();

        let project = mgr.project_context(&id).await.unwrap().unwrap();
        assert_eq!(project.current_state.get("last_validation"), Some(&serde_json::json!({ "status": "ok" })));
    }
}
