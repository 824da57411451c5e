use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conduit_core::{Message, Session, SessionId};

use crate::error::{Result, SessionError};
use crate::store::SessionStore;

/// In-memory `SessionStore` for tests of components that only need a
/// Session Store collaborator (context, state, workflow, coordinator) —
/// the same role hand-rolled fakes play in this codebase's other test
/// doubles, but generic over the trait instead of baked into one crate.
#[derive(Default)]
pub struct FakeSessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl FakeSessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for FakeSessionStore {
    async fn create(&self, id: &SessionId) -> Result<Session> {
        let mut guard = self.sessions.lock().unwrap();
        if let Some(existing) = guard.get(&id.0) {
            return Ok(existing.clone());
        }
        let session = Session::new(id.clone());
        guard.insert(id.0.clone(), session.clone());
        Ok(session)
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        let mut guard = self.sessions.lock().unwrap();
        if let Some(session) = guard.get_mut(&id.0) {
            session.touch();
            return Ok(Some(session.clone()));
        }
        Ok(None)
    }

    async fn save(&self, session: &Session) -> Result<()> {
        let mut session = session.clone();
        session.touch();
        self.sessions.lock().unwrap().insert(session.id.0.clone(), session);
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        self.sessions.lock().unwrap().remove(&id.0);
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<SessionId>> {
        Ok(self.sessions.lock().unwrap().keys().cloned().map(SessionId::from).collect())
    }

    async fn append_message(&self, id: &SessionId, msg: Message) -> Result<()> {
        let mut guard = self.sessions.lock().unwrap();
        let session = guard.entry(id.0.clone()).or_insert_with(|| Session::new(id.clone()));
        if session.messages.iter().any(|m| m.id == msg.id) {
            return Ok(());
        }
        session.messages.push(msg);
        session.touch();
        Ok(())
    }

    async fn update_context(
        &self,
        id: &SessionId,
        patch: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let mut guard = self.sessions.lock().unwrap();
        let session = guard
            .get_mut(&id.0)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.context.extend(patch);
        session.touch();
        Ok(())
    }

    async fn history(&self, id: &SessionId, limit: Option<usize>) -> Result<Vec<Message>> {
        let guard = self.sessions.lock().unwrap();
        let session = guard
            .get(&id.0)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        match limit {
            Some(n) if n < session.messages.len() => {
                Ok(session.messages[session.messages.len() - n..].to_vec())
            }
            _ => Ok(session.messages.clone()),
        }
    }

    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let mut guard = self.sessions.lock().unwrap();
        let stale: Vec<String> = guard
            .iter()
            .filter(|(_, s)| s.last_activity < older_than)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &stale {
            guard.remove(key);
        }
        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::Role;

    #[tokio::test]
    async fn append_message_is_idempotent() {
        let store = FakeSessionStore::new();
        let id = SessionId::from("s-1");
        let msg = Message::new(Role::User, "hello");
        store.append_message(&id, msg.clone()).await.unwrap();
        store.append_message(&id, msg.clone()).await.unwrap();
        let history = store.history(&id, None).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let store = FakeSessionStore::new();
        let id = SessionId::from("s-2");
        let session = store.create(&id).await.unwrap();
        store.save(&session).await.unwrap();
        let fetched = store.get(&id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
    }

    #[tokio::test]
    async fn list_active_reflects_created_sessions() {
        let store = FakeSessionStore::new();
        store.create(&SessionId::from("a")).await.unwrap();
        store.create(&SessionId::from("b")).await.unwrap();
        let mut active: Vec<String> = store.list_active().await.unwrap().into_iter().map(|s| s.0).collect();
        active.sort();
        assert_eq!(active, vec!["a".to_string(), "b".to_string()]);
    }
}
