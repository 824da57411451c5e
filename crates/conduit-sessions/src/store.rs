use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conduit_core::config::DEFAULT_SESSION_TTL_SECS;
use conduit_core::{Message, Session, SessionId};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{instrument, warn};

use crate::error::{Result, SessionError};

const ACTIVE_SET_KEY: &str = "sessions:active";
const LOCK_TTL_MS: u64 = 2_000;

fn session_key(id: &SessionId) -> String {
    format!("session:{}", id)
}

fn lock_key(id: &SessionId) -> String {
    format!("session:{}:lock", id)
}

/// Durable per-session store (§4.A). All other components observe or
/// mutate Session records only through this trait.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, id: &SessionId) -> Result<Session>;
    async fn get(&self, id: &SessionId) -> Result<Option<Session>>;
    async fn save(&self, session: &Session) -> Result<()>;
    async fn delete(&self, id: &SessionId) -> Result<()>;
    async fn list_active(&self) -> Result<Vec<SessionId>>;
    async fn append_message(&self, id: &SessionId, msg: Message) -> Result<()>;
    async fn update_context(
        &self,
        id: &SessionId,
        patch: HashMap<String, serde_json::Value>,
    ) -> Result<()>;
    async fn history(&self, id: &SessionId, limit: Option<usize>) -> Result<Vec<Message>>;
    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<usize>;
}

/// Redis-backed implementation. `session:{id}` holds the Session serialized
/// as one JSON blob with a 24h TTL refreshed on every save; `sessions:active`
/// is a Redis set of live ids (§C).
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
    ttl_secs: i64,
}

impl RedisSessionStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(session_key(id)).await?;
        match raw {
            None => Ok(None),
            Some(blob) => {
                let session: Session = serde_json::from_str(&blob)
                    .map_err(|source| SessionError::Corrupt { id: id.to_string(), source })?;
                Ok(Some(session))
            }
        }
    }

    async fn store(&self, session: &Session) -> Result<()> {
        let mut conn = self.conn.clone();
        let blob = serde_json::to_string(session)
            .map_err(|source| SessionError::Corrupt { id: session.id.to_string(), source })?;
        let _: () = conn.set_ex(session_key(&session.id), blob, self.ttl_secs as u64).await?;
        let _: () = conn.sadd(ACTIVE_SET_KEY, session.id.to_string()).await?;
        Ok(())
    }

    /// Short-lived `SET NX` advisory lock guarding the read-mutate-write
    /// cycle in `append_message` (§C) — the one place a compare-and-set
    /// matters, everywhere else last-write-wins is acceptable (§5).
    async fn with_lock<F, Fut, T>(&self, id: &SessionId, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut conn = self.conn.clone();
        let key = lock_key(id);
        let mut attempts = 0;
        loop {
            let acquired: bool = redis::cmd("SET")
                .arg(&key)
                .arg("1")
                .arg("NX")
                .arg("PX")
                .arg(LOCK_TTL_MS)
                .query_async::<Option<String>>(&mut conn)
                .await?
                .is_some();
            if acquired {
                break;
            }
            attempts += 1;
            if attempts > 50 {
                warn!(session_id = %id, "append_message lock contention exceeded retry budget");
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        let result = f().await;
        let _: std::result::Result<(), _> = conn.del::<_, ()>(&key).await;
        result
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    #[instrument(skip(self), fields(session_id = %id))]
    async fn create(&self, id: &SessionId) -> Result<Session> {
        if let Some(existing) = self.load(id).await? {
            return Ok(existing);
        }
        let session = Session::new(id.clone());
        self.store(&session).await?;
        Ok(session)
    }

    #[instrument(skip(self), fields(session_id = %id))]
    async fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        let mut session = match self.load(id).await? {
            Some(s) => s,
            None => return Ok(None),
        };
        session.touch();
        self.store(&session).await?;
        Ok(Some(session))
    }

    #[instrument(skip(self, session), fields(session_id = %session.id))]
    async fn save(&self, session: &Session) -> Result<()> {
        let mut session = session.clone();
        session.touch();
        self.store(&session).await
    }

    #[instrument(skip(self), fields(session_id = %id))]
    async fn delete(&self, id: &SessionId) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(session_key(id)).await?;
        let _: () = conn.srem(ACTIVE_SET_KEY, id.to_string()).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_active(&self) -> Result<Vec<SessionId>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(ACTIVE_SET_KEY).await?;
        Ok(ids.into_iter().map(SessionId::from).collect())
    }

    #[instrument(skip(self, msg), fields(session_id = %id, message_id = %msg.id))]
    async fn append_message(&self, id: &SessionId, msg: Message) -> Result<()> {
        let id = id.clone();
        self.with_lock(&id, || async {
            let mut session = match self.load(&id).await? {
                Some(s) => s,
                None => Session::new(id.clone()),
            };
            if session.messages.iter().any(|m| m.id == msg.id) {
                return Ok(());
            }
            session.messages.push(msg);
            session.touch();
            self.store(&session).await
        })
        .await
    }

    #[instrument(skip(self, patch), fields(session_id = %id))]
    async fn update_context(
        &self,
        id: &SessionId,
        patch: HashMap<String, serde_json::Value>,
    ) -> Result<()> {
        let mut session = self
            .load(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.context.extend(patch);
        session.touch();
        self.store(&session).await
    }

    #[instrument(skip(self), fields(session_id = %id, limit))]
    async fn history(&self, id: &SessionId, limit: Option<usize>) -> Result<Vec<Message>> {
        let session = self
            .load(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        match limit {
            Some(n) if n < session.messages.len() => {
                Ok(session.messages[session.messages.len() - n..].to_vec())
            }
            _ => Ok(session.messages),
        }
    }

    #[instrument(skip(self), fields(older_than = %older_than))]
    async fn cleanup(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let ids = self.list_active().await?;
        let mut removed = 0;
        for id in ids {
            if let Some(session) = self.load(&id).await? {
                if session.last_activity < older_than {
                    self.delete(&id).await?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}
