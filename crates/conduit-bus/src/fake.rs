use std::sync::Mutex;

use async_trait::async_trait;
use conduit_core::Event;
use serde_json::Value;

use crate::error::Result;
use crate::producer::EventPublisher;

/// In-memory `EventPublisher` for tests of components that only need a
/// bus collaborator (workflow driver, coordinator) — the same role
/// `FakeSessionStore` plays for `SessionStore`.
#[derive(Default)]
pub struct FakeEventPublisher {
    published: Mutex<Vec<Event>>,
}

impl FakeEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for FakeEventPublisher {
    async fn send_event(
        &self,
        event_type: String,
        mut data: Value,
        _key: Option<String>,
        session_id: Option<&str>,
    ) -> Result<()> {
        if let Some(sid) = session_id {
            if let Value::Object(ref mut map) = data {
                map.insert("sessionId".to_string(), Value::String(sid.to_string()));
            }
        }
        let event = Event::new(event_type, "test".to_string(), data);
        self.published.lock().unwrap().push(event);
        Ok(())
    }
}
