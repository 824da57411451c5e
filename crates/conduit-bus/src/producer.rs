use std::time::Duration;

use async_trait::async_trait;
use conduit_core::Event;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::{BusError, Result};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything downstream of the bus needs from a producer (§4.G). The
/// Workflow Driver and Coordinator depend on this trait, not the
/// Kafka-backed type directly, so tests can swap in `FakeEventPublisher`
/// the same way store-dependent components swap in `FakeSessionStore`.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn send_event(
        &self,
        event_type: String,
        data: Value,
        key: Option<String>,
        session_id: Option<&str>,
    ) -> Result<()>;

    async fn conversation_message_received(&self, session_id: &str) -> Result<()> {
        self.send_event(
            "conversation.message.received".to_string(),
            serde_json::json!({}),
            Some(session_id.to_string()),
            Some(session_id),
        )
        .await
    }

    async fn conversation_response_generated(&self, session_id: &str) -> Result<()> {
        self.send_event(
            "conversation.response.generated".to_string(),
            serde_json::json!({}),
            Some(session_id.to_string()),
            Some(session_id),
        )
        .await
    }

    async fn project_event(&self, event_type: &str, project_id: &str, data: Value) -> Result<()> {
        self.send_event(event_type.to_string(), data, Some(project_id.to_string()), None).await
    }

    async fn progress_update(&self, session_id: &str, progress: f64, message: &str) -> Result<()> {
        self.send_event(
            "progress.update".to_string(),
            serde_json::json!({ "progress": progress, "message": message }),
            Some(session_id.to_string()),
            Some(session_id),
        )
        .await
    }

    async fn error_event(&self, session_id: &str, error_type: &str, message: &str) -> Result<()> {
        self.send_event(
            "error".to_string(),
            serde_json::json!({ "errorType": error_type, "message": message }),
            Some(session_id.to_string()),
            Some(session_id),
        )
        .await
    }
}

/// Publishes lifecycle events; topic is a pure function of the type
/// prefix (§4.G, O-5), resolved by `Event::topic`.
pub struct EventProducer {
    producer: FutureProducer,
    source: String,
}

impl EventProducer {
    pub fn new(bootstrap_servers: &str, source: impl Into<String>) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(BusError::Kafka)?;
        Ok(Self { producer, source: source.into() })
    }
}

#[async_trait]
impl EventPublisher for EventProducer {
    /// `send_event(type, data, key?, session_id?)` — the core entry point
    /// every convenience wrapper on the trait calls into.
    #[instrument(skip(self, data), fields(event_type, key))]
    async fn send_event(
        &self,
        event_type: String,
        mut data: Value,
        key: Option<String>,
        session_id: Option<&str>,
    ) -> Result<()> {
        if let Some(sid) = session_id {
            if let Value::Object(ref mut map) = data {
                map.insert("sessionId".to_string(), Value::String(sid.to_string()));
            }
        }

        let event = Event::new(event_type, self.source.clone(), data);
        let topic = event.topic();
        let payload = serde_json::to_string(&event)?;
        let partition_key = key.unwrap_or_default();

        debug!(topic, event_type = %event.event_type, "publishing event");

        let record = FutureRecord::to(topic).payload(&payload).key(&partition_key);
        self.producer
            .send(record, SEND_TIMEOUT)
            .await
            .map_err(|(e, _msg)| BusError::Kafka(e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_routing_matches_spec_table() {
        let e = Event::new("project.updated", "conduit", serde_json::json!({}));
        assert_eq!(e.topic(), "project-updates");
        let e = Event::new("validation.complete", "conduit", serde_json::json!({}));
        assert_eq!(e.topic(), "project-updates");
        let e = Event::new("conversation.message.received", "conduit", serde_json::json!({}));
        assert_eq!(e.topic(), "conversation-events");
        let e = Event::new("progress.update", "conduit", serde_json::json!({}));
        assert_eq!(e.topic(), "conversation-events");
    }
}
