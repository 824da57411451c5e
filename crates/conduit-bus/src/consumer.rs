use std::sync::Arc;

use conduit_core::Event;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{BusError, Result};
use crate::registry::HandlerRegistry;

/// Long-lived background worker that fans inbound lifecycle/external
/// events in to the handler registry (§4.G). Runs the same
/// `run(shutdown)` shape as this codebase's scheduler engine, swapped
/// from a `watch::Receiver<bool>` to a `CancellationToken`.
pub struct EventConsumer {
    consumer: StreamConsumer,
    registry: Arc<HandlerRegistry>,
}

impl EventConsumer {
    pub fn new(
        bootstrap_servers: &str,
        group_id: &str,
        topics: &[String],
        registry: Arc<HandlerRegistry>,
    ) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .create()
            .map_err(BusError::Kafka)?;

        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topic_refs).map_err(BusError::Kafka)?;

        Ok(Self { consumer, registry })
    }

    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("bus consumer started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("bus consumer shutting down");
                    break;
                }
                result = self.consumer.recv() => {
                    match result {
                        Ok(message) => self.handle_message(message),
                        Err(e) => warn!(error = %e, "kafka consumer recv error"),
                    }
                }
            }
        }
    }

    fn handle_message(&self, message: rdkafka::message::BorrowedMessage<'_>) {
        let Some(payload) = message.payload() else {
            debug!("skipping message with empty payload");
            return;
        };
        match serde_json::from_slice::<Event>(payload) {
            Ok(event) => self.registry.dispatch(event),
            Err(e) => {
                debug!(error = %e, "ignoring malformed event payload");
            }
        }
    }
}
