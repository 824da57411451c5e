use conduit_core::{ErrorKind, HasErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl HasErrorKind for BusError {
    fn kind(&self) -> ErrorKind {
        match self {
            BusError::Kafka(_) => ErrorKind::StoreUnavailable,
            BusError::Serialize(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, BusError>;
