pub mod consumer;
pub mod error;
pub mod fake;
pub mod producer;
pub mod registry;

pub use consumer::EventConsumer;
pub use error::{BusError, Result};
pub use fake::FakeEventPublisher;
pub use producer::{EventProducer, EventPublisher};
pub use registry::{HandlerFn, HandlerFuture, HandlerRegistry};
