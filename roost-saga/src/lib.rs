pub mod concurrency;
pub mod consumer;
pub mod dlq;
pub mod error;
pub mod handlers;
pub mod processor;
pub mod publisher;
pub mod retry;

pub use concurrency::LockManager;
pub use consumer::SagaConsumer;
pub use dlq::{run_dlq_monitor, DeadLetterPublisher, DeadLetterQueue};
pub use error::SagaError;
pub use processor::{EventProcessor, SagaProcessor};
pub use publisher::{booking_payload, SagaPublisher};
pub use retry::RetryingProcessor;
