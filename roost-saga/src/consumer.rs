use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use roost_domain::saga::SagaEvent;
use roost_store::config::SagaConfig;
use roost_store::EventQueue;

use crate::retry::RetryingProcessor;

/// Dedicated poller task: a bounded-wait pop from the head of the saga
/// queue, one event fully processed before the next pop. The bounded wait
/// keeps the loop live on an empty queue without busy-polling.
pub struct SagaConsumer {
    queue: Arc<dyn EventQueue>,
    queue_name: String,
    retry: Arc<RetryingProcessor>,
    pop_timeout: Duration,
    error_backoff: Duration,
}

impl SagaConsumer {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        queue_name: impl Into<String>,
        retry: Arc<RetryingProcessor>,
        saga_config: &SagaConfig,
    ) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            retry,
            pop_timeout: Duration::from_secs(saga_config.pop_timeout_secs),
            error_backoff: Duration::from_millis(saga_config.poll_backoff_ms),
        }
    }

    /// One poll iteration; returns whether an event was consumed. A payload
    /// that does not deserialize is logged and dropped so it can never stall
    /// the queue behind it.
    pub async fn poll_once(&self) -> bool {
        match self.queue.pop_front(&self.queue_name, self.pop_timeout).await {
            Ok(Some(raw)) => {
                match serde_json::from_str::<SagaEvent>(&raw) {
                    Ok(event) => self.retry.process_with_retry(&event).await,
                    Err(e) => error!("dropping malformed saga event: {e}"),
                }
                true
            }
            Ok(None) => false,
            Err(e) => {
                error!("error polling saga events: {e}");
                tokio::time::sleep(self.error_backoff).await;
                false
            }
        }
    }

    pub async fn run(self) {
        info!("saga consumer started on queue '{}'", self.queue_name);
        loop {
            self.poll_once().await;
        }
    }
}
