use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use roost_domain::saga::SagaEvent;
use roost_store::config::SagaConfig;

use crate::dlq::DeadLetterPublisher;
use crate::processor::EventProcessor;

/// The single retry boundary of the saga: bounded attempts with exponential
/// backoff, then a dead-letter hand-off. Handlers never retry on their own.
pub struct RetryingProcessor {
    processor: Arc<dyn EventProcessor>,
    dlq: DeadLetterPublisher,
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryingProcessor {
    pub fn new(
        processor: Arc<dyn EventProcessor>,
        dlq: DeadLetterPublisher,
        saga_config: &SagaConfig,
    ) -> Self {
        Self {
            processor,
            dlq,
            max_attempts: saga_config.max_attempts.max(1),
            base_delay: Duration::from_millis(saga_config.base_delay_ms),
        }
    }

    /// A dead-lettered event is a handled outcome, not a crash: this never
    /// returns an error to the poller.
    pub async fn process_with_retry(&self, event: &SagaEvent) {
        let mut last_error = String::new();
        for attempt in 1..=self.max_attempts {
            match self.processor.process(event).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(
                        "saga event processing failed on attempt {attempt}/{} for {event}: {e}",
                        self.max_attempts
                    );
                    last_error = e.to_string();
                    if attempt < self.max_attempts {
                        // base, 2*base, 4*base, ...
                        let delay = self.base_delay * 2u32.pow(attempt - 1);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        error!(
            "all {} attempts failed for {event}; moving to DLQ",
            self.max_attempts
        );
        self.dlq.publish(event, &last_error, self.max_attempts).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SagaError;
    use async_trait::async_trait;
    use roost_domain::saga::{DeadLetterEvent, SagaEventType};
    use roost_store::memory::MemoryQueue;
    use roost_store::EventQueue;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    struct FlakyProcessor {
        attempts: Mutex<Vec<Instant>>,
        succeed_on: Option<u32>,
    }

    impl FlakyProcessor {
        fn failing() -> Self {
            Self {
                attempts: Mutex::new(Vec::new()),
                succeed_on: None,
            }
        }

        fn succeeding_on(attempt: u32) -> Self {
            Self {
                attempts: Mutex::new(Vec::new()),
                succeed_on: Some(attempt),
            }
        }
    }

    #[async_trait]
    impl EventProcessor for FlakyProcessor {
        async fn process(&self, _event: &SagaEvent) -> Result<(), SagaError> {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(Instant::now());
            let attempt = attempts.len() as u32;
            if self.succeed_on.is_some_and(|n| attempt >= n) {
                Ok(())
            } else {
                Err(SagaError::Processing("boom".into()))
            }
        }
    }

    fn event() -> SagaEvent {
        SagaEvent::new(SagaEventType::BookingConfirmed, "CONFIRM_BOOKING", HashMap::new())
    }

    fn config() -> SagaConfig {
        SagaConfig {
            max_attempts: 3,
            base_delay_ms: 1000,
            pop_timeout_secs: 1,
            poll_backoff_ms: 500,
            dlq_monitor_interval_secs: 60,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_back_off_exponentially_then_dead_letter() {
        let queue = Arc::new(MemoryQueue::new());
        let dlq = DeadLetterPublisher::new(Arc::clone(&queue) as Arc<dyn EventQueue>, "dlq:test");
        let processor = Arc::new(FlakyProcessor::failing());
        let retrying = RetryingProcessor::new(Arc::clone(&processor) as Arc<dyn EventProcessor>, dlq, &config());

        let event = event();
        retrying.process_with_retry(&event).await;

        let attempts = processor.attempts.lock().unwrap().clone();
        assert_eq!(attempts.len(), 3);
        // strictly increasing delays: base, then 2*base
        assert_eq!(attempts[1] - attempts[0], Duration::from_millis(1000));
        assert_eq!(attempts[2] - attempts[1], Duration::from_millis(2000));

        assert_eq!(queue.len("dlq:test").await.unwrap(), 1);
        let raw = queue.try_pop_front("dlq:test").await.unwrap().unwrap();
        let dead: DeadLetterEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(dead.attempt_count, 3);
        assert_eq!(dead.original_event.saga_id, event.saga_id);
        assert!(dead.error_message.contains("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn success_before_exhaustion_never_dead_letters() {
        let queue = Arc::new(MemoryQueue::new());
        let dlq = DeadLetterPublisher::new(Arc::clone(&queue) as Arc<dyn EventQueue>, "dlq:test");
        let processor = Arc::new(FlakyProcessor::succeeding_on(2));
        let retrying = RetryingProcessor::new(Arc::clone(&processor) as Arc<dyn EventProcessor>, dlq, &config());

        retrying.process_with_retry(&event()).await;

        assert_eq!(processor.attempts.lock().unwrap().len(), 2);
        assert_eq!(queue.len("dlq:test").await.unwrap(), 0);
    }
}
