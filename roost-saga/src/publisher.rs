use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use roost_domain::saga::{payload, SagaEvent, SagaEventType};
use roost_store::EventQueue;

use crate::error::SagaError;

/// Appends serialized saga events to the tail of the durable queue, stamping
/// a fresh correlation id per publish.
#[derive(Clone)]
pub struct SagaPublisher {
    queue: Arc<dyn EventQueue>,
    queue_name: String,
}

impl SagaPublisher {
    pub fn new(queue: Arc<dyn EventQueue>, queue_name: impl Into<String>) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
        }
    }

    pub async fn publish(
        &self,
        event_type: SagaEventType,
        step: &str,
        payload: HashMap<String, String>,
    ) -> Result<(), SagaError> {
        let event = SagaEvent::new(event_type, step, payload);
        let raw = serde_json::to_string(&event).map_err(roost_store::StoreError::from)?;
        self.queue.push_back(&self.queue_name, &raw).await?;
        debug!("published saga event {event}");
        Ok(())
    }
}

/// The standard self-contained payload carried through a booking saga chain.
pub fn booking_payload(
    booking_id: i64,
    property_id: i64,
    user_id: i64,
    check_in: NaiveDate,
    check_out: NaiveDate,
) -> HashMap<String, String> {
    HashMap::from([
        (payload::BOOKING_ID.to_string(), booking_id.to_string()),
        (payload::PROPERTY_ID.to_string(), property_id.to_string()),
        (payload::USER_ID.to_string(), user_id.to_string()),
        (payload::CHECK_IN_DATE.to_string(), check_in.to_string()),
        (payload::CHECK_OUT_DATE.to_string(), check_out.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use roost_store::memory::MemoryQueue;

    #[tokio::test]
    async fn publish_appends_a_self_contained_event() {
        let queue = Arc::new(MemoryQueue::new());
        let publisher = SagaPublisher::new(Arc::clone(&queue) as Arc<dyn EventQueue>, "saga:test");

        let payload = booking_payload(
            42,
            7,
            3,
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 4).unwrap(),
        );
        publisher
            .publish(SagaEventType::BookingConfirmRequested, "CONFIRM_BOOKING", payload)
            .await
            .unwrap();

        let raw = queue.try_pop_front("saga:test").await.unwrap().unwrap();
        let event: SagaEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(event.event_type, SagaEventType::BookingConfirmRequested);
        assert_eq!(event.payload_i64(payload::BOOKING_ID).unwrap(), 42);
        assert_eq!(event.payload_str(payload::CHECK_OUT_DATE).unwrap(), "2025-06-04");
        assert!(!event.saga_id.is_empty());
    }
}
