use std::sync::Arc;

use tracing::{error, info};

use roost_domain::booking::BookingStatus;
use roost_domain::saga::{payload, SagaEvent, SagaEventType};
use roost_store::BookingStore;

use crate::error::SagaError;
use crate::publisher::SagaPublisher;

/// Saga participant that advances the booking row to its terminal status.
/// On success it publishes the next event in the chain; on failure it
/// publishes a compensation event and reports the failure to the retry
/// wrapper.
#[derive(Clone)]
pub struct BookingEventHandler {
    bookings: Arc<dyn BookingStore>,
    publisher: SagaPublisher,
}

impl BookingEventHandler {
    pub fn new(bookings: Arc<dyn BookingStore>, publisher: SagaPublisher) -> Self {
        Self { bookings, publisher }
    }

    pub async fn handle_confirm_request(&self, event: &SagaEvent) -> Result<(), SagaError> {
        match self.apply_status(event, BookingStatus::Confirmed).await {
            Ok(()) => {
                self.publisher
                    .publish(
                        SagaEventType::BookingConfirmed,
                        "CONFIRM_BOOKING",
                        event.payload.clone(),
                    )
                    .await
            }
            Err(e) => {
                self.compensate(event).await;
                Err(e)
            }
        }
    }

    pub async fn handle_cancel_request(&self, event: &SagaEvent) -> Result<(), SagaError> {
        match self.apply_status(event, BookingStatus::Cancelled).await {
            Ok(()) => {
                self.publisher
                    .publish(
                        SagaEventType::BookingCancelled,
                        "CANCEL_BOOKING",
                        event.payload.clone(),
                    )
                    .await
            }
            Err(e) => {
                self.compensate(event).await;
                Err(e)
            }
        }
    }

    /// Safe to reprocess: setting an already-set status again is a no-op at
    /// the row level.
    async fn apply_status(&self, event: &SagaEvent, status: BookingStatus) -> Result<(), SagaError> {
        let booking_id = event.payload_i64(payload::BOOKING_ID)?;
        let updated = self.bookings.set_status(booking_id, status).await?;
        if !updated {
            return Err(SagaError::NotFound(format!("booking {booking_id}")));
        }
        info!("booking {booking_id} advanced to {status}");
        Ok(())
    }

    async fn compensate(&self, event: &SagaEvent) {
        if let Err(e) = self
            .publisher
            .publish(
                SagaEventType::BookingCompensated,
                "COMPENSATE_BOOKING",
                event.payload.clone(),
            )
            .await
        {
            error!("failed to publish compensation for {event}: {e}");
        }
    }
}
