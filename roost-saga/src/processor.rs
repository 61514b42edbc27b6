use async_trait::async_trait;
use tracing::info;

use roost_domain::saga::{payload, SagaEvent, SagaEventType};

use crate::error::SagaError;
use crate::handlers::{AvailabilityEventHandler, BookingEventHandler};

#[async_trait]
pub trait EventProcessor: Send + Sync {
    async fn process(&self, event: &SagaEvent) -> Result<(), SagaError>;
}

/// Pure dispatch from event type to handler. Holds no state of its own, so
/// redelivery through retry or DLQ replay re-enters it safely.
pub struct SagaProcessor {
    booking_handler: BookingEventHandler,
    availability_handler: AvailabilityEventHandler,
}

impl SagaProcessor {
    pub fn new(
        booking_handler: BookingEventHandler,
        availability_handler: AvailabilityEventHandler,
    ) -> Self {
        Self {
            booking_handler,
            availability_handler,
        }
    }
}

#[async_trait]
impl EventProcessor for SagaProcessor {
    async fn process(&self, event: &SagaEvent) -> Result<(), SagaError> {
        info!("processing saga event {event}");
        match event.event_type {
            SagaEventType::BookingCreated => {
                info!(
                    "booking created: {}",
                    event.payload.get(payload::BOOKING_ID).map(String::as_str).unwrap_or("?")
                );
                Ok(())
            }
            SagaEventType::BookingConfirmRequested => {
                self.booking_handler.handle_confirm_request(event).await
            }
            SagaEventType::BookingCancelRequested => {
                self.booking_handler.handle_cancel_request(event).await
            }
            SagaEventType::BookingConfirmed => {
                self.availability_handler.handle_booking_confirmed(event).await
            }
            SagaEventType::BookingCancelled => {
                self.availability_handler.handle_booking_cancelled(event).await
            }
            SagaEventType::BookingCompensated => {
                info!(
                    "booking compensated: {}",
                    event.payload.get(payload::BOOKING_ID).map(String::as_str).unwrap_or("?")
                );
                self.availability_handler.handle_booking_compensated(event).await
            }
        }
    }
}
