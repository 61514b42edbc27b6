use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{error, info, warn};

use roost_domain::saga::{payload, SagaEvent, SagaEventType};
use roost_store::{AvailabilityStore, BookOutcome};

use crate::concurrency::LockManager;
use crate::error::SagaError;
use crate::publisher::SagaPublisher;

struct StayRange {
    booking_id: i64,
    property_id: i64,
    user_id: i64,
    check_in: NaiveDate,
    last_night: NaiveDate,
}

/// Saga participant that mutates the availability rows and owns the release
/// of the availability lock once the write store durably reflects the
/// booking's fate.
#[derive(Clone)]
pub struct AvailabilityEventHandler {
    availability: Arc<dyn AvailabilityStore>,
    locks: LockManager,
    publisher: SagaPublisher,
}

impl AvailabilityEventHandler {
    pub fn new(
        availability: Arc<dyn AvailabilityStore>,
        locks: LockManager,
        publisher: SagaPublisher,
    ) -> Self {
        Self {
            availability,
            locks,
            publisher,
        }
    }

    /// Re-checks the range under the still-held availability lock, marks the
    /// slots booked, then releases the lock. A genuine conflict is an
    /// expected terminal outcome: it republishes a cancel request for this
    /// booking and succeeds (no retry can make the dates free).
    pub async fn handle_booking_confirmed(&self, event: &SagaEvent) -> Result<(), SagaError> {
        let stay = match parse_stay(event) {
            Ok(stay) => stay,
            Err(e) => return self.compensate_and_fail(event, e).await,
        };

        let outcome = match self
            .availability
            .book_range(stay.booking_id, stay.property_id, stay.check_in, stay.last_night)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return self.compensate_and_fail(event, e.into()).await,
        };

        match outcome {
            BookOutcome::Conflict => {
                warn!(
                    "dates for booking {} were taken before confirmation; cancelling it",
                    stay.booking_id
                );
                self.publisher
                    .publish(
                        SagaEventType::BookingCancelRequested,
                        "CANCEL_BOOKING",
                        event.payload.clone(),
                    )
                    .await?;
                Ok(())
            }
            BookOutcome::Booked(slots) => {
                info!(
                    "booking {} now holds {slots} slots of property {}",
                    stay.booking_id, stay.property_id
                );
                // DB permanently records the booking, the temporary lock can go
                self.locks
                    .release_booking_lock(
                        stay.property_id,
                        stay.check_in,
                        stay.last_night,
                        stay.user_id,
                    )
                    .await?;
                Ok(())
            }
        }
    }

    /// Clears the slots' booking references and releases the lock so others
    /// can book the dates.
    pub async fn handle_booking_cancelled(&self, event: &SagaEvent) -> Result<(), SagaError> {
        let stay = match parse_stay(event) {
            Ok(stay) => stay,
            Err(e) => return self.compensate_and_fail(event, e).await,
        };

        let result: Result<(), SagaError> = async {
            self.availability
                .release_range(stay.booking_id, stay.property_id, stay.check_in, stay.last_night)
                .await?;
            self.locks
                .release_booking_lock(stay.property_id, stay.check_in, stay.last_night, stay.user_id)
                .await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                info!("availability cleared after cancelling booking {}", stay.booking_id);
                Ok(())
            }
            Err(e) => self.compensate_and_fail(event, e).await,
        }
    }

    /// Best-effort rollback cleanup: release any held lock and leave the
    /// booking as last durably written. A failure here is reported to the
    /// retry wrapper and, on exhaustion, dead-letters this compensation
    /// event itself; it never publishes another compensation.
    pub async fn handle_booking_compensated(&self, event: &SagaEvent) -> Result<(), SagaError> {
        let stay = parse_stay(event)?;
        self.locks
            .release_booking_lock(stay.property_id, stay.check_in, stay.last_night, stay.user_id)
            .await?;
        info!("compensation cleanup done for booking {}", stay.booking_id);
        Ok(())
    }

    async fn compensate_and_fail(
        &self,
        event: &SagaEvent,
        cause: SagaError,
    ) -> Result<(), SagaError> {
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
        Err(cause)
    }
}

fn parse_stay(event: &SagaEvent) -> Result<StayRange, SagaError> {
    let check_out = event.payload_date(payload::CHECK_OUT_DATE)?;
    Ok(StayRange {
        booking_id: event.payload_i64(payload::BOOKING_ID)?,
        property_id: event.payload_i64(payload::PROPERTY_ID)?,
        user_id: event.payload_i64(payload::USER_ID)?,
        check_in: event.payload_date(payload::CHECK_IN_DATE)?,
        // the stay occupies nights up to the day before check-out
        last_night: check_out - chrono::Duration::days(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use roost_store::config::{KeySpace, LockConfig};
    use roost_store::memory::{MemoryAvailabilityStore, MemoryLockStore, MemoryQueue};
    use roost_store::{EventQueue, LockStore};
    use std::time::Duration;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    struct Fixture {
        locks: Arc<MemoryLockStore>,
        availability: Arc<MemoryAvailabilityStore>,
        queue: Arc<MemoryQueue>,
        handler: AvailabilityEventHandler,
    }

    fn fixture() -> Fixture {
        let locks = Arc::new(MemoryLockStore::new());
        let availability = Arc::new(MemoryAvailabilityStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let publisher = SagaPublisher::new(Arc::clone(&queue) as Arc<dyn EventQueue>, "saga:test");
        let manager = LockManager::new(
            Arc::clone(&locks) as Arc<dyn LockStore>,
            Arc::clone(&availability) as Arc<dyn AvailabilityStore>,
            KeySpace::default(),
            &LockConfig::default(),
        );
        let handler = AvailabilityEventHandler::new(
            Arc::clone(&availability) as Arc<dyn AvailabilityStore>,
            manager,
            publisher,
        );
        Fixture {
            locks,
            availability,
            queue,
            handler,
        }
    }

    fn confirmed_event(booking_id: i64) -> SagaEvent {
        SagaEvent::new(
            SagaEventType::BookingConfirmed,
            "CONFIRM_BOOKING",
            crate::publisher::booking_payload(booking_id, 1, 3, d(1), d(4)),
        )
    }

    async fn hold_lock(fx: &Fixture, user_id: i64) {
        let key = KeySpace::default().availability_lock_key(1, d(1), d(3));
        assert!(fx
            .locks
            .try_acquire(&key, &user_id.to_string(), Duration::from_secs(300))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn confirmed_books_the_slots_and_releases_the_lock() {
        let fx = fixture();
        fx.availability.seed(1, d(1), d(5));
        hold_lock(&fx, 3).await;

        fx.handler
            .handle_booking_confirmed(&confirmed_event(42))
            .await
            .unwrap();

        for day in 1..=3 {
            let slot = fx.availability.slot(1, d(day)).unwrap();
            assert_eq!(slot.booking_id, Some(42));
            assert!(!slot.is_available);
        }
        // check-out day itself stays open
        assert!(fx.availability.slot(1, d(4)).unwrap().is_available);

        let key = KeySpace::default().availability_lock_key(1, d(1), d(3));
        assert!(fx.locks.holder(&key).is_none());
        assert_eq!(fx.queue.len("saga:test").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn conflicting_confirmation_republishes_a_cancel_request() {
        let fx = fixture();
        fx.availability.seed(1, d(1), d(5));
        fx.availability.book_range(99, 1, d(2), d(2)).await.unwrap();
        hold_lock(&fx, 3).await;

        // expected terminal outcome, not a retryable failure
        fx.handler
            .handle_booking_confirmed(&confirmed_event(42))
            .await
            .unwrap();

        // never double-books the contested date
        assert_eq!(fx.availability.slot(1, d(2)).unwrap().booking_id, Some(99));
        assert_eq!(fx.availability.slot(1, d(1)).unwrap().booking_id, None);

        let raw = fx.queue.try_pop_front("saga:test").await.unwrap().unwrap();
        let next: SagaEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(next.event_type, SagaEventType::BookingCancelRequested);
        assert_eq!(next.payload_i64(payload::BOOKING_ID).unwrap(), 42);
    }

    #[tokio::test]
    async fn cancelled_clears_slots_and_releases_the_lock() {
        let fx = fixture();
        fx.availability.seed(1, d(1), d(5));
        fx.availability.book_range(42, 1, d(1), d(3)).await.unwrap();
        hold_lock(&fx, 3).await;

        let event = SagaEvent::new(
            SagaEventType::BookingCancelled,
            "CANCEL_BOOKING",
            crate::publisher::booking_payload(42, 1, 3, d(1), d(4)),
        );
        fx.handler.handle_booking_cancelled(&event).await.unwrap();

        for day in 1..=3 {
            let slot = fx.availability.slot(1, d(day)).unwrap();
            assert_eq!(slot.booking_id, None);
            assert!(slot.is_available);
        }
        let key = KeySpace::default().availability_lock_key(1, d(1), d(3));
        assert!(fx.locks.holder(&key).is_none());
    }

    #[tokio::test]
    async fn compensation_releases_the_lock_and_nothing_else() {
        let fx = fixture();
        fx.availability.seed(1, d(1), d(5));
        hold_lock(&fx, 3).await;

        let event = SagaEvent::new(
            SagaEventType::BookingCompensated,
            "COMPENSATE_BOOKING",
            crate::publisher::booking_payload(42, 1, 3, d(1), d(4)),
        );
        fx.handler.handle_booking_compensated(&event).await.unwrap();

        let key = KeySpace::default().availability_lock_key(1, d(1), d(3));
        assert!(fx.locks.holder(&key).is_none());
        assert!(fx.availability.slot(1, d(1)).unwrap().is_available);
        assert_eq!(fx.queue.len("saga:test").await.unwrap(), 0);
    }
}
