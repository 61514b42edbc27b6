//! End-to-end saga flow over the in-memory backends: create-path locking,
//! the confirm chain, conflict handling, and the cancel chain.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use roost_domain::booking::{Booking, BookingStatus};
use roost_domain::saga::SagaEventType;
use roost_saga::handlers::{AvailabilityEventHandler, BookingEventHandler};
use roost_saga::{
    booking_payload, DeadLetterPublisher, DeadLetterQueue, EventProcessor, LockManager,
    RetryingProcessor, SagaConsumer, SagaError, SagaProcessor, SagaPublisher,
};
use roost_store::config::{KeySpace, LockConfig, SagaConfig};
use roost_store::memory::{
    MemoryAvailabilityStore, MemoryBookingStore, MemoryLockStore, MemoryQueue,
};
use roost_store::{AvailabilityStore, BookingStore, EventQueue, LockStore};

struct Harness {
    locks: Arc<MemoryLockStore>,
    availability: Arc<MemoryAvailabilityStore>,
    bookings: Arc<MemoryBookingStore>,
    queue: Arc<MemoryQueue>,
    keys: KeySpace,
    lock_manager: LockManager,
    publisher: SagaPublisher,
    consumer: SagaConsumer,
    dlq: DeadLetterQueue,
}

fn harness() -> Harness {
    let locks = Arc::new(MemoryLockStore::new());
    let availability = Arc::new(MemoryAvailabilityStore::new());
    let bookings = Arc::new(MemoryBookingStore::new());
    let queue = Arc::new(MemoryQueue::new());
    let keys = KeySpace::default();
    let saga_config = SagaConfig {
        max_attempts: 3,
        base_delay_ms: 1,
        pop_timeout_secs: 0,
        poll_backoff_ms: 1,
        dlq_monitor_interval_secs: 60,
    };

    let publisher = SagaPublisher::new(
        Arc::clone(&queue) as Arc<dyn EventQueue>,
        keys.saga_queue.clone(),
    );
    let lock_manager = LockManager::new(
        Arc::clone(&locks) as Arc<dyn LockStore>,
        Arc::clone(&availability) as Arc<dyn AvailabilityStore>,
        keys.clone(),
        &LockConfig::default(),
    );
    let processor = SagaProcessor::new(
        BookingEventHandler::new(
            Arc::clone(&bookings) as Arc<dyn BookingStore>,
            publisher.clone(),
        ),
        AvailabilityEventHandler::new(
            Arc::clone(&availability) as Arc<dyn AvailabilityStore>,
            lock_manager.clone(),
            publisher.clone(),
        ),
    );
    let retry = Arc::new(RetryingProcessor::new(
        Arc::new(processor) as Arc<dyn EventProcessor>,
        DeadLetterPublisher::new(Arc::clone(&queue) as Arc<dyn EventQueue>, keys.dlq_queue.clone()),
        &saga_config,
    ));
    let consumer = SagaConsumer::new(
        Arc::clone(&queue) as Arc<dyn EventQueue>,
        keys.saga_queue.clone(),
        Arc::clone(&retry),
        &saga_config,
    );
    let dlq = DeadLetterQueue::new(
        Arc::clone(&queue) as Arc<dyn EventQueue>,
        keys.dlq_queue.clone(),
        retry,
    );

    Harness {
        locks,
        availability,
        bookings,
        queue,
        keys,
        lock_manager,
        publisher,
        consumer,
        dlq,
    }
}

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
}

fn pending_booking(id: i64, user_id: i64) -> Booking {
    Booking {
        id,
        user_id,
        property_id: 1,
        total_price: 600.0,
        status: BookingStatus::Pending,
        idempotency_key: format!("key-{id}"),
        check_in_date: d(1),
        check_out_date: d(4),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

async fn drain(harness: &Harness) {
    while harness.consumer.poll_once().await {}
}

#[tokio::test]
async fn confirm_saga_books_the_dates_and_blocks_later_bookers() {
    let h = harness();
    h.availability.seed(1, d(1), d(10));

    // create path: user 3 books 2025-06-01 -> 2025-06-04 (3 nights)
    let slots = h
        .lock_manager
        .lock_and_check_availability(1, d(1), d(3), 3)
        .await
        .unwrap();
    assert_eq!(slots.len(), 3);
    h.bookings.insert(pending_booking(42, 3));

    // a second creator for the same range hits the held lock
    let second = h.lock_manager.lock_and_check_availability(1, d(1), d(3), 4).await;
    assert!(matches!(second, Err(SagaError::LockConflict(_))));

    // status update to CONFIRMED kicks off the chain
    h.publisher
        .publish(
            SagaEventType::BookingConfirmRequested,
            "CONFIRM_BOOKING",
            booking_payload(42, 1, 3, d(1), d(4)),
        )
        .await
        .unwrap();
    drain(&h).await;

    assert_eq!(h.bookings.status_of(42), Some(BookingStatus::Confirmed));
    for day in 1..=3 {
        let slot = h.availability.slot(1, d(day)).unwrap();
        assert_eq!(slot.booking_id, Some(42));
        assert!(!slot.is_available);
    }

    // lock is gone, so a third creator now sees a genuine availability
    // rejection instead of a lock conflict
    let key = h.keys.availability_lock_key(1, d(1), d(3));
    assert!(h.locks.holder(&key).is_none());
    let third = h.lock_manager.lock_and_check_availability(1, d(1), d(3), 5).await;
    assert!(matches!(third, Err(SagaError::SlotUnavailable(_))));

    assert_eq!(h.dlq.size().await.unwrap(), 0);
}

#[tokio::test]
async fn cancel_saga_reopens_the_dates() {
    let h = harness();
    h.availability.seed(1, d(1), d(10));

    h.lock_manager
        .lock_and_check_availability(1, d(1), d(3), 3)
        .await
        .unwrap();
    h.bookings.insert(pending_booking(42, 3));

    h.publisher
        .publish(
            SagaEventType::BookingCancelRequested,
            "CANCEL_BOOKING",
            booking_payload(42, 1, 3, d(1), d(4)),
        )
        .await
        .unwrap();
    drain(&h).await;

    assert_eq!(h.bookings.status_of(42), Some(BookingStatus::Cancelled));
    for day in 1..=3 {
        assert!(h.availability.slot(1, d(day)).unwrap().is_available);
    }
    // released by the cancel handler, a new booker proceeds immediately
    assert!(h
        .lock_manager
        .lock_and_check_availability(1, d(1), d(3), 9)
        .await
        .is_ok());
}

#[tokio::test]
async fn losing_a_confirmation_race_cancels_the_loser() {
    let h = harness();
    h.availability.seed(1, d(1), d(10));

    // booking 99 already durably owns 06-02
    h.availability.book_range(99, 1, d(2), d(2)).await.unwrap();
    h.bookings.insert(pending_booking(42, 3));

    h.publisher
        .publish(
            SagaEventType::BookingConfirmRequested,
            "CONFIRM_BOOKING",
            booking_payload(42, 1, 3, d(1), d(4)),
        )
        .await
        .unwrap();
    drain(&h).await;

    // the conflicting confirmation turned into a cancellation
    assert_eq!(h.bookings.status_of(42), Some(BookingStatus::Cancelled));
    assert_eq!(h.availability.slot(1, d(2)).unwrap().booking_id, Some(99));
    assert_eq!(h.availability.slot(1, d(1)).unwrap().booking_id, None);
    assert_eq!(h.dlq.size().await.unwrap(), 0);
}

#[tokio::test]
async fn failed_steps_dead_letter_and_replay_after_repair() {
    let h = harness();
    h.availability.seed(1, d(1), d(10));

    // no such booking: the confirm step fails, retries, then dead-letters
    h.publisher
        .publish(
            SagaEventType::BookingConfirmRequested,
            "CONFIRM_BOOKING",
            booking_payload(404, 1, 3, d(1), d(4)),
        )
        .await
        .unwrap();
    drain(&h).await;

    assert_eq!(h.dlq.size().await.unwrap(), 1);
    let dead = h.dlq.list_events().await.unwrap();
    assert_eq!(dead[0].attempt_count, 3);
    assert_eq!(
        dead[0].original_event.event_type,
        SagaEventType::BookingConfirmRequested
    );

    // each failed attempt published a compensation; all were consumed
    assert_eq!(h.queue.len(&h.keys.saga_queue).await.unwrap(), 0);

    // repair the world, then replay
    h.bookings.insert(pending_booking(404, 3));
    let outcome = h.dlq.replay_one().await.unwrap();
    assert!(outcome.contains("Replayed"));
    drain(&h).await;

    assert_eq!(h.bookings.status_of(404), Some(BookingStatus::Confirmed));
    assert_eq!(h.dlq.size().await.unwrap(), 0);
}
