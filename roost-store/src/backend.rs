//! Seams between the saga core and its shared stores. The production
//! implementations live in `redis_store` (lock store, durable queue, cache)
//! and the `*_repo` modules (write store); `memory` provides in-process
//! equivalents for tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use roost_domain::availability::AvailabilitySlot;
use roost_domain::booking::{Booking, BookingStatus};

use crate::error::StoreError;

/// Leased mutual exclusion with compare-and-delete release.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Conditional set: true if this call took the lock, false if another
    /// owner currently holds it.
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Compare-and-delete: removes the lock only if `owner` still holds it.
    /// Returns whether a lock was actually released; an absent or re-owned
    /// lock is a no-op, not an error.
    async fn release(&self, key: &str, owner: &str) -> Result<bool, StoreError>;
}

/// Ordered, at-least-once list used as the saga event bus and the dead-letter
/// store.
#[async_trait]
pub trait EventQueue: Send + Sync {
    async fn push_back(&self, queue: &str, payload: &str) -> Result<(), StoreError>;

    /// Blocking pop from the head, waiting at most `timeout`. The bounded
    /// wait keeps poll loops live when the queue is empty.
    async fn pop_front(&self, queue: &str, timeout: Duration) -> Result<Option<String>, StoreError>;

    /// Non-blocking pop from the head.
    async fn try_pop_front(&self, queue: &str) -> Result<Option<String>, StoreError>;

    async fn len(&self, queue: &str) -> Result<u64, StoreError>;

    /// Non-destructive snapshot of the whole list.
    async fn range(&self, queue: &str) -> Result<Vec<String>, StoreError>;

    async fn clear(&self, queue: &str) -> Result<(), StoreError>;
}

/// Key/value and key/hash store for the denormalized read models.
#[async_trait]
pub trait ReadModelCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;
    async fn hash_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;
    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), StoreError>;
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Outcome of the confirm-side read-check-write on the availability rows.
#[derive(Debug, PartialEq, Eq)]
pub enum BookOutcome {
    /// Rows updated to reference the booking.
    Booked(u64),
    /// Another booking already holds at least one slot in the range.
    Conflict,
}

/// Booking mutations the saga's booking handler needs.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find(&self, id: i64) -> Result<Option<Booking>, StoreError>;

    /// Returns false when the booking does not exist.
    async fn set_status(&self, id: i64, status: BookingStatus) -> Result<bool, StoreError>;
}

/// Availability mutations the saga's availability handler and the create-path
/// availability check need. Date ranges are inclusive of both ends (the
/// caller passes the last occupied night, not the check-out day).
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    async fn count_booked(
        &self,
        property_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<i64, StoreError>;

    async fn slots_in_range(
        &self,
        property_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AvailabilitySlot>, StoreError>;

    /// Re-checks the range and marks it booked in one transaction; returns
    /// `Conflict` without mutating anything if any slot already references a
    /// booking.
    async fn book_range(
        &self,
        booking_id: i64,
        property_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BookOutcome, StoreError>;

    /// Reopens the slots in the range that reference `booking_id`. Slots
    /// held by other bookings are left untouched.
    async fn release_range(
        &self,
        booking_id: i64,
        property_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<u64, StoreError>;
}
