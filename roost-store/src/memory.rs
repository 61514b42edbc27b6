//! In-process backends with the same semantics as the Redis and Postgres
//! implementations (leases expire, pops block with a bound, book_range is
//! atomic). They back the saga tests and local development without external
//! services.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Notify;
use tokio::time::Instant;

use roost_domain::availability::AvailabilitySlot;
use roost_domain::booking::{Booking, BookingStatus};

use crate::backend::{
    AvailabilityStore, BookOutcome, BookingStore, EventQueue, LockStore, ReadModelCache,
};
use crate::error::StoreError;

#[derive(Default)]
pub struct MemoryLockStore {
    locks: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder(&self, key: &str) -> Option<String> {
        let locks = self.locks.lock().unwrap();
        locks
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(owner, _)| owner.clone())
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut locks = self.locks.lock().unwrap();
        let now = Instant::now();
        if let Some((_, expires)) = locks.get(key) {
            if *expires > now {
                return Ok(false);
            }
        }
        locks.insert(key.to_string(), (owner.to_string(), now + ttl));
        Ok(true)
    }

    async fn release(&self, key: &str, owner: &str) -> Result<bool, StoreError> {
        let mut locks = self.locks.lock().unwrap();
        match locks.get(key) {
            Some((held_by, expires)) if held_by == owner && *expires > Instant::now() => {
                locks.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryQueue {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_pop(&self, queue: &str) -> Option<String> {
        let mut queues = self.queues.lock().unwrap();
        queues.get_mut(queue).and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl EventQueue for MemoryQueue {
    async fn push_back(&self, queue: &str, payload: &str) -> Result<(), StoreError> {
        {
            let mut queues = self.queues.lock().unwrap();
            queues
                .entry(queue.to_string())
                .or_default()
                .push_back(payload.to_string());
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn pop_front(&self, queue: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(value) = self.try_pop(queue) {
                return Ok(Some(value));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            if tokio::time::timeout(deadline - now, notified).await.is_err() {
                return Ok(self.try_pop(queue));
            }
        }
    }

    async fn try_pop_front(&self, queue: &str) -> Result<Option<String>, StoreError> {
        Ok(self.try_pop(queue))
    }

    async fn len(&self, queue: &str) -> Result<u64, StoreError> {
        let queues = self.queues.lock().unwrap();
        Ok(queues.get(queue).map(|q| q.len() as u64).unwrap_or(0))
    }

    async fn range(&self, queue: &str) -> Result<Vec<String>, StoreError> {
        let queues = self.queues.lock().unwrap();
        Ok(queues
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, queue: &str) -> Result<(), StoreError> {
        let mut queues = self.queues.lock().unwrap();
        queues.remove(queue);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCache {
    values: Mutex<HashMap<String, String>>,
    hashes: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReadModelCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.hashes
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .hashes
            .lock()
            .unwrap()
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hash_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self
            .hashes
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), StoreError> {
        if let Some(hash) = self.hashes.lock().unwrap().get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .values
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryBookingStore {
    bookings: Mutex<HashMap<i64, Booking>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, booking: Booking) {
        self.bookings.lock().unwrap().insert(booking.id, booking);
    }

    pub fn status_of(&self, id: i64) -> Option<BookingStatus> {
        self.bookings.lock().unwrap().get(&id).map(|b| b.status)
    }
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn find(&self, id: i64) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.lock().unwrap().get(&id).cloned())
    }

    async fn set_status(&self, id: i64, status: BookingStatus) -> Result<bool, StoreError> {
        let mut bookings = self.bookings.lock().unwrap();
        match bookings.get_mut(&id) {
            Some(booking) => {
                booking.status = status;
                booking.updated_at = chrono::Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryAvailabilityStore {
    slots: Mutex<HashMap<(i64, NaiveDate), AvailabilitySlot>>,
}

impl MemoryAvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds open slots for every night in [from, to].
    pub fn seed(&self, property_id: i64, from: NaiveDate, to: NaiveDate) {
        let mut slots = self.slots.lock().unwrap();
        let mut date = from;
        while date <= to {
            slots.insert(
                (property_id, date),
                AvailabilitySlot::open(property_id, date),
            );
            date += chrono::Duration::days(1);
        }
    }

    pub fn slot(&self, property_id: i64, date: NaiveDate) -> Option<AvailabilitySlot> {
        self.slots.lock().unwrap().get(&(property_id, date)).cloned()
    }
}

#[async_trait]
impl AvailabilityStore for MemoryAvailabilityStore {
    async fn count_booked(
        &self,
        property_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<i64, StoreError> {
        let slots = self.slots.lock().unwrap();
        Ok(slots
            .values()
            .filter(|s| {
                s.property_id == property_id
                    && s.date >= from
                    && s.date <= to
                    && s.booking_id.is_some()
            })
            .count() as i64)
    }

    async fn slots_in_range(
        &self,
        property_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AvailabilitySlot>, StoreError> {
        let slots = self.slots.lock().unwrap();
        let mut found: Vec<AvailabilitySlot> = slots
            .values()
            .filter(|s| s.property_id == property_id && s.date >= from && s.date <= to)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.date);
        Ok(found)
    }

    async fn book_range(
        &self,
        booking_id: i64,
        property_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BookOutcome, StoreError> {
        // One guard across check and mutate keeps this atomic, matching the
        // transactional Postgres implementation.
        let mut slots = self.slots.lock().unwrap();
        let conflict = slots.values().any(|s| {
            s.property_id == property_id
                && s.date >= from
                && s.date <= to
                && s.booking_id.is_some()
        });
        if conflict {
            return Ok(BookOutcome::Conflict);
        }
        let mut updated = 0;
        for slot in slots.values_mut() {
            if slot.property_id == property_id && slot.date >= from && slot.date <= to {
                slot.booking_id = Some(booking_id);
                slot.is_available = false;
                updated += 1;
            }
        }
        Ok(BookOutcome::Booked(updated))
    }

    async fn release_range(
        &self,
        booking_id: i64,
        property_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<u64, StoreError> {
        let mut slots = self.slots.lock().unwrap();
        let mut updated = 0;
        for slot in slots.values_mut() {
            if slot.booking_id == Some(booking_id)
                && slot.property_id == property_id
                && slot.date >= from
                && slot.date <= to
            {
                slot.booking_id = None;
                slot.is_available = true;
                updated += 1;
            }
        }
        Ok(updated)
    }
}
