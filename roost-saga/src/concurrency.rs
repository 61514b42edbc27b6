use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use roost_domain::availability::AvailabilitySlot;
use roost_store::config::{KeySpace, LockConfig};
use roost_store::{AvailabilityStore, LockStore};

use crate::error::SagaError;

/// Leased locks for a booking's date range and its update path.
///
/// The availability lock is acquired synchronously at create time but only
/// released by the saga's availability handler once the write store durably
/// reflects the booking; that closes the window between "lock acquired" and
/// "row committed" where a second booking could read stale availability.
#[derive(Clone)]
pub struct LockManager {
    locks: Arc<dyn LockStore>,
    availability: Arc<dyn AvailabilityStore>,
    keys: KeySpace,
    availability_ttl: Duration,
    update_ttl: Duration,
}

impl LockManager {
    pub fn new(
        locks: Arc<dyn LockStore>,
        availability: Arc<dyn AvailabilityStore>,
        keys: KeySpace,
        lock_config: &LockConfig,
    ) -> Self {
        Self {
            locks,
            availability,
            keys,
            availability_ttl: Duration::from_secs(lock_config.availability_ttl_secs),
            update_ttl: Duration::from_secs(lock_config.update_ttl_secs),
        }
    }

    /// Takes the availability lock for `[check_in, last_night]` with the
    /// requesting user as owner, then verifies no slot in the range already
    /// references a booking. The lock never leaks: every failure after
    /// acquisition releases it before propagating.
    pub async fn lock_and_check_availability(
        &self,
        property_id: i64,
        check_in: NaiveDate,
        last_night: NaiveDate,
        user_id: i64,
    ) -> Result<Vec<AvailabilitySlot>, SagaError> {
        let key = self.keys.availability_lock_key(property_id, check_in, last_night);
        let owner = user_id.to_string();

        let acquired = self
            .locks
            .try_acquire(&key, &owner, self.availability_ttl)
            .await?;
        if !acquired {
            return Err(SagaError::LockConflict(format!(
                "dates {check_in}..{last_night} of property {property_id} are being booked, try again later"
            )));
        }

        match self.check_range(property_id, check_in, last_night).await {
            Ok(slots) => Ok(slots),
            Err(e) => {
                if let Err(release_err) = self.locks.release(&key, &owner).await {
                    warn!("failed to release availability lock {key}: {release_err}");
                }
                Err(e)
            }
        }
    }

    async fn check_range(
        &self,
        property_id: i64,
        check_in: NaiveDate,
        last_night: NaiveDate,
    ) -> Result<Vec<AvailabilitySlot>, SagaError> {
        let booked = self
            .availability
            .count_booked(property_id, check_in, last_night)
            .await?;
        if booked > 0 {
            return Err(SagaError::SlotUnavailable(format!(
                "property {property_id} is not available for {check_in}..{last_night}"
            )));
        }
        Ok(self
            .availability
            .slots_in_range(property_id, check_in, last_night)
            .await?)
    }

    /// Compare-and-delete with the user id as the expected owner. Absent or
    /// re-owned locks are a no-op, not an error (the lease already expired
    /// and someone else took over).
    pub async fn release_booking_lock(
        &self,
        property_id: i64,
        check_in: NaiveDate,
        last_night: NaiveDate,
        user_id: i64,
    ) -> Result<(), SagaError> {
        let key = self.keys.availability_lock_key(property_id, check_in, last_night);
        let released = self.locks.release(&key, &user_id.to_string()).await?;
        if released {
            info!("released availability lock {key}");
        }
        Ok(())
    }

    /// Serializes competing status updates against one booking. Returns the
    /// owner token on success, None when an update is already in flight; the
    /// caller must treat None as a conflict, never silently skip.
    pub async fn lock_booking_update(&self, booking_id: i64) -> Result<Option<String>, SagaError> {
        let key = self.keys.update_lock_key(booking_id);
        let token = Uuid::new_v4().to_string();
        let acquired = self.locks.try_acquire(&key, &token, self.update_ttl).await?;
        Ok(acquired.then_some(token))
    }

    pub async fn release_booking_update(
        &self,
        booking_id: i64,
        token: &str,
    ) -> Result<(), SagaError> {
        let key = self.keys.update_lock_key(booking_id);
        self.locks.release(&key, token).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roost_store::memory::{MemoryAvailabilityStore, MemoryLockStore};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn manager() -> (Arc<MemoryLockStore>, Arc<MemoryAvailabilityStore>, LockManager) {
        let locks = Arc::new(MemoryLockStore::new());
        let availability = Arc::new(MemoryAvailabilityStore::new());
        let manager = LockManager::new(
            Arc::clone(&locks) as Arc<dyn LockStore>,
            Arc::clone(&availability) as Arc<dyn AvailabilityStore>,
            KeySpace::default(),
            &LockConfig::default(),
        );
        (locks, availability, manager)
    }

    #[tokio::test]
    async fn concurrent_bookers_of_the_same_range_get_exactly_one_lock() {
        let (_, availability, manager) = manager();
        availability.seed(1, d(1), d(5));
        let manager = Arc::new(manager);

        let mut handles = Vec::new();
        for user_id in 1..=8 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                manager
                    .lock_and_check_availability(1, d(1), d(3), user_id)
                    .await
            }));
        }

        let mut won = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(slots) => {
                    assert_eq!(slots.len(), 3);
                    won += 1;
                }
                Err(SagaError::LockConflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(won, 1);
        assert_eq!(conflicts, 7);
    }

    #[tokio::test]
    async fn booked_range_releases_the_lock_before_rejecting() {
        let (locks, availability, manager) = manager();
        availability.seed(1, d(1), d(5));
        availability.book_range(99, 1, d(2), d(2)).await.unwrap();

        let result = manager.lock_and_check_availability(1, d(1), d(3), 7).await;
        assert!(matches!(result, Err(SagaError::SlotUnavailable(_))));

        // the just-acquired lock must not leak
        let key = KeySpace::default().availability_lock_key(1, d(1), d(3));
        assert!(locks.holder(&key).is_none());
    }

    #[tokio::test]
    async fn update_lock_rejects_a_second_in_flight_update() {
        let (_, _, manager) = manager();

        let token = manager.lock_booking_update(42).await.unwrap();
        let token = token.expect("first update should take the lock");
        assert!(manager.lock_booking_update(42).await.unwrap().is_none());

        manager.release_booking_update(42, &token).await.unwrap();
        assert!(manager.lock_booking_update(42).await.unwrap().is_some());
    }
}
