use std::sync::Arc;

use tracing::warn;

use roost_domain::read_models::{AvailabilityReadModel, BookingReadModel, PropertyReadModel};

use crate::backend::ReadModelCache;
use crate::config::KeySpace;
use crate::error::StoreError;

/// Typed access to the denormalized projections. Writes overwrite
/// unconditionally (last-write-wins), which is what makes the CDC apply
/// idempotent; a malformed cached entry is logged and skipped, never fatal.
#[derive(Clone)]
pub struct ReadModelRepository {
    cache: Arc<dyn ReadModelCache>,
    keys: KeySpace,
}

impl ReadModelRepository {
    pub fn new(cache: Arc<dyn ReadModelCache>, keys: KeySpace) -> Self {
        Self { cache, keys }
    }

    // ── bookings ──────────────────────────────────────────────────

    pub async fn get_booking(&self, id: i64) -> Result<Option<BookingReadModel>, StoreError> {
        self.get_json(&self.keys.booking_key(id)).await
    }

    pub async fn get_all_bookings(&self) -> Result<Vec<BookingReadModel>, StoreError> {
        self.get_all_by_prefix(&self.keys.booking_prefix).await
    }

    /// Resolves the idempotency-to-id mapping, then the booking itself.
    pub async fn find_booking_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<BookingReadModel>, StoreError> {
        let Some(id_raw) = self
            .cache
            .get(&self.keys.idempotency_key(idempotency_key))
            .await?
        else {
            return Ok(None);
        };
        let Ok(id) = id_raw.parse::<i64>() else {
            warn!("dropping unparsable idempotency mapping: {id_raw}");
            return Ok(None);
        };
        self.get_booking(id).await
    }

    pub async fn write_booking(&self, model: &BookingReadModel) -> Result<(), StoreError> {
        let json = serde_json::to_string(model)?;
        self.cache.set(&self.keys.booking_key(model.id), &json).await?;
        if !model.idempotency_key.trim().is_empty() {
            self.cache
                .set(
                    &self.keys.idempotency_key(&model.idempotency_key),
                    &model.id.to_string(),
                )
                .await?;
        }
        Ok(())
    }

    pub async fn delete_booking(&self, id: i64) -> Result<(), StoreError> {
        self.cache.delete(&self.keys.booking_key(id)).await
    }

    // ── properties ────────────────────────────────────────────────

    pub async fn get_property(&self, id: i64) -> Result<Option<PropertyReadModel>, StoreError> {
        self.get_json(&self.keys.property_key(id)).await
    }

    pub async fn write_property(&self, model: &PropertyReadModel) -> Result<(), StoreError> {
        let json = serde_json::to_string(model)?;
        self.cache.set(&self.keys.property_key(model.id), &json).await
    }

    pub async fn delete_property(&self, id: i64) -> Result<(), StoreError> {
        self.cache.delete(&self.keys.property_key(id)).await
    }

    // ── availability ──────────────────────────────────────────────

    /// All dates for one property in a single round trip.
    pub async fn get_availability(
        &self,
        property_id: i64,
    ) -> Result<Vec<AvailabilityReadModel>, StoreError> {
        let entries = self
            .cache
            .hash_all(&self.keys.availability_hash(property_id))
            .await?;
        let mut models: Vec<AvailabilityReadModel> = entries
            .into_values()
            .filter_map(|json| match serde_json::from_str(&json) {
                Ok(model) => Some(model),
                Err(e) => {
                    warn!("dropping malformed cached availability: {e}");
                    None
                }
            })
            .collect();
        models.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(models)
    }

    pub async fn get_availability_on(
        &self,
        property_id: i64,
        date: &str,
    ) -> Result<Option<AvailabilityReadModel>, StoreError> {
        let Some(json) = self
            .cache
            .hash_get(&self.keys.availability_hash(property_id), date)
            .await?
        else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(model) => Ok(Some(model)),
            Err(e) => {
                warn!("dropping malformed cached availability: {e}");
                Ok(None)
            }
        }
    }

    pub async fn write_availability(&self, model: &AvailabilityReadModel) -> Result<(), StoreError> {
        let json = serde_json::to_string(model)?;
        self.cache
            .hash_set(
                &self.keys.availability_hash(model.property_id),
                &model.date,
                &json,
            )
            .await
    }

    pub async fn delete_availability(&self, property_id: i64, date: &str) -> Result<(), StoreError> {
        self.cache
            .hash_delete(&self.keys.availability_hash(property_id), date)
            .await
    }

    // ── helpers ───────────────────────────────────────────────────

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let Some(json) = self.cache.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(model) => Ok(Some(model)),
            Err(e) => {
                warn!("dropping malformed cache entry at {key}: {e}");
                Ok(None)
            }
        }
    }

    async fn get_all_by_prefix<T: serde::de::DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<Vec<T>, StoreError> {
        let keys = self.cache.keys_with_prefix(prefix).await?;
        let mut models = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(model) = self.get_json(&key).await? {
                models.push(model);
            }
        }
        Ok(models)
    }
}
