//! Change-data-capture consumers: one Kafka topic per synced table, each
//! drained by its own task into the read-model cache. Applies are full-row
//! overwrites (last-write-wins), so redelivery and replays converge on the
//! same cache state.

use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use serde_json::Value;
use tracing::{error, info};

use roost_domain::read_models::{AvailabilityReadModel, BookingReadModel, PropertyReadModel};
use roost_store::config::KafkaConfig;
use roost_store::ReadModelRepository;

#[derive(Debug, Clone, Copy)]
pub enum SyncedTable {
    Properties,
    Availabilities,
    Bookings,
}

impl SyncedTable {
    fn topic<'a>(&self, kafka: &'a KafkaConfig) -> &'a str {
        match self {
            SyncedTable::Properties => &kafka.property_topic,
            SyncedTable::Availabilities => &kafka.availability_topic,
            SyncedTable::Bookings => &kafka.booking_topic,
        }
    }
}

pub fn spawn_cdc_workers(kafka: &KafkaConfig, read_models: ReadModelRepository) {
    for table in [
        SyncedTable::Properties,
        SyncedTable::Availabilities,
        SyncedTable::Bookings,
    ] {
        tokio::spawn(run_table_sync(kafka.clone(), table, read_models.clone()));
    }
}

pub async fn run_table_sync(
    kafka: KafkaConfig,
    table: SyncedTable,
    read_models: ReadModelRepository,
) {
    let topic = table.topic(&kafka).to_string();
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &kafka.brokers)
        .set("group.id", &kafka.group_id)
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "earliest")
        .create()
        .expect("Consumer creation failed");

    consumer.subscribe(&[topic.as_str()]).expect("Can't subscribe");
    info!("CDC worker started for topic '{topic}'");

    loop {
        match consumer.recv().await {
            Err(e) => error!("Kafka error on '{topic}': {e}"),
            Ok(m) => {
                let Some(Ok(text)) = m.payload_view::<str>() else {
                    // tombstones and non-utf8 payloads carry nothing to apply
                    continue;
                };
                // a malformed change record is logged and dropped, it must
                // never stall the records behind it
                if let Err(e) = apply_change(&read_models, table, text).await {
                    error!("dropping CDC record from '{topic}': {e:#}");
                }
            }
        }
    }
}

/// Unwraps the change envelope and projects the row into the cache.
pub async fn apply_change(
    read_models: &ReadModelRepository,
    table: SyncedTable,
    text: &str,
) -> anyhow::Result<()> {
    let value: Value = serde_json::from_str(text).context("change record is not JSON")?;
    let row = value.get("payload").unwrap_or(&value);
    match table {
        SyncedTable::Properties => apply_property(read_models, row).await,
        SyncedTable::Availabilities => apply_availability(read_models, row).await,
        SyncedTable::Bookings => apply_booking(read_models, row).await,
    }
}

async fn apply_property(read_models: &ReadModelRepository, row: &Value) -> anyhow::Result<()> {
    let id = field_i64(row, "id")?;
    if is_deleted(row) {
        read_models.delete_property(id).await?;
        return Ok(());
    }
    read_models
        .write_property(&PropertyReadModel {
            id,
            name: field_str(row, "name")?,
            description: field_str(row, "description")?,
            location: field_str(row, "location")?,
            price_per_night: field_f64(row, "price_per_night")?,
        })
        .await?;
    Ok(())
}

async fn apply_availability(read_models: &ReadModelRepository, row: &Value) -> anyhow::Result<()> {
    let property_id = field_i64(row, "property_id")?;
    let date = field_epoch_date(row, "date")?.to_string();
    if is_deleted(row) {
        read_models.delete_availability(property_id, &date).await?;
        return Ok(());
    }
    read_models
        .write_availability(&AvailabilityReadModel {
            property_id,
            date,
            booking_id: optional_i64(row, "booking_id")?,
            is_available: field_bool(row, "is_available")?,
        })
        .await?;
    Ok(())
}

async fn apply_booking(read_models: &ReadModelRepository, row: &Value) -> anyhow::Result<()> {
    let id = field_i64(row, "id")?;
    if is_deleted(row) {
        read_models.delete_booking(id).await?;
        return Ok(());
    }
    read_models
        .write_booking(&BookingReadModel {
            id,
            property_id: field_i64(row, "property_id")?,
            user_id: field_i64(row, "user_id")?,
            total_price: field_f64(row, "total_price")?,
            booking_status: field_str(row, "status")?,
            idempotency_key: field_str(row, "idempotency_key")?,
            check_in_date: field_epoch_date(row, "check_in_date")?,
            check_out_date: field_epoch_date(row, "check_out_date")?,
        })
        .await?;
    Ok(())
}

fn is_deleted(row: &Value) -> bool {
    row.get("__deleted").and_then(Value::as_str) == Some("true")
}

fn field_i64(row: &Value, name: &str) -> anyhow::Result<i64> {
    row.get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| anyhow!("missing or non-integer field '{name}'"))
}

fn optional_i64(row: &Value, name: &str) -> anyhow::Result<Option<i64>> {
    match row.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| anyhow!("non-integer field '{name}'")),
    }
}

fn field_f64(row: &Value, name: &str) -> anyhow::Result<f64> {
    row.get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("missing or non-numeric field '{name}'"))
}

fn field_str(row: &Value, name: &str) -> anyhow::Result<String> {
    row.get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("missing or non-string field '{name}'"))
}

fn field_bool(row: &Value, name: &str) -> anyhow::Result<bool> {
    row.get(name)
        .and_then(Value::as_bool)
        .ok_or_else(|| anyhow!("missing or non-boolean field '{name}'"))
}

/// Change records carry dates as days since the Unix epoch.
fn field_epoch_date(row: &Value, name: &str) -> anyhow::Result<NaiveDate> {
    let days = field_i64(row, name)?;
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .unwrap()
        .checked_add_signed(chrono::Duration::days(days))
        .ok_or_else(|| anyhow!("field '{name}' is out of range: {days} days"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use roost_store::config::KeySpace;
    use roost_store::memory::MemoryCache;
    use std::sync::Arc;

    fn repo() -> ReadModelRepository {
        ReadModelRepository::new(Arc::new(MemoryCache::new()), KeySpace::default())
    }

    #[tokio::test]
    async fn booking_change_projects_the_row_with_decoded_dates() {
        let repo = repo();
        // 20240 days after 1970-01-01 is 2025-06-01
        let record = r#"{"payload": {
            "id": 42, "property_id": 7, "user_id": 3, "total_price": 600.0,
            "status": "PENDING", "idempotency_key": "key-1",
            "check_in_date": 20240, "check_out_date": 20243,
            "__deleted": "false"
        }}"#;

        apply_change(&repo, SyncedTable::Bookings, record).await.unwrap();
        // reapplying the same record must converge, not error
        apply_change(&repo, SyncedTable::Bookings, record).await.unwrap();

        let model = repo.get_booking(42).await.unwrap().unwrap();
        assert_eq!(model.check_in_date, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert_eq!(model.check_out_date, NaiveDate::from_ymd_opt(2025, 6, 4).unwrap());
        assert_eq!(model.booking_status, "PENDING");

        // the idempotency secondary entry is maintained alongside
        let by_key = repo
            .find_booking_by_idempotency_key("key-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_key.id, 42);
    }

    #[tokio::test]
    async fn deleted_marker_removes_the_projection() {
        let repo = repo();
        let upsert = r#"{"payload": {
            "id": 7, "name": "Loft", "description": "d", "location": "Lisbon",
            "price_per_night": 200.0, "__deleted": "false"
        }}"#;
        apply_change(&repo, SyncedTable::Properties, upsert).await.unwrap();
        assert!(repo.get_property(7).await.unwrap().is_some());

        let delete = r#"{"payload": {
            "id": 7, "name": "Loft", "description": "d", "location": "Lisbon",
            "price_per_night": 200.0, "__deleted": "true"
        }}"#;
        apply_change(&repo, SyncedTable::Properties, delete).await.unwrap();
        assert!(repo.get_property(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn availability_changes_land_in_the_per_property_hash() {
        let repo = repo();
        let record = r#"{"payload": {
            "property_id": 7, "date": 20240, "booking_id": null,
            "is_available": true, "__deleted": "false"
        }}"#;
        apply_change(&repo, SyncedTable::Availabilities, record).await.unwrap();

        let slot = repo.get_availability_on(7, "2025-06-01").await.unwrap().unwrap();
        assert!(slot.is_available);
        assert_eq!(slot.booking_id, None);

        // the booked rewrite of the same date overwrites in place
        let booked = r#"{"payload": {
            "property_id": 7, "date": 20240, "booking_id": 42,
            "is_available": false, "__deleted": "false"
        }}"#;
        apply_change(&repo, SyncedTable::Availabilities, booked).await.unwrap();
        let slot = repo.get_availability_on(7, "2025-06-01").await.unwrap().unwrap();
        assert_eq!(slot.booking_id, Some(42));
        assert_eq!(repo.get_availability(7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_records_error_without_touching_the_cache() {
        let repo = repo();
        assert!(apply_change(&repo, SyncedTable::Bookings, "{not json").await.is_err());
        assert!(
            apply_change(&repo, SyncedTable::Bookings, r#"{"payload": {"id": "nope"}}"#)
                .await
                .is_err()
        );
        assert!(repo.get_all_bookings().await.unwrap().is_empty());
    }
}
