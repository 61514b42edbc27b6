use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use roost_domain::availability::AvailabilitySlot;

use crate::backend::{AvailabilityStore, BookOutcome};
use crate::error::StoreError;

#[derive(Clone)]
pub struct PgAvailabilityStore {
    pool: Pool<Postgres>,
}

impl PgAvailabilityStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Opens a slot for every night in [from, to]; existing slots are left
    /// untouched so re-initializing a calendar is safe.
    pub async fn create_slots(
        &self,
        property_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut created = 0;
        let mut date = from;
        while date <= to {
            let result = sqlx::query(
                r#"
                INSERT INTO availabilities (property_id, date, is_available, created_at, updated_at)
                VALUES ($1, $2, TRUE, $3, $3)
                ON CONFLICT (property_id, date) DO NOTHING
                "#,
            )
            .bind(property_id)
            .bind(date)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
            created += result.rows_affected();
            date += chrono::Duration::days(1);
        }
        tx.commit().await?;
        Ok(created)
    }

    pub async fn find_by_property(
        &self,
        property_id: i64,
    ) -> Result<Vec<AvailabilitySlot>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM availabilities WHERE property_id = $1 ORDER BY date")
                .bind(property_id)
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(slot_from_row).collect()
    }
}

#[async_trait]
impl AvailabilityStore for PgAvailabilityStore {
    async fn count_booked(
        &self,
        property_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS booked FROM availabilities
            WHERE property_id = $1 AND date BETWEEN $2 AND $3 AND booking_id IS NOT NULL
            "#,
        )
        .bind(property_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("booked")?)
    }

    async fn slots_in_range(
        &self,
        property_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<AvailabilitySlot>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM availabilities
            WHERE property_id = $1 AND date BETWEEN $2 AND $3
            ORDER BY date
            "#,
        )
        .bind(property_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(slot_from_row).collect()
    }

    async fn book_range(
        &self,
        booking_id: i64,
        property_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BookOutcome, StoreError> {
        // The recheck and the update share one transaction; the availability
        // lock keeps competing transactions off the same range, the recheck
        // catches anything that slipped in before the lock existed.
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS booked FROM availabilities
            WHERE property_id = $1 AND date BETWEEN $2 AND $3 AND booking_id IS NOT NULL
            "#,
        )
        .bind(property_id)
        .bind(from)
        .bind(to)
        .fetch_one(&mut *tx)
        .await?;
        let booked: i64 = row.try_get("booked")?;
        if booked > 0 {
            tx.rollback().await?;
            return Ok(BookOutcome::Conflict);
        }

        let result = sqlx::query(
            r#"
            UPDATE availabilities
            SET booking_id = $1, is_available = FALSE, updated_at = $2
            WHERE property_id = $3 AND date BETWEEN $4 AND $5
            "#,
        )
        .bind(booking_id)
        .bind(Utc::now())
        .bind(property_id)
        .bind(from)
        .bind(to)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(BookOutcome::Booked(result.rows_affected()))
    }

    async fn release_range(
        &self,
        booking_id: i64,
        property_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE availabilities
            SET booking_id = NULL, is_available = TRUE, updated_at = $1
            WHERE booking_id = $2 AND property_id = $3 AND date BETWEEN $4 AND $5
            "#,
        )
        .bind(Utc::now())
        .bind(booking_id)
        .bind(property_id)
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn slot_from_row(row: &PgRow) -> Result<AvailabilitySlot, StoreError> {
    Ok(AvailabilitySlot {
        property_id: row.try_get("property_id")?,
        date: row.try_get("date")?,
        booking_id: row.try_get("booking_id")?,
        is_available: row.try_get("is_available")?,
    })
}
