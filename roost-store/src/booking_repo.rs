use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use roost_domain::booking::{Booking, BookingStatus};

use crate::backend::BookingStore;
use crate::error::StoreError;

#[derive(Clone)]
pub struct PgBookingStore {
    pool: Pool<Postgres>,
}

impl PgBookingStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i64,
        property_id: i64,
        total_price: f64,
        idempotency_key: &str,
        check_in_date: NaiveDate,
        check_out_date: NaiveDate,
    ) -> Result<Booking, StoreError> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            INSERT INTO bookings
                (user_id, property_id, total_price, status, idempotency_key,
                 check_in_date, check_out_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(property_id)
        .bind(total_price)
        .bind(BookingStatus::Pending.as_str())
        .bind(idempotency_key)
        .bind(check_in_date)
        .bind(check_out_date)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(Booking {
            id: row.try_get("id")?,
            user_id,
            property_id,
            total_price,
            status: BookingStatus::Pending,
            idempotency_key: idempotency_key.to_string(),
            check_in_date,
            check_out_date,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_by_idempotency_key(
        &self,
        idempotency_key: &str,
    ) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query("SELECT * FROM bookings WHERE idempotency_key = $1")
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| booking_from_row(&r)).transpose()
    }

    pub async fn find_by_user(&self, user_id: i64) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query("SELECT * FROM bookings WHERE user_id = $1 ORDER BY created_at")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(booking_from_row).collect()
    }

    pub async fn find_by_property(&self, property_id: i64) -> Result<Vec<Booking>, StoreError> {
        let rows = sqlx::query("SELECT * FROM bookings WHERE property_id = $1 ORDER BY created_at")
            .bind(property_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(booking_from_row).collect()
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn find(&self, id: i64) -> Result<Option<Booking>, StoreError> {
        let row = sqlx::query("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| booking_from_row(&r)).transpose()
    }

    async fn set_status(&self, id: i64, status: BookingStatus) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE bookings SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn booking_from_row(row: &PgRow) -> Result<Booking, StoreError> {
    let status_raw: String = row.try_get("status")?;
    let status = status_raw
        .parse::<BookingStatus>()
        .map_err(StoreError::CorruptRow)?;
    Ok(Booking {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        property_id: row.try_get("property_id")?,
        total_price: row.try_get("total_price")?,
        status,
        idempotency_key: row.try_get("idempotency_key")?,
        check_in_date: row.try_get("check_in_date")?,
        check_out_date: row.try_get("check_out_date")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
