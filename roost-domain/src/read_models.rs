//! Cache-resident projections of the write-side rows. These are derived,
//! replaceable data: the relational store stays the source of truth and the
//! CDC consumers overwrite these unconditionally (last-write-wins).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingReadModel {
    pub id: i64,
    pub property_id: i64,
    pub user_id: i64,
    pub total_price: f64,
    pub booking_status: String,
    pub idempotency_key: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyReadModel {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub location: String,
    pub price_per_night: f64,
}

/// Stored in a per-property hash keyed by ISO date so a whole calendar is one
/// round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityReadModel {
    pub property_id: i64,
    pub date: String,
    pub booking_id: Option<i64>,
    pub is_available: bool,
}
