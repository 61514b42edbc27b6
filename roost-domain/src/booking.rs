use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub user_id: i64,
    pub property_id: i64,
    pub total_price: f64,
    pub status: BookingStatus,
    pub idempotency_key: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Last night actually occupied: a stay [check_in, check_out) covers the
    /// slots check_in ..= check_out - 1 day.
    pub fn last_night(&self) -> NaiveDate {
        self.check_out_date - chrono::Duration::days(1)
    }
}

/// A booking is only mutable while PENDING; the saga's booking handler is the
/// sole writer of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub user_id: i64,
    pub property_id: i64,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
}

/// Status-update requests address a booking by its idempotency key (the
/// external correlation handle) or directly by id.
#[derive(Debug, Deserialize)]
pub struct UpdateBookingRequest {
    pub idempotency_key: Option<String>,
    pub booking_id: Option<i64>,
    pub status: BookingStatus,
}
