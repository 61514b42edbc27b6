use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One calendar night for one property. A slot referencing a booking is never
/// available; exactly one booking may reference a slot at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub property_id: i64,
    pub date: NaiveDate,
    pub booking_id: Option<i64>,
    pub is_available: bool,
}

impl AvailabilitySlot {
    pub fn open(property_id: i64, date: NaiveDate) -> Self {
        Self {
            property_id,
            date,
            booking_id: None,
            is_available: true,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAvailabilityRequest {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}
