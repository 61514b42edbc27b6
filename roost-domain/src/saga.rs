use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Closed set of saga event kinds. Deserializing an unknown tag fails, so
/// upstream schema drift surfaces as a serialization error instead of being
/// silently ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaEventType {
    BookingCreated,
    BookingConfirmRequested,
    BookingConfirmed,
    BookingCancelRequested,
    BookingCancelled,
    BookingCompensated,
}

impl SagaEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaEventType::BookingCreated => "BOOKING_CREATED",
            SagaEventType::BookingConfirmRequested => "BOOKING_CONFIRM_REQUESTED",
            SagaEventType::BookingConfirmed => "BOOKING_CONFIRMED",
            SagaEventType::BookingCancelRequested => "BOOKING_CANCEL_REQUESTED",
            SagaEventType::BookingCancelled => "BOOKING_CANCELLED",
            SagaEventType::BookingCompensated => "BOOKING_COMPENSATED",
        }
    }
}

impl std::fmt::Display for SagaEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    Pending,
}

/// Payload keys. Everything is carried as a string so an event survives a
/// serialization round trip unchanged.
pub mod payload {
    pub const BOOKING_ID: &str = "bookingId";
    pub const PROPERTY_ID: &str = "propertyId";
    pub const USER_ID: &str = "userId";
    pub const CHECK_IN_DATE: &str = "checkInDate";
    pub const CHECK_OUT_DATE: &str = "checkOutDate";
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload key '{0}' missing")]
    Missing(String),
    #[error("payload key '{key}' has invalid value '{value}'")]
    Invalid { key: String, value: String },
}

/// A self-contained saga event: a handler must be able to process it from the
/// payload plus the durable store alone, never from publisher memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaEvent {
    pub saga_id: String,
    pub event_type: SagaEventType,
    pub step: String,
    pub payload: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
    pub status: SagaStatus,
}

impl SagaEvent {
    pub fn new(event_type: SagaEventType, step: &str, payload: HashMap<String, String>) -> Self {
        Self {
            saga_id: Uuid::new_v4().to_string(),
            event_type,
            step: step.to_string(),
            payload,
            timestamp: Utc::now(),
            status: SagaStatus::Pending,
        }
    }

    pub fn payload_str(&self, key: &str) -> Result<&str, PayloadError> {
        self.payload
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| PayloadError::Missing(key.to_string()))
    }

    pub fn payload_i64(&self, key: &str) -> Result<i64, PayloadError> {
        let raw = self.payload_str(key)?;
        raw.parse().map_err(|_| PayloadError::Invalid {
            key: key.to_string(),
            value: raw.to_string(),
        })
    }

    pub fn payload_date(&self, key: &str) -> Result<NaiveDate, PayloadError> {
        let raw = self.payload_str(key)?;
        raw.parse().map_err(|_| PayloadError::Invalid {
            key: key.to_string(),
            value: raw.to_string(),
        })
    }
}

impl std::fmt::Display for SagaEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} saga_id={} booking_id={}",
            self.event_type,
            self.saga_id,
            self.payload
                .get(payload::BOOKING_ID)
                .map(String::as_str)
                .unwrap_or("?")
        )
    }
}

/// Wraps an event that exhausted its retries, with enough context to inspect
/// and replay it later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEvent {
    pub original_event: SagaEvent,
    pub error_message: String,
    pub attempt_count: u32,
    pub failed_at: DateTime<Utc>,
}
