use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use roost_domain::booking::{Booking, BookingStatus, CreateBookingRequest, UpdateBookingRequest};
use roost_domain::read_models::BookingReadModel;
use roost_domain::saga::SagaEventType;
use roost_saga::booking_payload;
use roost_store::BookingStore;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct UpdateAck {
    booking_id: i64,
    status: String,
    message: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(list_bookings))
        .route("/v1/bookings/status", put(update_booking_status))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/users/{id}/bookings", get(bookings_by_user))
        .route("/v1/properties/{id}/bookings", get(bookings_by_property))
}

async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Json<Booking>, AppError> {
    validate_dates(req.check_in_date, req.check_out_date)?;

    if state.users.find(req.user_id).await?.is_none() {
        return Err(AppError::NotFoundError(format!("user {} not found", req.user_id)));
    }
    let property = state
        .properties
        .find(req.property_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("property {} not found", req.property_id)))?;

    // the stay occupies nights up to the day before check-out
    let last_night = req.check_out_date - chrono::Duration::days(1);
    state
        .locks
        .lock_and_check_availability(req.property_id, req.check_in_date, last_night, req.user_id)
        .await?;

    let nights = (req.check_out_date - req.check_in_date).num_days();
    let total_price = nights as f64 * property.price_per_night;
    let idempotency_key = Uuid::new_v4().to_string();

    let booking = match state
        .bookings
        .create(
            req.user_id,
            req.property_id,
            total_price,
            &idempotency_key,
            req.check_in_date,
            req.check_out_date,
        )
        .await
    {
        Ok(booking) => booking,
        Err(e) => {
            // the saga never runs for this booking, so nothing else would free it
            if let Err(release_err) = state
                .locks
                .release_booking_lock(req.property_id, req.check_in_date, last_night, req.user_id)
                .await
            {
                warn!("failed to release availability lock after create failure: {release_err}");
            }
            return Err(e.into());
        }
    };

    state
        .publisher
        .publish(
            SagaEventType::BookingCreated,
            "CREATE_BOOKING",
            booking_payload(
                booking.id,
                booking.property_id,
                booking.user_id,
                booking.check_in_date,
                booking.check_out_date,
            ),
        )
        .await?;

    info!("booking {} created for property {}", booking.id, booking.property_id);
    Ok(Json(booking))
}

async fn update_booking_status(
    State(state): State<AppState>,
    Json(req): Json<UpdateBookingRequest>,
) -> Result<Json<UpdateAck>, AppError> {
    let booking = resolve_booking(&state, &req).await?;

    let Some(token) = state.locks.lock_booking_update(booking.id).await? else {
        return Err(AppError::ConflictError(format!(
            "another update for booking {} is in flight, try again later",
            booking.id
        )));
    };

    let result: Result<&'static str, AppError> = async {
        let (event_type, step, action) = plan_status_update(&booking, req.status)?;
        state
            .publisher
            .publish(
                event_type,
                step,
                booking_payload(
                    booking.id,
                    booking.property_id,
                    booking.user_id,
                    booking.check_in_date,
                    booking.check_out_date,
                ),
            )
            .await?;
        Ok(action)
    }
    .await;

    if let Err(release_err) = state.locks.release_booking_update(booking.id, &token).await {
        warn!("failed to release update lock for booking {}: {release_err}", booking.id);
    }
    let action = result?;

    Ok(Json(UpdateAck {
        booking_id: booking.id,
        status: BookingStatus::Pending.to_string(),
        message: format!("booking {action} in progress"),
    }))
}

async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<BookingReadModel>, AppError> {
    if let Some(model) = state.read_models.get_booking(id).await? {
        return Ok(Json(model));
    }
    // cache miss, fall back to the write store
    let booking = state
        .bookings
        .find(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("booking {id} not found")))?;
    Ok(Json(to_read_model(&booking)))
}

async fn list_bookings(
    State(state): State<AppState>,
) -> Result<Json<Vec<BookingReadModel>>, AppError> {
    Ok(Json(state.read_models.get_all_bookings().await?))
}

async fn bookings_by_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.bookings.find_by_user(id).await?))
}

async fn bookings_by_property(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.bookings.find_by_property(id).await?))
}

/// Finds the booking a status update addresses, preferring the idempotency
/// key (the external correlation handle) over the raw id. Cache first, write
/// store as the authority.
async fn resolve_booking(
    state: &AppState,
    req: &UpdateBookingRequest,
) -> Result<Booking, AppError> {
    if let Some(key) = req.idempotency_key.as_deref().filter(|k| !k.trim().is_empty()) {
        if let Some(model) = state.read_models.find_booking_by_idempotency_key(key).await? {
            if let Some(booking) = state.bookings.find(model.id).await? {
                return Ok(booking);
            }
        }
        return state
            .bookings
            .find_by_idempotency_key(key)
            .await?
            .ok_or_else(|| AppError::NotFoundError(format!("booking with key {key} not found")));
    }
    if let Some(id) = req.booking_id {
        return state
            .bookings
            .find(id)
            .await?
            .ok_or_else(|| AppError::NotFoundError(format!("booking {id} not found")));
    }
    Err(AppError::ValidationError(
        "either idempotency_key or booking_id is required".to_string(),
    ))
}

/// Maps a requested status onto the saga event that drives it, refusing
/// anything but a PENDING booking: terminal states are owned by the saga and
/// are never overwritten from the request path, and no event may be published
/// for a refused update.
fn plan_status_update(
    booking: &Booking,
    requested: BookingStatus,
) -> Result<(SagaEventType, &'static str, &'static str), AppError> {
    let plan = match requested {
        BookingStatus::Confirmed => {
            (SagaEventType::BookingConfirmRequested, "CONFIRM_BOOKING", "confirmation")
        }
        BookingStatus::Cancelled => {
            (SagaEventType::BookingCancelRequested, "CANCEL_BOOKING", "cancellation")
        }
        BookingStatus::Pending => {
            return Err(AppError::ValidationError(
                "a booking cannot be moved back to PENDING".to_string(),
            ))
        }
    };
    if booking.status != BookingStatus::Pending {
        return Err(AppError::ConflictError(format!(
            "booking {} is already {}",
            booking.id, booking.status
        )));
    }
    Ok(plan)
}

fn validate_dates(check_in: NaiveDate, check_out: NaiveDate) -> Result<(), AppError> {
    if check_in >= check_out {
        return Err(AppError::ValidationError(
            "check-in date must be before check-out date".to_string(),
        ));
    }
    if check_out < Utc::now().date_naive() {
        return Err(AppError::ValidationError(
            "check-out date cannot be in the past".to_string(),
        ));
    }
    Ok(())
}

fn to_read_model(booking: &Booking) -> BookingReadModel {
    BookingReadModel {
        id: booking.id,
        property_id: booking.property_id,
        user_id: booking.user_id,
        total_price: booking.total_price,
        booking_status: booking.status.to_string(),
        idempotency_key: booking.idempotency_key.clone(),
        check_in_date: booking.check_in_date,
        check_out_date: booking.check_out_date,
    }
}
