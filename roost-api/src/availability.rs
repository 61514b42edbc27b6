use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use roost_domain::availability::CreateAvailabilityRequest;
use roost_domain::read_models::AvailabilityReadModel;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct CreateSlotsResponse {
    property_id: i64,
    created: u64,
}

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/v1/properties/{id}/availability",
        post(create_slots).get(get_availability),
    )
}

async fn create_slots(
    State(state): State<AppState>,
    Path(property_id): Path<i64>,
    Json(req): Json<CreateAvailabilityRequest>,
) -> Result<Json<CreateSlotsResponse>, AppError> {
    if req.from_date > req.to_date {
        return Err(AppError::ValidationError(
            "from_date must not be after to_date".to_string(),
        ));
    }
    if state.properties.find(property_id).await?.is_none() {
        return Err(AppError::NotFoundError(format!("property {property_id} not found")));
    }
    let created = state
        .availability
        .create_slots(property_id, req.from_date, req.to_date)
        .await?;
    Ok(Json(CreateSlotsResponse { property_id, created }))
}

async fn get_availability(
    State(state): State<AppState>,
    Path(property_id): Path<i64>,
) -> Result<Json<Vec<AvailabilityReadModel>>, AppError> {
    let cached = state.read_models.get_availability(property_id).await?;
    if !cached.is_empty() {
        return Ok(Json(cached));
    }
    // cold cache, serve from the write store instead
    let slots = state.availability.find_by_property(property_id).await?;
    Ok(Json(
        slots
            .into_iter()
            .map(|slot| AvailabilityReadModel {
                property_id: slot.property_id,
                date: slot.date.to_string(),
                booking_id: slot.booking_id,
                is_available: slot.is_available,
            })
            .collect(),
    ))
}
