use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use roost_domain::property::{CreatePropertyRequest, Property};
use roost_domain::read_models::PropertyReadModel;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/properties", post(create_property).get(list_properties))
        .route("/v1/properties/{id}", get(get_property))
}

async fn create_property(
    State(state): State<AppState>,
    Json(req): Json<CreatePropertyRequest>,
) -> Result<Json<Property>, AppError> {
    if req.price_per_night <= 0.0 {
        return Err(AppError::ValidationError(
            "price_per_night must be positive".to_string(),
        ));
    }
    let property = state
        .properties
        .create(&req.name, &req.description, &req.location, req.price_per_night)
        .await?;
    Ok(Json(property))
}

async fn get_property(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PropertyReadModel>, AppError> {
    if let Some(model) = state.read_models.get_property(id).await? {
        return Ok(Json(model));
    }
    let property = state
        .properties
        .find(id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("property {id} not found")))?;
    Ok(Json(PropertyReadModel {
        id: property.id,
        name: property.name,
        description: property.description,
        location: property.location,
        price_per_night: property.price_per_night,
    }))
}

async fn list_properties(State(state): State<AppState>) -> Result<Json<Vec<Property>>, AppError> {
    Ok(Json(state.properties.list().await?))
}
