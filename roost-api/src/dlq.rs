use axum::{
    extract::State,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};

use roost_domain::saga::DeadLetterEvent;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/admin/dlq/size", get(dlq_size))
        .route("/v1/admin/dlq/events", get(dlq_events))
        .route("/v1/admin/dlq/replay-one", post(replay_one))
        .route("/v1/admin/dlq/replay-all", post(replay_all))
        .route("/v1/admin/dlq", delete(clear))
}

async fn dlq_size(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let size = state.dlq.size().await?;
    Ok(Json(json!({ "size": size })))
}

async fn dlq_events(State(state): State<AppState>) -> Result<Json<Vec<DeadLetterEvent>>, AppError> {
    Ok(Json(state.dlq.list_events().await?))
}

async fn replay_one(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let outcome = state.dlq.replay_one().await?;
    Ok(Json(json!({ "result": outcome })))
}

async fn replay_all(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let outcome = state.dlq.replay_all().await?;
    Ok(Json(json!({ "result": outcome })))
}

async fn clear(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let outcome = state.dlq.clear().await?;
    Ok(Json(json!({ "result": outcome })))
}
