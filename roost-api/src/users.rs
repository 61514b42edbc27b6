use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use roost_domain::user::{CreateUserRequest, User};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/users", post(create_user))
        .route("/v1/users/{id}", get(get_user))
}

async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<Json<User>, AppError> {
    if req.email.trim().is_empty() {
        return Err(AppError::ValidationError("email is required".to_string()));
    }
    Ok(Json(state.users.create(&req.name, &req.email).await?))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<User>, AppError> {
    state
        .users
        .find(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFoundError(format!("user {id} not found")))
}
