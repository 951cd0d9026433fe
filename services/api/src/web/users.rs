//! services/api/src/web/users.rs
//!
//! User directory endpoints. Sign-in is handled by an external identity
//! provider; these only register and look up users.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::web::middleware::CallerId;
use crate::web::protocol::{CreateUserRequest, RenameUserRequest, UserResponse};
use crate::web::state::AppState;

/// POST /users - Register a user
#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Invalid email or empty name")
    )
)]
pub async fn create_user_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.service.create_user(&req.email, &req.name).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// GET /users/by-email/{email} - Look up a user by email
#[utoipa::path(
    get,
    path = "/users/by-email/{email}",
    params(("email" = String, Path, description = "The user's email address.")),
    responses(
        (status = 200, description = "User found", body = UserResponse),
        (status = 404, description = "No user with that email")
    )
)]
pub async fn get_user_by_email_handler(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.service.get_user_by_email(&email).await?;
    Ok(Json(user.into()))
}

/// PATCH /users/me - Change the caller's display name
#[utoipa::path(
    patch,
    path = "/users/me",
    request_body = RenameUserRequest,
    params(("x-user-id" = i32, Header, description = "The acting user.")),
    responses(
        (status = 200, description = "User renamed", body = UserResponse),
        (status = 422, description = "Empty name")
    )
)]
pub async fn rename_user_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
    Json(req): Json<RenameUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.service.rename_user(caller.0, &req.name).await?;
    Ok(Json(user.into()))
}
