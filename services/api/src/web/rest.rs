//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the task endpoints and the master
//! definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::middleware::CallerId;
use crate::web::protocol::{
    BalanceResponse, CollectionResponse, CreateRewardRequest, CreateTaskRequest,
    CreateUserRequest, JudgmentResponse, LedgerEntryResponse, LimitQuery, NotificationResponse,
    RenameUserRequest, RewardResponse, TaskResponse, UserResponse, VerificationResponse,
};
use crate::web::state::AppState;
use crate::web::{notifications, rewards, users};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use bytes::Bytes;
use std::sync::Arc;
use tracing::info;
use utoipa::OpenApi;
use waste_rewards_core::NewTask;

const DEFAULT_TASK_PAGE: usize = 10;
const DEFAULT_RECENT_PAGE: usize = 5;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_task_handler,
        list_tasks_handler,
        list_recent_tasks_handler,
        get_task_handler,
        claim_task_handler,
        verify_task_handler,
        list_collections_handler,
        users::create_user_handler,
        users::get_user_by_email_handler,
        users::rename_user_handler,
        rewards::get_balance_handler,
        rewards::list_transactions_handler,
        rewards::list_rewards_handler,
        rewards::create_reward_handler,
        rewards::redeem_reward_handler,
        notifications::list_unread_handler,
        notifications::mark_read_handler,
        notifications::notification_stream_handler,
    ),
    components(
        schemas(
            CreateTaskRequest, TaskResponse, JudgmentResponse, VerificationResponse,
            CollectionResponse, CreateUserRequest, RenameUserRequest, UserResponse,
            BalanceResponse, LedgerEntryResponse, RewardResponse, CreateRewardRequest,
            NotificationResponse
        )
    ),
    tags(
        (name = "Waste Rewards API", description = "Waste reports, collection tasks, verification and reward points.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Task Handlers
//=========================================================================================

/// Report a new waste location. The reporter earns 10 points.
#[utoipa::path(
    post,
    path = "/tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task reported", body = TaskResponse),
        (status = 401, description = "Missing or unknown x-user-id"),
        (status = 422, description = "Empty location, waste type or amount")
    ),
    params(("x-user-id" = i32, Header, description = "The acting user."))
)]
pub async fn create_task_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .service
        .create_task(NewTask {
            reporter_id: caller.0,
            location: req.location,
            waste_type: req.waste_type,
            amount: req.amount,
            photo_ref: req.photo_ref,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(TaskResponse::from(task))))
}

/// List collection tasks, oldest first.
#[utoipa::path(
    get,
    path = "/tasks",
    params(LimitQuery, ("x-user-id" = i32, Header, description = "The acting user.")),
    responses((status = 200, description = "Tasks", body = [TaskResponse]))
)]
pub async fn list_tasks_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let tasks = state
        .service
        .list_tasks(query.resolve(DEFAULT_TASK_PAGE))
        .await?;
    Ok(Json(tasks.into_iter().map(TaskResponse::from).collect()))
}

/// List the most recently reported tasks, newest first.
#[utoipa::path(
    get,
    path = "/tasks/recent",
    params(LimitQuery, ("x-user-id" = i32, Header, description = "The acting user.")),
    responses((status = 200, description = "Recent tasks", body = [TaskResponse]))
)]
pub async fn list_recent_tasks_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let tasks = state
        .service
        .list_recent_tasks(query.resolve(DEFAULT_RECENT_PAGE))
        .await?;
    Ok(Json(tasks.into_iter().map(TaskResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/tasks/{id}",
    params(
        ("id" = i32, Path, description = "Task id."),
        ("x-user-id" = i32, Header, description = "The acting user.")
    ),
    responses(
        (status = 200, description = "The task", body = TaskResponse),
        (status = 404, description = "No such task")
    )
)]
pub async fn get_task_handler(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i32>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state.service.get_task(task_id).await?;
    Ok(Json(task.into()))
}

/// Claim a pending task for the caller.
#[utoipa::path(
    post,
    path = "/tasks/{id}/claim",
    params(
        ("id" = i32, Path, description = "Task id."),
        ("x-user-id" = i32, Header, description = "The collecting user.")
    ),
    responses(
        (status = 200, description = "Task claimed", body = TaskResponse),
        (status = 404, description = "No such task"),
        (status = 409, description = "Task is not pending")
    )
)]
pub async fn claim_task_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
    Path(task_id): Path<i32>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state.service.claim_task(task_id, caller.0).await?;
    Ok(Json(task.into()))
}

/// Submit a collection photo for verification.
///
/// Accepts a multipart/form-data request with a `photo` part. A rejected photo
/// is a normal response with `accepted: false`; a verification that could not
/// run answers 502.
#[utoipa::path(
    post,
    path = "/tasks/{id}/verify",
    request_body(content_type = "multipart/form-data", description = "A `photo` part with the collected waste."),
    params(
        ("id" = i32, Path, description = "Task id."),
        ("x-user-id" = i32, Header, description = "The assigned collector.")
    ),
    responses(
        (status = 200, description = "Verification ran", body = VerificationResponse),
        (status = 400, description = "Missing photo"),
        (status = 403, description = "Caller is not the assigned collector"),
        (status = 409, description = "Task is not in progress"),
        (status = 502, description = "Verification could not be performed")
    )
)]
pub async fn verify_task_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
    Path(task_id): Path<i32>,
    mut multipart: Multipart,
) -> Result<Json<VerificationResponse>, ApiError> {
    let mut photo: Option<(Bytes, String)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart data: {}", e)))?
    {
        if field.name() != Some("photo") {
            continue;
        }
        let mime_type = field.content_type().unwrap_or("image/jpeg").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read photo bytes: {}", e)))?;
        photo = Some((data, mime_type));
    }
    let (data, mime_type) = photo
        .filter(|(data, _)| !data.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Multipart form must include a photo".to_string()))?;

    info!(task_id, collector_id = caller.0, bytes = data.len(), "Verifying collection");
    let outcome = state
        .service
        .submit_verification(task_id, caller.0, &data, &mime_type)
        .await?;
    Ok(Json(outcome.into()))
}

/// List the caller's verified collections.
#[utoipa::path(
    get,
    path = "/collections",
    params(("x-user-id" = i32, Header, description = "The collecting user.")),
    responses((status = 200, description = "Collections", body = [CollectionResponse]))
)]
pub async fn list_collections_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
) -> Result<Json<Vec<CollectionResponse>>, ApiError> {
    let collections = state.service.list_collections(caller.0).await?;
    Ok(Json(collections.into_iter().map(Into::into).collect()))
}
