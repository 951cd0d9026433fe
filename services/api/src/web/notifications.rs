//! services/api/src/web/notifications.rs
//!
//! Notification endpoints, including a server-sent-events feed that re-pulls
//! the caller's unread notifications on a fixed interval.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use futures::Stream;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::web::middleware::CallerId;
use crate::web::protocol::NotificationResponse;
use crate::web::state::AppState;

#[utoipa::path(
    get,
    path = "/notifications",
    params(("x-user-id" = i32, Header, description = "The acting user.")),
    responses((status = 200, description = "Unread notifications, oldest first", body = [NotificationResponse]))
)]
pub async fn list_unread_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
) -> Result<Json<Vec<NotificationResponse>>, ApiError> {
    let unread = state.service.list_unread_notifications(caller.0).await?;
    Ok(Json(unread.into_iter().map(Into::into).collect()))
}

/// Marking an already read notification again is a no-op.
#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    params(
        ("id" = i32, Path, description = "Notification id."),
        ("x-user-id" = i32, Header, description = "The acting user.")
    ),
    responses(
        (status = 204, description = "Notification marked read"),
        (status = 404, description = "No such notification for the caller")
    )
)]
pub async fn mark_read_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
    Path(notification_id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    state
        .service
        .mark_notification_read(caller.0, notification_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Stream of `notifications` events, each carrying the full unread list.
#[utoipa::path(
    get,
    path = "/notifications/stream",
    params(("x-user-id" = i32, Header, description = "The acting user.")),
    responses((status = 200, description = "Server-sent events", content_type = "text/event-stream"))
)]
pub async fn notification_stream_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let service = state.service.clone();
    let shutdown = state.shutdown.clone();
    let period = state.config.notification_poll_interval;

    let stream = async_stream::stream! {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match service.list_unread_notifications(caller.0).await {
                Ok(unread) => {
                    let body: Vec<NotificationResponse> =
                        unread.into_iter().map(Into::into).collect();
                    yield Event::default().event("notifications").json_data(body);
                }
                // The next tick retries.
                Err(e) => warn!(user_id = caller.0, error = %e, "Notification poll failed"),
            }
        }
        debug!(user_id = caller.0, "Notification feed closed");
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
