//! services/api/src/web/middleware.rs
//!
//! Request tagging and caller identification for protected routes.

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{error, info_span, Instrument};
use uuid::Uuid;
use waste_rewards_core::ports::PortError;

use crate::web::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// The user id the caller acts as. Identity is established upstream; this
/// service only checks that the user exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub i32);

/// Parses the `x-user-id` header value.
pub fn parse_caller(value: Option<&str>) -> Option<CallerId> {
    value
        .and_then(|v| v.trim().parse::<i32>().ok())
        .filter(|id| *id > 0)
        .map(CallerId)
}

/// Middleware that resolves the `x-user-id` header into a `CallerId`.
///
/// If valid, inserts the caller into request extensions for handlers to use.
/// If missing, malformed or unknown, returns 401 Unauthorized.
pub async fn require_caller(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract and parse the header
    let caller = parse_caller(
        req.headers()
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok()),
    )
    .ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Make sure the user exists
    state.service.get_user(caller.0).await.map_err(|e| match e {
        PortError::NotFound(_) => StatusCode::UNAUTHORIZED,
        PortError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        other => {
            error!("Failed to resolve caller: {:?}", other);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?;

    // 3. Insert caller into request extensions and continue
    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

/// Middleware that tags every request with an id, recorded on a tracing span and
/// echoed in the response headers. A well-formed incoming id is reused.
pub async fn request_id(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .unwrap_or_else(Uuid::new_v4);

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let mut response = next.run(req).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_header_must_be_a_positive_integer() {
        assert_eq!(parse_caller(Some("42")), Some(CallerId(42)));
        assert_eq!(parse_caller(Some(" 7 ")), Some(CallerId(7)));
        assert_eq!(parse_caller(Some("0")), None);
        assert_eq!(parse_caller(Some("-3")), None);
        assert_eq!(parse_caller(Some("alice")), None);
        assert_eq!(parse_caller(None), None);
    }
}
