//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how it is
//! rendered as an HTTP response.

use crate::config::ConfigError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;
use waste_rewards_core::ports::PortError;

/// Seconds a client should wait before retrying after `StoreUnavailable`.
const RETRY_AFTER_SECS: &str = "2";

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("{0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failed schema migration at startup.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The request itself was malformed (missing header, bad multipart body, ...).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Port(port) => match port {
                PortError::NotFound(_) => StatusCode::NOT_FOUND,
                PortError::InvalidTransition { .. }
                | PortError::Conflict(_)
                | PortError::InsufficientBalance { .. } => StatusCode::CONFLICT,
                PortError::Forbidden { .. } => StatusCode::FORBIDDEN,
                PortError::InvalidAmount(_) | PortError::Validation(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                PortError::OracleParse(_) => StatusCode::BAD_GATEWAY,
                PortError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal details stay in the log.
        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!("Request failed: {:?}", self);
            match status {
                StatusCode::BAD_GATEWAY => "Verification could not be performed".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };

        let body = Json(json!({ "error": message }));
        if status == StatusCode::SERVICE_UNAVAILABLE {
            error!("Store unavailable: {:?}", self);
            return (status, [(header::RETRY_AFTER, RETRY_AFTER_SECS)], body).into_response();
        }
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waste_rewards_core::TaskStatus;

    #[test]
    fn port_errors_map_to_distinct_statuses() {
        let cases = [
            (PortError::NotFound("task".into()), StatusCode::NOT_FOUND),
            (
                PortError::InvalidTransition {
                    task_id: 1,
                    from: TaskStatus::Verified,
                    to: TaskStatus::InProgress,
                },
                StatusCode::CONFLICT,
            ),
            (
                PortError::Forbidden {
                    task_id: 1,
                    collector_id: 2,
                },
                StatusCode::FORBIDDEN,
            ),
            (PortError::InvalidAmount(0), StatusCode::UNPROCESSABLE_ENTITY),
            (PortError::OracleParse("x".into()), StatusCode::BAD_GATEWAY),
            (
                PortError::StoreUnavailable("pool".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (port, expected) in cases {
            assert_eq!(ApiError::from(port).status_code(), expected);
        }
    }

    #[test]
    fn unavailable_store_asks_clients_to_retry() {
        let response = ApiError::from(PortError::StoreUnavailable("timeout".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
    }

    #[test]
    fn bad_requests_are_client_errors() {
        let response = ApiError::BadRequest("missing photo".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
