//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, OpenAiVisionOracle},
    config::Config,
    error::ApiError,
    web::{
        claim_task_handler, create_reward_handler, create_task_handler, create_user_handler,
        get_balance_handler, get_task_handler, get_user_by_email_handler, list_collections_handler,
        list_recent_tasks_handler, list_rewards_handler, list_tasks_handler,
        list_transactions_handler, list_unread_handler, mark_read_handler,
        notification_stream_handler, redeem_reward_handler, rename_user_handler, request_id,
        require_caller, rest::ApiDoc, state::AppState, verify_task_handler,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use waste_rewards_core::{RewardsService, ServiceSettings};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(config.store_timeout)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize the Verification Oracle ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let oracle = Arc::new(OpenAiVisionOracle::new(
        Client::with_config(openai_config),
        config.oracle_model.clone(),
    ));

    // --- 4. Build the Shared AppState ---
    let service = Arc::new(RewardsService::new(
        db_adapter,
        oracle,
        ServiceSettings {
            balance_window: config.balance_window,
            store_timeout: config.store_timeout,
            oracle_timeout: config.oracle_timeout,
        },
    ));
    let shutdown = CancellationToken::new();
    let app_state = Arc::new(AppState {
        service,
        config: config.clone(),
        shutdown: shutdown.clone(),
    });

    // --- 5. Shutdown Signal ---
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for the shutdown signal: {}", e);
                return;
            }
            info!("Shutdown signal received.");
            shutdown.cancel();
        }
    });

    let origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static("x-user-id"),
            HeaderName::from_static("x-request-id"),
        ]);

    // --- 6. Create the Web Router ---
    // Public routes (no caller required)
    let public_routes = Router::new()
        .route("/users", post(create_user_handler))
        .route("/users/by-email/{email}", get(get_user_by_email_handler));

    // Protected routes (x-user-id required)
    let protected_routes = Router::new()
        .route("/users/me", patch(rename_user_handler))
        .route("/tasks", post(create_task_handler).get(list_tasks_handler))
        .route("/tasks/recent", get(list_recent_tasks_handler))
        .route("/tasks/{id}", get(get_task_handler))
        .route("/tasks/{id}/claim", post(claim_task_handler))
        .route("/tasks/{id}/verify", post(verify_task_handler))
        .route("/collections", get(list_collections_handler))
        .route("/balance", get(get_balance_handler))
        .route("/transactions", get(list_transactions_handler))
        .route("/rewards", get(list_rewards_handler).post(create_reward_handler))
        .route("/rewards/{id}/redeem", post(redeem_reward_handler))
        .route("/notifications", get(list_unread_handler))
        .route("/notifications/stream", get(notification_stream_handler))
        .route("/notifications/{id}/read", post(mark_read_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_caller,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(axum_middleware::from_fn(request_id))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    info!("Server stopped.");

    Ok(())
}
