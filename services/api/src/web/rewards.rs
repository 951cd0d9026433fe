//! services/api/src/web/rewards.rs
//!
//! Balance, transaction history and reward catalog endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use std::sync::Arc;
use waste_rewards_core::NewRewardOffer;

use crate::error::ApiError;
use crate::web::middleware::CallerId;
use crate::web::protocol::{
    BalanceResponse, CreateRewardRequest, LedgerEntryResponse, LimitQuery, RewardResponse,
};
use crate::web::state::AppState;

const DEFAULT_TRANSACTION_PAGE: usize = 10;

#[utoipa::path(
    get,
    path = "/balance",
    params(("x-user-id" = i32, Header, description = "The acting user.")),
    responses((status = 200, description = "Spendable points", body = BalanceResponse))
)]
pub async fn get_balance_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.service.get_balance(caller.0).await?;
    Ok(Json(BalanceResponse {
        user_id: caller.0,
        balance,
    }))
}

/// The caller's ledger, newest first.
#[utoipa::path(
    get,
    path = "/transactions",
    params(LimitQuery, ("x-user-id" = i32, Header, description = "The acting user.")),
    responses((status = 200, description = "Ledger entries", body = [LedgerEntryResponse]))
)]
pub async fn list_transactions_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<LedgerEntryResponse>>, ApiError> {
    let entries = state
        .service
        .list_transactions(caller.0, query.resolve(DEFAULT_TRANSACTION_PAGE))
        .await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

/// Available rewards. The first entry (id 0) carries the caller's balance as its cost.
#[utoipa::path(
    get,
    path = "/rewards",
    params(("x-user-id" = i32, Header, description = "The acting user.")),
    responses((status = 200, description = "Points summary followed by available rewards", body = [RewardResponse]))
)]
pub async fn list_rewards_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
) -> Result<Json<Vec<RewardResponse>>, ApiError> {
    let rewards = state.service.list_available_rewards(caller.0).await?;
    Ok(Json(rewards.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/rewards",
    request_body = CreateRewardRequest,
    params(("x-user-id" = i32, Header, description = "The acting user.")),
    responses(
        (status = 201, description = "Reward added to the catalog", body = RewardResponse),
        (status = 422, description = "Empty name or non-positive cost")
    )
)]
pub async fn create_reward_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRewardRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let offer = state
        .service
        .create_reward_offer(NewRewardOffer {
            name: req.name,
            cost: req.cost,
            description: req.description,
            collection_info: req.collection_info,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(RewardResponse::from(offer))))
}

/// Spend points on a reward.
#[utoipa::path(
    post,
    path = "/rewards/{id}/redeem",
    params(
        ("id" = i32, Path, description = "Reward id."),
        ("x-user-id" = i32, Header, description = "The acting user.")
    ),
    responses(
        (status = 200, description = "Reward redeemed", body = LedgerEntryResponse),
        (status = 404, description = "No such reward"),
        (status = 409, description = "Not enough points, or reward unavailable")
    )
)]
pub async fn redeem_reward_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CallerId>,
    Path(reward_id): Path<i32>,
) -> Result<Json<LedgerEntryResponse>, ApiError> {
    let entry = state.service.redeem_reward(caller.0, reward_id).await?;
    Ok(Json(entry.into()))
}
