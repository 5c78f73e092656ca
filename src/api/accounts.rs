//! Accounts API
//!
//! - POST /api/accounts - Open an account with starting cash (idempotent)
//! - GET /api/accounts/:uid - Account with total asset at live prices
//! - POST /api/accounts/:uid/reward - Claim the periodic cash bonus

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{get, post},
    Json, Router,
};

use super::ApiResponse;
use crate::error::AppError;
use crate::types::{CreateAccountRequest, RewardGrant, UserAccount};
use crate::AppState;

/// Create accounts router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_account))
        .route("/:uid", get(get_account))
        .route("/:uid/reward", post(claim_reward))
}

/// POST /api/accounts
async fn create_account(
    State(state): State<AppState>,
    payload: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<UserAccount>>, AppError> {
    let Json(request) = payload?;
    let account = state
        .trading
        .open_account(&request.uid, request.user_id.as_deref())?;
    Ok(Json(ApiResponse { data: account }))
}

/// GET /api/accounts/:uid
async fn get_account(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<ApiResponse<UserAccount>>, AppError> {
    let account = state.trading.get_account(&uid)?;
    Ok(Json(ApiResponse { data: account }))
}

/// POST /api/accounts/:uid/reward
async fn claim_reward(
    State(state): State<AppState>,
    Path(uid): Path<String>,
) -> Result<Json<ApiResponse<RewardGrant>>, AppError> {
    let grant = state.trading.grant_reward(&uid)?;
    Ok(Json(ApiResponse { data: grant }))
}
