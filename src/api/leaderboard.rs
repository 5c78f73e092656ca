//! Leaderboard API
//!
//! - GET /api/leaderboard - Accounts ranked by total asset value

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::ApiResponse;
use crate::error::AppError;
use crate::types::LeaderboardEntry;
use crate::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

/// Create leaderboard router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_leaderboard))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<usize>,
}

/// GET /api/leaderboard
async fn get_leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<ApiResponse<Vec<LeaderboardEntry>>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let entries = state.store.leaderboard(limit)?;
    Ok(Json(ApiResponse { data: entries }))
}
