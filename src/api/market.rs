//! Market API
//!
//! - GET /api/market - Current prices, game time, news and recent history
//! - GET /api/market/history/:stock_id - Price history for one instrument

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::ApiResponse;
use crate::error::AppError;
use crate::types::{HistoryPoint, MarketSnapshot};
use crate::AppState;

/// Create market router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_market))
        .route("/history/:stock_id", get(get_history))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Most recent points to return (defaults to the snapshot window)
    pub limit: Option<usize>,
}

/// GET /api/market
async fn get_market(State(state): State<AppState>) -> Json<ApiResponse<MarketSnapshot>> {
    Json(ApiResponse {
        data: state.market.snapshot(),
    })
}

/// GET /api/market/history/:stock_id
async fn get_history(
    State(state): State<AppState>,
    Path(stock_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<HistoryPoint>>>, AppError> {
    let points = state.market.with_state(|market| {
        let limit = query
            .limit
            .unwrap_or(market.config().snapshot_history)
            .min(market.config().history_capacity);
        market.history(&stock_id, limit)
    });

    let data = points.ok_or_else(|| AppError::NotFound(format!("instrument {}", stock_id)))?;
    Ok(Json(ApiResponse { data }))
}
