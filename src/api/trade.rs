//! Trade API
//!
//! - POST /api/trade - Settle a market buy or sell at the live price
//!
//! Success is `{ "success": true, "msg": ... }`. Rejections use the same
//! shape with `success: false` and a 400/404/500 status.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};

use crate::error::AppError;
use crate::types::{TradeRequest, TradeResponse};
use crate::AppState;

/// Create trade router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(trade))
}

/// POST /api/trade
async fn trade(
    State(state): State<AppState>,
    payload: Result<Json<TradeRequest>, JsonRejection>,
) -> Result<Json<TradeResponse>, AppError> {
    let Json(request) = payload?;
    let receipt = state.trading.settle(&request)?;

    Ok(Json(TradeResponse::ok(format!(
        "Trade complete: {} {} x{} @ {:.0}",
        receipt.side, receipt.stock_id, receipt.amount, receipt.price
    ))))
}
