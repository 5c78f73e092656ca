//! Limit Orders API
//!
//! - GET /api/orders?uid= - List a user's standing orders
//! - POST /api/orders - Place a limit order
//! - DELETE /api/orders/:id?uid= - Cancel a standing order

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::ApiResponse;
use crate::error::AppError;
use crate::types::{PendingOrder, PlaceOrderRequest};
use crate::AppState;

/// Create orders router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(place_order))
        .route("/:id", delete(cancel_order))
}

#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub uid: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledOrder {
    pub order_id: String,
}

/// GET /api/orders?uid=
async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<ApiResponse<Vec<PendingOrder>>>, AppError> {
    let orders = state.trading.list_orders(&query.uid)?;
    Ok(Json(ApiResponse { data: orders }))
}

/// POST /api/orders
async fn place_order(
    State(state): State<AppState>,
    payload: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<PendingOrder>>, AppError> {
    let Json(request) = payload?;
    let order = state.trading.place_order(&request)?;
    Ok(Json(ApiResponse { data: order }))
}

/// DELETE /api/orders/:id?uid=
async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<ApiResponse<CancelledOrder>>, AppError> {
    state.trading.cancel_order(&query.uid, &id)?;
    Ok(Json(ApiResponse {
        data: CancelledOrder { order_id: id },
    }))
}
