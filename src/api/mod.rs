pub mod accounts;
pub mod health;
pub mod leaderboard;
pub mod market;
pub mod orders;
pub mod trade;

use crate::AppState;
use axum::Router;
use serde::Serialize;

/// Success envelope for every endpoint except the trade endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Create the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/api/trade", trade::router())
        .nest("/api/market", market::router())
        .nest("/api/accounts", accounts::router())
        .nest("/api/orders", orders::router())
        .nest("/api/leaderboard", leaderboard::router())
}
