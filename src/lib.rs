//! Tycoon - stock-trading simulation game server
//!
//! A simulated market ticks once a second, occasionally shocked by generated
//! news. Players trade against live prices; every balance change is settled
//! atomically in SQLite and ranked on a shared leaderboard.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod types;
pub mod websocket;

use axum::{routing::get, Router};
use config::Config;
use services::{
    HeadlineSource, LimitOrderWatcher, MarketService, NewsGenerator, SqliteStore, TradingService,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use websocket::RoomManager;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub market: Arc<MarketService>,
    pub trading: TradingService,
    pub watcher: Arc<LimitOrderWatcher>,
    pub room_manager: Arc<RoomManager>,
}

impl AppState {
    /// Wire every service around one store and one headline source.
    ///
    /// Background loops are not started; see [`MarketService::run`] and
    /// [`LimitOrderWatcher::run`].
    pub fn new(
        config: Config,
        store: Arc<SqliteStore>,
        headlines: Arc<dyn HeadlineSource>,
    ) -> Self {
        let room_manager = RoomManager::new();

        let market = Arc::new(
            MarketService::new(
                config.market.clone(),
                types::default_instruments(),
                store.clone(),
                NewsGenerator::new(headlines),
            )
            .with_room_manager(room_manager.clone()),
        );

        let trading = TradingService::new(store.clone(), market.state())
            .with_reward_cooldown(config.reward_cooldown())
            .with_room_manager(room_manager.clone());

        let watcher = Arc::new(
            LimitOrderWatcher::new(trading.clone(), config.order_retry_cooldown())
                .with_room_manager(room_manager.clone()),
        );

        Self {
            config: Arc::new(config),
            store,
            market,
            trading,
            watcher,
            room_manager,
        }
    }
}

/// Build the HTTP + WebSocket application.
pub fn app(state: AppState) -> Router {
    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::router())
        .route("/ws", get(websocket::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
