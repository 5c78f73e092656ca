use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tycoon::config::Config;
use tycoon::services::{GeminiClient, SqliteStore};
use tycoon::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tycoon=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    info!("Starting Tycoon server on {}:{}", config.host, config.port);

    // Open the store
    let store = Arc::new(SqliteStore::new(&config.database_path)?);
    info!(
        "SQLite store at {} ({} accounts)",
        config.database_path,
        store.account_count()?
    );
    if let Some(previous) = store.previous_game_time() {
        info!(
            "Previous session stopped at tick {}; market restarts from defaults",
            previous
        );
    }

    // Headline generation
    let gemini = Arc::new(GeminiClient::new(&config.generation));
    if !gemini.has_credentials() {
        warn!("GEMINI_API_KEY not set, news will use backup headlines");
    }

    let state = AppState::new(config, store, gemini);

    // Start the market loop and the limit-order watcher
    let snapshots = state.market.subscribe();
    tokio::spawn(state.watcher.clone().run(snapshots));
    tokio::spawn(state.market.clone().run());

    // Start the server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let app = tycoon::app(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Tycoon server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
