//! Market loop.
//!
//! Drives the simulation once per tick: random-walk prices, occasionally
//! publish news, broadcast the snapshot and mirror it to the store. Nothing
//! that happens inside a tick stops the loop.

use crate::config::MarketConfig;
use crate::error::AppError;
use crate::services::news::{fallback_draft, NewsGenerator};
use crate::services::simulator::MarketState;
use crate::services::SqliteStore;
use crate::types::{Instrument, MarketSnapshot, NewsDraft, NewsItem, ServerMessage};
use crate::websocket::RoomManager;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// What one tick did.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub game_time: u64,
    pub news: Option<NewsItem>,
    /// Whether the snapshot reached the store.
    pub persisted: bool,
}

/// Owner of the shared market state and its tick loop.
pub struct MarketService {
    state: Arc<RwLock<MarketState>>,
    news: NewsGenerator,
    store: Arc<SqliteStore>,
    rng: Mutex<StdRng>,
    tick_interval: Duration,
    snapshot_tx: broadcast::Sender<MarketSnapshot>,
    room_manager: Option<Arc<RoomManager>>,
    news_in_flight: AtomicBool,
}

impl MarketService {
    pub fn new(
        config: MarketConfig,
        instruments: Vec<Instrument>,
        store: Arc<SqliteStore>,
        news: NewsGenerator,
    ) -> Self {
        let (snapshot_tx, _) = broadcast::channel(64);
        Self {
            tick_interval: config.tick_interval(),
            state: Arc::new(RwLock::new(MarketState::new(config, instruments))),
            news,
            store,
            rng: Mutex::new(StdRng::from_entropy()),
            snapshot_tx,
            room_manager: None,
            news_in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Set room manager for WebSocket broadcasts.
    pub fn with_room_manager(mut self, room_manager: Arc<RoomManager>) -> Self {
        self.room_manager = Some(room_manager);
        self
    }

    /// Shared handle to the market state (read by settlement).
    pub fn state(&self) -> Arc<RwLock<MarketState>> {
        self.state.clone()
    }

    /// Subscribe to per-tick snapshots.
    pub fn subscribe(&self) -> broadcast::Receiver<MarketSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        self.read().snapshot()
    }

    /// Run `f` against the current state.
    pub fn with_state<T>(&self, f: impl FnOnce(&MarketState) -> T) -> T {
        f(&self.read())
    }

    fn read(&self) -> RwLockReadGuard<'_, MarketState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MarketState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance the market by one tick, waiting for any news it produces.
    pub async fn tick(&self) -> TickReport {
        let news = match self.step() {
            Some((target, fallback)) => self.publish_news(&target, fallback).await,
            None => None,
        };
        let (game_time, persisted) = self.publish();

        TickReport {
            game_time,
            news,
            persisted,
        }
    }

    /// Walk prices and decide whether this tick carries news.
    fn step(&self) -> Option<(Instrument, NewsDraft)> {
        let mut state = self.write();
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);

        state.step_prices(&mut *rng);

        if !state.news_due(&mut *rng) {
            return None;
        }
        let target = state.pick_target(&mut *rng)?;
        let fallback = fallback_draft(&target, &mut *rng);
        Some((target, fallback))
    }

    /// Compose a headline for `target` and apply its shock.
    ///
    /// No lock is held while the headline source is awaited.
    async fn publish_news(&self, target: &Instrument, fallback: NewsDraft) -> Option<NewsItem> {
        let draft = self.news.compose(target, fallback).await;
        let item = self.write().apply_news(&target.id, &draft)?;

        info!("News on {}: {} ({})", item.stock_id, item.text, item.sentiment);
        self.broadcast(&ServerMessage::News { data: item.clone() });
        Some(item)
    }

    /// Fan out the current snapshot and mirror it to the store.
    fn publish(&self) -> (u64, bool) {
        let snapshot = self.snapshot();
        let game_time = snapshot.game_time;

        // No receivers is fine.
        let _ = self.snapshot_tx.send(snapshot.clone());
        self.broadcast(&ServerMessage::Market {
            data: snapshot.clone(),
        });

        let persisted = match self.mirror(&snapshot) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to mirror market state on tick {}: {}", game_time, e);
                false
            }
        };
        (game_time, persisted)
    }

    fn mirror(&self, snapshot: &MarketSnapshot) -> Result<(), AppError> {
        self.store.save_market_snapshot(snapshot)
    }

    fn broadcast(&self, msg: &ServerMessage) {
        if let Some(ref room_manager) = self.room_manager {
            if room_manager.client_count() == 0 {
                return;
            }
            if let Ok(json) = serde_json::to_string(msg) {
                room_manager.broadcast_all(&json);
            }
        }
    }

    /// Tick forever on the configured interval.
    ///
    /// Headline generation runs on its own task so a slow source never
    /// delays the next tick. At most one headline is in flight; news due
    /// while one is pending is skipped.
    pub async fn run(self: Arc<Self>) {
        info!("Market loop started, tick interval {:?}", self.tick_interval);

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Some((target, fallback)) = self.step() {
                if self.news_in_flight.swap(true, Ordering::AcqRel) {
                    debug!("Headline still pending, skipping news for {}", target.id);
                } else {
                    let market = self.clone();
                    tokio::spawn(async move {
                        market.publish_news(&target, fallback).await;
                        market.news_in_flight.store(false, Ordering::Release);
                    });
                }
            }

            let (game_time, _) = self.publish();
            debug!("Tick {} complete", game_time);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::generation::HeadlineSource;
    use crate::types::default_instruments;
    use std::future::Future;
    use std::pin::Pin;

    struct Offline;

    impl HeadlineSource for Offline {
        fn generate<'a>(
            &'a self,
            _prompt: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>> {
            Box::pin(async { Err(AppError::ExternalService("offline".to_string())) })
        }
    }

    fn service(config: MarketConfig) -> MarketService {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        MarketService::new(
            config,
            default_instruments(),
            store,
            NewsGenerator::new(Arc::new(Offline)),
        )
        .with_seed(99)
    }

    #[tokio::test]
    async fn test_tick_advances_and_mirrors() {
        let market = service(MarketConfig::default());
        let mut rx = market.subscribe();

        let report = market.tick().await;
        assert_eq!(report.game_time, 1);
        assert!(report.persisted);

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.game_time, 1);

        let stored = market.store.load_market_snapshot().unwrap().unwrap();
        assert_eq!(stored.game_time, 1);
    }

    #[tokio::test]
    async fn test_offline_news_still_publishes() {
        let config = MarketConfig {
            news_interval_ticks: 1,
            news_probability: 1.0,
            ..MarketConfig::default()
        };
        let market = service(config);

        for expected in 1..=5 {
            let report = market.tick().await;
            let item = report.news.expect("news every tick");
            assert!(item.text.starts_with("[Breaking] "));
            assert_eq!(market.snapshot().news_logs.len(), expected);
        }
    }

    #[tokio::test]
    async fn test_no_news_with_zero_probability() {
        let config = MarketConfig {
            news_interval_ticks: 1,
            news_probability: 0.0,
            ..MarketConfig::default()
        };
        let market = service(config);

        for _ in 0..10 {
            assert!(market.tick().await.news.is_none());
        }
        assert!(market.snapshot().latest_news.is_none());
    }
}
