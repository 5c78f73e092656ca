//! Limit-Order Watcher
//!
//! Evaluates standing limit orders against every market snapshot and settles
//! the ones whose target has been crossed. An in-flight tracker keeps an order
//! from being submitted twice and delays retries after a failure.

use crate::error::AppError;
use crate::services::sqlite_store::{OrderFill, SqliteStore};
use crate::services::TradingService;
use crate::types::{MarketSnapshot, PendingOrder, ServerMessage, TradeReceipt};
use crate::websocket::RoomManager;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy)]
enum ClaimState {
    Settling,
    CoolingDown(Instant),
}

/// Order ids currently being settled or waiting out a retry cooldown.
pub struct InFlightTracker {
    entries: DashMap<String, ClaimState>,
    cooldown: Duration,
}

impl InFlightTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            cooldown,
        }
    }

    /// Claim an order for settlement. Fails while it is settling or cooling down.
    pub fn try_claim(&self, order_id: &str) -> bool {
        match self.entries.entry(order_id.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(ClaimState::Settling);
                true
            }
            Entry::Occupied(mut occupied) => {
                let available = match occupied.get() {
                    ClaimState::Settling => false,
                    ClaimState::CoolingDown(until) => Instant::now() >= *until,
                };
                if available {
                    occupied.insert(ClaimState::Settling);
                }
                available
            }
        }
    }

    /// Release a claim after the order was settled and removed.
    pub fn complete(&self, order_id: &str) {
        self.entries.remove(order_id);
    }

    /// Start the retry cooldown for an order whose settlement failed.
    pub fn fail(&self, order_id: &str) {
        self.entries.insert(
            order_id.to_string(),
            ClaimState::CoolingDown(Instant::now() + self.cooldown),
        );
    }

    pub fn is_settling(&self, order_id: &str) -> bool {
        matches!(
            self.entries.get(order_id).map(|e| *e.value()),
            Some(ClaimState::Settling)
        )
    }

    pub fn is_cooling_down(&self, order_id: &str) -> bool {
        matches!(
            self.entries.get(order_id).map(|e| *e.value()),
            Some(ClaimState::CoolingDown(until)) if Instant::now() < until
        )
    }

    /// Forget cooldowns of orders that no longer exist.
    pub fn retain_orders(&self, live: &HashSet<&str>) {
        self.entries.retain(|id, state| {
            matches!(state, ClaimState::Settling) || live.contains(id.as_str())
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of one evaluation pass.
#[derive(Debug, Default)]
pub struct WatchReport {
    /// Orders whose target was crossed.
    pub triggered: usize,
    /// Crossed orders skipped because they were in flight or cooling down.
    pub skipped: usize,
    pub filled: Vec<(String, TradeReceipt)>,
    /// Claimed but not traded: the live price moved back or the order was
    /// cancelled. No cooldown applies.
    pub declined: usize,
    pub failed: Vec<(String, String)>,
}

/// Settles limit orders when the live price crosses their target.
pub struct LimitOrderWatcher {
    store: Arc<SqliteStore>,
    trading: TradingService,
    tracker: InFlightTracker,
    /// Room manager for WebSocket broadcasts (optional for testing)
    room_manager: Option<Arc<RoomManager>>,
}

impl LimitOrderWatcher {
    pub fn new(trading: TradingService, retry_cooldown: Duration) -> Self {
        Self {
            store: trading.store().clone(),
            trading,
            tracker: InFlightTracker::new(retry_cooldown),
            room_manager: None,
        }
    }

    /// Set room manager for WebSocket broadcasts.
    pub fn with_room_manager(mut self, room_manager: Arc<RoomManager>) -> Self {
        self.room_manager = Some(room_manager);
        self
    }

    pub fn tracker(&self) -> &InFlightTracker {
        &self.tracker
    }

    /// Check every standing order against `prices` and settle crossed ones.
    pub fn evaluate(&self, prices: &HashMap<String, f64>) -> Result<WatchReport, AppError> {
        let orders = self.store.all_orders()?;
        let live: HashSet<&str> = orders.iter().map(|o| o.id.as_str()).collect();
        self.tracker.retain_orders(&live);

        let mut report = WatchReport::default();

        for order in &orders {
            let Some(&price) = prices.get(&order.stock_id) else {
                continue;
            };
            if !order.is_crossed(price) {
                continue;
            }

            report.triggered += 1;
            if !self.tracker.try_claim(&order.id) {
                report.skipped += 1;
                continue;
            }

            match self.execute(order) {
                Ok(Some(receipt)) => report.filled.push((order.id.clone(), receipt)),
                Ok(None) => report.declined += 1,
                Err(e) => report.failed.push((order.id.clone(), e.to_string())),
            }
        }

        if report.triggered > 0 {
            debug!(
                "Limit orders: {} triggered, {} filled, {} declined, {} failed, {} skipped",
                report.triggered,
                report.filled.len(),
                report.declined,
                report.failed.len(),
                report.skipped
            );
        }

        Ok(report)
    }

    /// Settle one claimed order. The claim must be held by the caller.
    fn execute(&self, order: &PendingOrder) -> Result<Option<TradeReceipt>, AppError> {
        let receipt = match self.trading.settle_limit(order) {
            Ok(OrderFill::Filled(receipt, _)) => receipt,
            Ok(OrderFill::Declined) => {
                debug!("Limit order {} no longer crossed, left pending", order.id);
                self.tracker.complete(&order.id);
                return Ok(None);
            }
            Ok(OrderFill::Missing) => {
                debug!("Limit order {} was cancelled before it filled", order.id);
                self.tracker.complete(&order.id);
                return Ok(None);
            }
            Err(e) => {
                warn!("Limit order {} failed to settle: {}", order.id, e);
                self.tracker.fail(&order.id);
                return Err(e);
            }
        };

        self.tracker.complete(&order.id);

        if let Some(ref room_manager) = self.room_manager {
            let msg = ServerMessage::OrderFilled {
                order_id: order.id.clone(),
                data: receipt.clone(),
            };
            if let Ok(json) = serde_json::to_string(&msg) {
                room_manager.broadcast(&order.uid, &json);
            }
        }

        Ok(Some(receipt))
    }

    /// Evaluate orders on every snapshot until the feed closes.
    ///
    /// Each pass runs on the blocking pool, so passes may overlap; the
    /// in-flight tracker keeps them from settling the same order twice.
    pub async fn run(self: Arc<Self>, mut snapshots: broadcast::Receiver<MarketSnapshot>) {
        info!("Limit-order watcher started");

        loop {
            match snapshots.recv().await {
                Ok(snapshot) => {
                    let watcher = self.clone();
                    let prices = snapshot.prices();
                    tokio::task::spawn_blocking(move || {
                        if let Err(e) = watcher.evaluate(&prices) {
                            error!("Limit-order evaluation failed: {}", e);
                        }
                    });
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Limit-order watcher skipped {} snapshots", missed);
                }
                Err(RecvError::Closed) => {
                    info!("Market feed closed, limit-order watcher stopping");
                    break;
                }
            }
        }
    }
}
