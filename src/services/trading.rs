//! Trading Service
//!
//! Settles market buys and sells against a user's account:
//! - Validates the request and resolves the live price
//! - Applies the trade inside a store transaction (account + leaderboard)
//! - Recomputes weighted average cost and total asset value
//!
//! Reward grants go through the same transactional path so that no balance
//! mutation can overwrite another.

use crate::error::AppError;
use crate::services::simulator::MarketState;
use crate::services::sqlite_store::{OrderFill, SqliteStore};
use crate::types::{
    Holding, OrderSide, PendingOrder, PlaceOrderRequest, RewardGrant, ServerMessage, TradeReceipt,
    TradeRequest, UserAccount,
};
use crate::websocket::RoomManager;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{debug, info};

/// Reward bonus range, in whole currency units.
pub const REWARD_RANGE: Range<u64> = 100_000..3_000_000;

/// Apply one buy or sell to an account at `price`.
///
/// On error the account is left untouched. `prices` are used to revalue the
/// whole portfolio afterwards.
pub fn apply_trade(
    account: &mut UserAccount,
    stock_id: &str,
    side: OrderSide,
    amount: u64,
    price: f64,
    prices: &HashMap<String, f64>,
) -> Result<TradeReceipt, AppError> {
    if amount == 0 {
        return Err(AppError::Validation("amount must be positive".to_string()));
    }

    let mut holding = account
        .holding(stock_id)
        .cloned()
        .unwrap_or_else(|| Holding::empty(stock_id));
    let value = price * amount as f64;
    let mut realized_pnl = None;

    match side {
        OrderSide::Buy => {
            if account.cash < value {
                return Err(AppError::insufficient_funds(value, account.cash));
            }
            account.cash -= value;
            let new_held = holding.held + amount;
            holding.avg_price = (holding.cost_basis() + value) / new_held as f64;
            holding.held = new_held;
        }
        OrderSide::Sell => {
            if holding.held < amount {
                return Err(AppError::insufficient_holdings(amount, holding.held));
            }
            account.cash += value;
            realized_pnl = Some((price - holding.avg_price) * amount as f64);
            holding.held -= amount;
            if holding.held == 0 {
                holding.avg_price = 0.0;
            }
        }
    }

    match account.portfolio.iter().position(|h| h.stock_id == stock_id) {
        Some(idx) if holding.held == 0 => {
            account.portfolio.remove(idx);
        }
        Some(idx) => account.portfolio[idx] = holding.clone(),
        None if holding.held > 0 => account.portfolio.push(holding.clone()),
        None => {}
    }

    account.total_asset = account.valuation(prices);

    Ok(TradeReceipt {
        uid: account.uid.clone(),
        stock_id: stock_id.to_string(),
        side,
        amount,
        price,
        cash: account.cash,
        total_asset: account.total_asset,
        held: holding.held,
        avg_price: holding.avg_price,
        realized_pnl,
    })
}

/// Check request shape before touching the store.
pub fn validate_request(request: &TradeRequest) -> Result<u64, AppError> {
    if request.uid.trim().is_empty() {
        return Err(AppError::Validation("uid is required".to_string()));
    }
    if request.stock_id.trim().is_empty() {
        return Err(AppError::Validation("stockId is required".to_string()));
    }
    if request.amount <= 0 {
        return Err(AppError::Validation(format!(
            "amount must be positive, got {}",
            request.amount
        )));
    }
    Ok(request.amount as u64)
}

/// Trade settlement and account service.
#[derive(Clone)]
pub struct TradingService {
    /// SQLite store for persistence
    store: Arc<SqliteStore>,
    /// Live market, read for prices during settlement
    market: Arc<RwLock<MarketState>>,
    /// Minimum time between reward grants
    reward_cooldown: Duration,
    rng: Arc<Mutex<StdRng>>,
    /// Room manager for WebSocket broadcasts (optional for testing)
    room_manager: Option<Arc<RoomManager>>,
}

impl TradingService {
    /// Create a new trading service.
    pub fn new(store: Arc<SqliteStore>, market: Arc<RwLock<MarketState>>) -> Self {
        Self {
            store,
            market,
            reward_cooldown: Duration::from_secs(60),
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
            room_manager: None,
        }
    }

    pub fn with_reward_cooldown(mut self, cooldown: Duration) -> Self {
        self.reward_cooldown = cooldown;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Arc::new(Mutex::new(StdRng::seed_from_u64(seed)));
        self
    }

    /// Set room manager for WebSocket broadcasts.
    pub fn with_room_manager(mut self, room_manager: Arc<RoomManager>) -> Self {
        self.room_manager = Some(room_manager);
        self
    }

    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    fn live_prices(&self) -> Result<HashMap<String, f64>, AppError> {
        self.market
            .read()
            .map(|m| m.prices())
            .map_err(|_| AppError::Persistence("market state lock poisoned".to_string()))
    }

    fn broadcast_account(&self, account: &UserAccount) {
        if let Some(ref room_manager) = self.room_manager {
            let msg = ServerMessage::AccountUpdate {
                data: account.clone(),
            };
            if let Ok(json) = serde_json::to_string(&msg) {
                room_manager.broadcast(&account.uid, &json);
            }
        }
    }

    // ==========================================================================
    // Accounts
    // ==========================================================================

    /// Create an account with starting cash, or return the existing one.
    pub fn open_account(&self, uid: &str, user_id: Option<&str>) -> Result<UserAccount, AppError> {
        if uid.trim().is_empty() {
            return Err(AppError::Validation("uid is required".to_string()));
        }
        let display = user_id
            .filter(|u| !u.trim().is_empty())
            .unwrap_or("User");
        self.store.create_account(&UserAccount::new(uid, display))
    }

    /// Account with `totalAsset` revalued at live prices (not persisted).
    pub fn get_account(&self, uid: &str) -> Result<UserAccount, AppError> {
        let mut account = self
            .store
            .get_account(uid)?
            .ok_or_else(|| AppError::NotFound(format!("account {}", uid)))?;
        account.total_asset = account.valuation(&self.live_prices()?);
        Ok(account)
    }

    // ==========================================================================
    // Settlement
    // ==========================================================================

    /// Execute a market trade at the current price.
    pub fn settle(&self, request: &TradeRequest) -> Result<TradeReceipt, AppError> {
        let amount = validate_request(request)?;

        if self.live_prices()?.get(&request.stock_id).is_none() {
            return Err(AppError::NotFound(format!("instrument {}", request.stock_id)));
        }

        let (receipt, account) = self.store.update_account(&request.uid, |account| {
            // Prices are read inside the transaction so the trade and the
            // revaluation see the same tick.
            let prices = self.live_prices()?;
            let price = *prices
                .get(&request.stock_id)
                .ok_or_else(|| AppError::NotFound(format!("instrument {}", request.stock_id)))?;
            apply_trade(account, &request.stock_id, request.side, amount, price, &prices)
        })?;

        info!(
            "Settled {} {} x{} @ {:.2} for {} (cash {:.0}, total {:.0}, {:+.2}%)",
            receipt.side,
            receipt.stock_id,
            receipt.amount,
            receipt.price,
            receipt.uid,
            receipt.cash,
            receipt.total_asset,
            account.return_pct()
        );

        self.broadcast_account(&account);
        Ok(receipt)
    }

    // ==========================================================================
    // Limit Orders
    // ==========================================================================

    /// Record a standing order. Funds and holdings are checked at fill time.
    pub fn place_order(&self, request: &PlaceOrderRequest) -> Result<PendingOrder, AppError> {
        let amount = validate_request(&TradeRequest {
            uid: request.uid.clone(),
            stock_id: request.stock_id.clone(),
            side: request.side,
            amount: request.amount,
        })?;
        if !request.target_price.is_finite() || request.target_price <= 0.0 {
            return Err(AppError::Validation(format!(
                "targetPrice must be positive, got {}",
                request.target_price
            )));
        }
        if self.live_prices()?.get(&request.stock_id).is_none() {
            return Err(AppError::NotFound(format!("instrument {}", request.stock_id)));
        }
        if self.store.get_account(&request.uid)?.is_none() {
            return Err(AppError::NotFound(format!("account {}", request.uid)));
        }

        let order = PendingOrder::new(
            &request.uid,
            &request.stock_id,
            request.side,
            request.target_price,
            amount,
        );
        self.store.insert_order(&order)?;

        info!(
            "Limit {} {} x{} @ {:.2} placed for {}",
            order.side, order.stock_id, order.amount, order.target_price, order.uid
        );
        Ok(order)
    }

    pub fn list_orders(&self, uid: &str) -> Result<Vec<PendingOrder>, AppError> {
        self.store.orders_for_user(uid)
    }

    /// Cancel one of `uid`'s standing orders.
    pub fn cancel_order(&self, uid: &str, order_id: &str) -> Result<(), AppError> {
        let order = self
            .store
            .get_order(order_id)?
            .filter(|o| o.uid == uid)
            .ok_or_else(|| AppError::NotFound(format!("order {}", order_id)))?;

        // A concurrent fill may already have removed it.
        if !self.store.delete_order(&order.id)? {
            return Err(AppError::NotFound(format!("order {}", order_id)));
        }

        debug!("Cancelled order {} for {}", order.id, uid);
        Ok(())
    }

    /// Fill a standing limit order at the live price.
    ///
    /// The crossing rule is re-checked against the price read inside the
    /// transaction; if it no longer holds the order stays pending and
    /// [`OrderFill::Declined`] is returned. A cancelled order yields
    /// [`OrderFill::Missing`] and moves no money.
    pub fn settle_limit(&self, order: &PendingOrder) -> Result<OrderFill<TradeReceipt>, AppError> {
        let outcome = self.store.fill_order(order, |account| {
            let prices = self.live_prices()?;
            let price = *prices
                .get(&order.stock_id)
                .ok_or_else(|| AppError::NotFound(format!("instrument {}", order.stock_id)))?;
            if !order.is_crossed(price) {
                return Ok(None);
            }
            apply_trade(account, &order.stock_id, order.side, order.amount, price, &prices).map(Some)
        })?;

        if let OrderFill::Filled(ref receipt, ref account) = outcome {
            info!(
                "Limit {} {} x{} filled @ {:.2} (target {:.2}) for {}",
                receipt.side, receipt.stock_id, receipt.amount, receipt.price, order.target_price, receipt.uid
            );
            self.broadcast_account(account);
        }

        Ok(outcome)
    }

    // ==========================================================================
    // Rewards
    // ==========================================================================

    /// Grant a random cash bonus if the account's cooldown has elapsed.
    pub fn grant_reward(&self, uid: &str) -> Result<RewardGrant, AppError> {
        let amount = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|_| AppError::Persistence("rng lock poisoned".to_string()))?;
            rng.gen_range(REWARD_RANGE) as f64
        };
        let cooldown_ms = self.reward_cooldown.as_millis() as i64;
        let now = chrono::Utc::now().timestamp_millis();

        let (grant, account) = self.store.update_account(uid, |account| {
            if let Some(last) = account.last_reward_at {
                let ready_at = last + cooldown_ms;
                if now < ready_at {
                    return Err(AppError::BusinessRule(format!(
                        "Reward on cooldown for another {}s",
                        (ready_at - now + 999) / 1000
                    )));
                }
            }

            let prices = self.live_prices()?;
            account.cash += amount;
            account.last_reward_at = Some(now);
            account.total_asset = account.valuation(&prices);

            Ok(RewardGrant {
                amount,
                cash: account.cash,
                total_asset: account.total_asset,
                next_available_at: now + cooldown_ms,
            })
        })?;

        debug!("Granted reward {:.0} to {}", grant.amount, uid);
        self.broadcast_account(&account);
        Ok(grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MarketConfig;
    use crate::types::{default_instruments, Instrument, INITIAL_CASH};

    fn prices(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn create_test_service(instruments: Vec<Instrument>) -> TradingService {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let market = Arc::new(RwLock::new(MarketState::new(MarketConfig::default(), instruments)));
        TradingService::new(store, market).with_seed(7)
    }

    fn request(uid: &str, stock_id: &str, side: OrderSide, amount: i64) -> TradeRequest {
        TradeRequest {
            uid: uid.to_string(),
            stock_id: stock_id.to_string(),
            side,
            amount,
        }
    }

    #[test]
    fn test_buy_then_sell_example() {
        let mut account = UserAccount::new("u1", "alice");

        let receipt = apply_trade(
            &mut account,
            "SAMS",
            OrderSide::Buy,
            10,
            72_000.0,
            &prices(&[("SAMS", 72_000.0)]),
        )
        .unwrap();
        assert_eq!(account.cash, 9_280_000.0);
        assert_eq!(receipt.held, 10);
        assert_eq!(receipt.avg_price, 72_000.0);
        assert_eq!(account.total_asset, 10_000_000.0);

        let receipt = apply_trade(
            &mut account,
            "SAMS",
            OrderSide::Sell,
            10,
            80_000.0,
            &prices(&[("SAMS", 80_000.0)]),
        )
        .unwrap();
        assert_eq!(account.cash, 10_080_000.0);
        assert_eq!(receipt.held, 0);
        assert_eq!(receipt.avg_price, 0.0);
        assert_eq!(receipt.realized_pnl, Some(80_000.0));
        assert!(account.holding("SAMS").is_none());
        assert_eq!(account.total_asset, 10_080_000.0);
    }

    #[test]
    fn test_average_cost_is_weighted() {
        let mut account = UserAccount::new("u1", "alice");
        let p = prices(&[("KAKO", 0.0)]);

        apply_trade(&mut account, "KAKO", OrderSide::Buy, 10, 100.0, &p).unwrap();
        apply_trade(&mut account, "KAKO", OrderSide::Buy, 30, 200.0, &p).unwrap();

        let holding = account.holding("KAKO").unwrap();
        assert_eq!(holding.held, 40);
        assert_eq!(holding.avg_price, (10.0 * 100.0 + 30.0 * 200.0) / 40.0);
    }

    #[test]
    fn test_partial_sell_keeps_average() {
        let mut account = UserAccount::new("u1", "alice");
        let p = prices(&[("HYUN", 0.0)]);

        apply_trade(&mut account, "HYUN", OrderSide::Buy, 10, 100.0, &p).unwrap();
        apply_trade(&mut account, "HYUN", OrderSide::Buy, 10, 300.0, &p).unwrap();
        apply_trade(&mut account, "HYUN", OrderSide::Sell, 15, 50.0, &p).unwrap();

        let holding = account.holding("HYUN").unwrap();
        assert_eq!(holding.held, 5);
        assert_eq!(holding.avg_price, 200.0);
    }

    #[test]
    fn test_insufficient_funds_leaves_account() {
        let mut account = UserAccount::new("u1", "alice");
        let before = account.clone();

        let result = apply_trade(
            &mut account,
            "BTC",
            OrderSide::Buy,
            1,
            INITIAL_CASH + 1.0,
            &prices(&[("BTC", INITIAL_CASH + 1.0)]),
        );
        assert!(matches!(result, Err(AppError::BusinessRule(_))));
        assert_eq!(account, before);
    }

    #[test]
    fn test_buy_exactly_all_cash() {
        let mut account = UserAccount::new("u1", "alice");
        apply_trade(
            &mut account,
            "ECOP",
            OrderSide::Buy,
            10,
            1_000_000.0,
            &prices(&[("ECOP", 1_000_000.0)]),
        )
        .unwrap();
        assert_eq!(account.cash, 0.0);
    }

    #[test]
    fn test_insufficient_holdings() {
        let mut account = UserAccount::new("u1", "alice");
        let p = prices(&[("SAMS", 10.0)]);
        apply_trade(&mut account, "SAMS", OrderSide::Buy, 2, 10.0, &p).unwrap();
        let before = account.clone();

        let result = apply_trade(&mut account, "SAMS", OrderSide::Sell, 3, 10.0, &p);
        assert!(matches!(result, Err(AppError::BusinessRule(_))));
        assert_eq!(account, before);

        let result = apply_trade(&mut account, "KAKO", OrderSide::Sell, 1, 10.0, &p);
        assert!(matches!(result, Err(AppError::BusinessRule(_))));
    }

    #[test]
    fn test_total_asset_uses_live_prices() {
        let mut account = UserAccount::new("u1", "alice");
        let p = prices(&[("SAMS", 100.0), ("KAKO", 50.0)]);
        apply_trade(&mut account, "SAMS", OrderSide::Buy, 10, 100.0, &p).unwrap();
        apply_trade(&mut account, "KAKO", OrderSide::Buy, 4, 50.0, &p).unwrap();

        let moved = prices(&[("SAMS", 120.0), ("KAKO", 40.0)]);
        apply_trade(&mut account, "KAKO", OrderSide::Sell, 1, 40.0, &moved).unwrap();

        let expected = account.cash + 10.0 * 120.0 + 3.0 * 40.0;
        assert_eq!(account.total_asset, expected);
    }

    #[test]
    fn test_validate_request() {
        assert!(validate_request(&request("u1", "SAMS", OrderSide::Buy, 1)).is_ok());
        assert!(matches!(
            validate_request(&request("u1", "SAMS", OrderSide::Buy, 0)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_request(&request("u1", "SAMS", OrderSide::Buy, -5)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_request(&request("", "SAMS", OrderSide::Buy, 1)),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_settle_persists_account_and_leaderboard() {
        let service = create_test_service(default_instruments());
        service.open_account("u1", Some("alice")).unwrap();

        let receipt = service
            .settle(&request("u1", "SAMS", OrderSide::Buy, 10))
            .unwrap();
        assert_eq!(receipt.price, 72_000.0);
        assert_eq!(receipt.cash, 9_280_000.0);

        let account = service.store().get_account("u1").unwrap().unwrap();
        assert_eq!(account.cash, 9_280_000.0);
        assert_eq!(account.units_held("SAMS"), 10);

        let entry = service.store().leaderboard_entry("u1").unwrap().unwrap();
        assert_eq!(entry.total_asset, account.total_asset);
        assert_eq!(entry.user_id, "alice");
    }

    #[test]
    fn test_settle_unknown_account_and_instrument() {
        let service = create_test_service(default_instruments());
        assert!(matches!(
            service.settle(&request("ghost", "SAMS", OrderSide::Buy, 1)),
            Err(AppError::NotFound(_))
        ));

        service.open_account("u1", None).unwrap();
        assert!(matches!(
            service.settle(&request("u1", "NOPE", OrderSide::Buy, 1)),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_buys_serialize() {
        let service = create_test_service(vec![Instrument::new("X", "X", 1_000_000.0, 0.01, "T")]);
        service.open_account("u1", None).unwrap();

        // Cash covers exactly 10 units; 16 racing single-unit buys.
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let service = service.clone();
                std::thread::spawn(move || service.settle(&request("u1", "X", OrderSide::Buy, 1)))
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();

        let account = service.store().get_account("u1").unwrap().unwrap();
        assert_eq!(successes, 10);
        assert_eq!(account.units_held("X"), 10);
        assert_eq!(account.cash, 0.0);
    }

    #[test]
    fn test_reward_grant_and_cooldown() {
        let service = create_test_service(default_instruments())
            .with_reward_cooldown(Duration::from_secs(3600));
        service.open_account("u1", None).unwrap();

        let grant = service.grant_reward("u1").unwrap();
        assert!(REWARD_RANGE.contains(&(grant.amount as u64)));
        assert_eq!(grant.cash, INITIAL_CASH + grant.amount);

        let second = service.grant_reward("u1");
        assert!(matches!(second, Err(AppError::BusinessRule(_))));

        let account = service.store().get_account("u1").unwrap().unwrap();
        assert_eq!(account.cash, INITIAL_CASH + grant.amount);
    }

    #[test]
    fn test_reward_without_cooldown() {
        let service = create_test_service(default_instruments()).with_reward_cooldown(Duration::ZERO);
        service.open_account("u1", None).unwrap();

        let first = service.grant_reward("u1").unwrap();
        let second = service.grant_reward("u1").unwrap();
        assert_eq!(second.cash, INITIAL_CASH + first.amount + second.amount);
    }

    #[test]
    fn test_reward_and_trade_do_not_lose_updates() {
        let service = create_test_service(vec![Instrument::new("X", "X", 100.0, 0.01, "T")])
            .with_reward_cooldown(Duration::ZERO);
        service.open_account("u1", None).unwrap();

        let trader = {
            let service = service.clone();
            std::thread::spawn(move || {
                for _ in 0..20 {
                    service.settle(&request("u1", "X", OrderSide::Buy, 1)).unwrap();
                }
            })
        };
        let mut granted = 0.0;
        for _ in 0..20 {
            granted += service.grant_reward("u1").unwrap().amount;
        }
        trader.join().unwrap();

        let account = service.store().get_account("u1").unwrap().unwrap();
        assert_eq!(account.units_held("X"), 20);
        assert_eq!(account.cash, INITIAL_CASH + granted - 20.0 * 100.0);
    }

    #[test]
    fn test_get_account_revalues() {
        let service = create_test_service(default_instruments());
        service.open_account("u1", None).unwrap();
        service.settle(&request("u1", "SAMS", OrderSide::Buy, 1)).unwrap();

        {
            let mut market = service.market.write().unwrap();
            market.apply_news(
                "SAMS",
                &crate::types::NewsDraft {
                    headline: "x".to_string(),
                    sentiment: crate::types::Sentiment::Good,
                },
            );
        }

        let account = service.get_account("u1").unwrap();
        assert_eq!(account.total_asset, account.cash + 72_000.0 * 1.05);
    }

    fn place(uid: &str, stock_id: &str, side: OrderSide, target: f64, amount: i64) -> PlaceOrderRequest {
        PlaceOrderRequest {
            uid: uid.to_string(),
            stock_id: stock_id.to_string(),
            side,
            target_price: target,
            amount,
        }
    }

    #[test]
    fn test_place_and_cancel_order() {
        let service = create_test_service(default_instruments());
        service.open_account("u1", None).unwrap();

        let order = service
            .place_order(&place("u1", "SAMS", OrderSide::Buy, 50_000.0, 5))
            .unwrap();
        assert_eq!(order.amount, 5);
        assert_eq!(service.list_orders("u1").unwrap(), vec![order.clone()]);

        // Only the owner can cancel.
        assert!(matches!(
            service.cancel_order("u2", &order.id),
            Err(AppError::NotFound(_))
        ));
        service.cancel_order("u1", &order.id).unwrap();
        assert!(service.list_orders("u1").unwrap().is_empty());
        assert!(matches!(
            service.cancel_order("u1", &order.id),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_place_order_validation() {
        let service = create_test_service(default_instruments());
        service.open_account("u1", None).unwrap();

        assert!(matches!(
            service.place_order(&place("u1", "SAMS", OrderSide::Buy, 50_000.0, 0)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.place_order(&place("u1", "SAMS", OrderSide::Buy, -1.0, 1)),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            service.place_order(&place("u1", "NOPE", OrderSide::Buy, 1.0, 1)),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            service.place_order(&place("ghost", "SAMS", OrderSide::Sell, 1.0, 1)),
            Err(AppError::NotFound(_))
        ));
        assert!(service.list_orders("u1").unwrap().is_empty());
    }

    #[test]
    fn test_limit_fill_rechecks_live_price() {
        let service = create_test_service(vec![Instrument::new("X", "X", 52_000.0, 0.01, "T")]);
        service.open_account("u1", None).unwrap();
        let order = service
            .place_order(&place("u1", "X", OrderSide::Buy, 50_000.0, 1))
            .unwrap();

        // Live price sits above the buy target.
        let outcome = service.settle_limit(&order).unwrap();
        assert!(matches!(outcome, OrderFill::Declined));
        assert_eq!(service.list_orders("u1").unwrap().len(), 1);
        assert_eq!(service.get_account("u1").unwrap().cash, INITIAL_CASH);
    }

    #[test]
    fn test_cancelled_limit_order_moves_no_money() {
        let service = create_test_service(default_instruments());
        service.open_account("u1", None).unwrap();
        let order = service
            .place_order(&place("u1", "SAMS", OrderSide::Buy, 100_000.0, 2))
            .unwrap();

        service.cancel_order("u1", &order.id).unwrap();

        let outcome = service.settle_limit(&order).unwrap();
        assert!(matches!(outcome, OrderFill::Missing));
        let account = service.get_account("u1").unwrap();
        assert_eq!(account.cash, INITIAL_CASH);
        assert_eq!(account.units_held("SAMS"), 0);
    }

    #[test]
    fn test_filled_limit_order_cannot_be_cancelled() {
        let service = create_test_service(default_instruments());
        service.open_account("u1", None).unwrap();
        let order = service
            .place_order(&place("u1", "SAMS", OrderSide::Buy, 100_000.0, 2))
            .unwrap();

        let outcome = service.settle_limit(&order).unwrap();
        assert!(matches!(outcome, OrderFill::Filled(ref r, _) if r.price == 72_000.0));
        assert!(matches!(
            service.cancel_order("u1", &order.id),
            Err(AppError::NotFound(_))
        ));
        assert_eq!(service.get_account("u1").unwrap().units_held("SAMS"), 2);
    }
}
