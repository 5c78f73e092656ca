//! Order Types
//!
//! Trade requests, standing limit orders and the trade endpoint's response.

use serde::{Deserialize, Serialize};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

impl std::str::FromStr for OrderSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy" => Ok(OrderSide::Buy),
            "sell" => Ok(OrderSide::Sell),
            other => Err(format!("unknown order side: {}", other)),
        }
    }
}

/// Body of `POST /api/trade`.
///
/// `amount` is signed so that non-positive amounts reach validation instead
/// of failing deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub uid: String,
    pub stock_id: String,
    #[serde(rename = "type")]
    pub side: OrderSide,
    pub amount: i64,
}

/// Outcome reported by the trade endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResponse {
    pub success: bool,
    pub msg: String,
}

impl TradeResponse {
    pub fn ok(msg: impl Into<String>) -> Self {
        Self {
            success: true,
            msg: msg.into(),
        }
    }
}

/// Details of a settled trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeReceipt {
    pub uid: String,
    pub stock_id: String,
    #[serde(rename = "type")]
    pub side: OrderSide,
    pub amount: u64,
    pub price: f64,
    pub cash: f64,
    pub total_asset: f64,
    /// Units held after the trade.
    pub held: u64,
    pub avg_price: f64,
    /// Profit or loss against average cost, sells only.
    pub realized_pnl: Option<f64>,
}

/// A standing instruction to trade once the price crosses `target_price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOrder {
    pub id: String,
    pub uid: String,
    pub stock_id: String,
    #[serde(rename = "type")]
    pub side: OrderSide,
    pub target_price: f64,
    pub amount: u64,
    pub created_at: i64,
}

impl PendingOrder {
    pub fn new(uid: &str, stock_id: &str, side: OrderSide, target_price: f64, amount: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            uid: uid.to_string(),
            stock_id: stock_id.to_string(),
            side,
            target_price,
            amount,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Buy orders trigger at or below target, sells at or above.
    pub fn is_crossed(&self, live_price: f64) -> bool {
        match self.side {
            OrderSide::Buy => live_price <= self.target_price,
            OrderSide::Sell => live_price >= self.target_price,
        }
    }

    pub fn to_trade_request(&self) -> TradeRequest {
        TradeRequest {
            uid: self.uid.clone(),
            stock_id: self.stock_id.clone(),
            side: self.side,
            amount: self.amount as i64,
        }
    }
}

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub uid: String,
    pub stock_id: String,
    #[serde(rename = "type")]
    pub side: OrderSide,
    pub target_price: f64,
    pub amount: i64,
}
