use super::{MarketSnapshot, NewsItem, TradeReceipt, UserAccount};
use serde::{Deserialize, Serialize};

/// Incoming WebSocket message from client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Receive balance changes for one account
    SubscribeAccount { uid: String },
    UnsubscribeAccount { uid: String },
    Ping,
}

/// Outgoing WebSocket message to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full market state, sent once per tick
    Market { data: MarketSnapshot },
    /// Freshly published news item
    News { data: NewsItem },
    /// Account state after a settlement or reward
    AccountUpdate { data: UserAccount },
    /// A standing limit order was settled
    OrderFilled { order_id: String, data: TradeReceipt },
    AccountSubscribed { uid: String },
    AccountUnsubscribed { uid: String },
    Pong,
    Error { error: String },
}
