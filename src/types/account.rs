//! Account Types
//!
//! Per-user cash, holdings and the leaderboard projection derived from them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Starting cash for every new account.
pub const INITIAL_CASH: f64 = 10_000_000.0;

/// Units of one instrument held by a user.
///
/// `avg_price` is the weighted average cost of all buys and is zero exactly
/// when `held` is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub stock_id: String,
    pub held: u64,
    pub avg_price: f64,
}

impl Holding {
    pub fn empty(stock_id: &str) -> Self {
        Self {
            stock_id: stock_id.to_string(),
            held: 0,
            avg_price: 0.0,
        }
    }

    /// Cost basis of the units currently held.
    pub fn cost_basis(&self) -> f64 {
        self.avg_price * self.held as f64
    }
}

/// A player's persisted balance sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub uid: String,
    /// Display name shown on the leaderboard.
    pub user_id: String,
    pub cash: f64,
    /// Cash the account started with, used for return calculations.
    pub principal: f64,
    /// Only holdings with `held > 0` are kept.
    pub portfolio: Vec<Holding>,
    pub total_asset: f64,
    pub last_reward_at: Option<i64>,
    pub updated_at: i64,
}

impl UserAccount {
    pub fn new(uid: &str, user_id: &str) -> Self {
        Self {
            uid: uid.to_string(),
            user_id: user_id.to_string(),
            cash: INITIAL_CASH,
            principal: INITIAL_CASH,
            portfolio: Vec::new(),
            total_asset: INITIAL_CASH,
            last_reward_at: None,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn holding(&self, stock_id: &str) -> Option<&Holding> {
        self.portfolio.iter().find(|h| h.stock_id == stock_id)
    }

    pub fn units_held(&self, stock_id: &str) -> u64 {
        self.holding(stock_id).map(|h| h.held).unwrap_or(0)
    }

    /// Cash plus every holding marked at the given prices.
    ///
    /// Holdings without a live price contribute nothing.
    pub fn valuation(&self, prices: &HashMap<String, f64>) -> f64 {
        self.cash
            + self
                .portfolio
                .iter()
                .filter_map(|h| prices.get(&h.stock_id).map(|p| p * h.held as f64))
                .sum::<f64>()
    }

    /// Return on principal, in percent.
    pub fn return_pct(&self) -> f64 {
        if self.principal > 0.0 {
            (self.total_asset - self.principal) / self.principal * 100.0
        } else {
            0.0
        }
    }

    pub fn to_leaderboard_entry(&self) -> LeaderboardEntry {
        LeaderboardEntry {
            uid: self.uid.clone(),
            user_id: self.user_id.clone(),
            total_asset: self.total_asset,
            updated_at: self.updated_at,
        }
    }
}

/// Leaderboard projection, rewritten on every balance change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub uid: String,
    pub user_id: String,
    pub total_asset: f64,
    pub updated_at: i64,
}

/// Create account request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountRequest {
    pub uid: String,
    pub user_id: Option<String>,
}

/// Result of a reward grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardGrant {
    pub amount: f64,
    pub cash: f64,
    pub total_asset: f64,
    /// Unix millis after which the next grant is allowed.
    pub next_available_at: i64,
}
