//! Market Types
//!
//! Instruments, price history points and the shared market snapshot that is
//! mirrored to the store and streamed to clients every tick.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::news::NewsItem;

/// One tradable simulated asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    pub id: String,
    /// Display name shown to players.
    pub name: String,
    pub price: f64,
    /// Maximum per-tick fractional move, in (0, 1).
    pub volatility: f64,
    pub sector: String,
}

impl Instrument {
    pub fn new(id: &str, name: &str, price: f64, volatility: f64, sector: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            price,
            volatility,
            sector: sector.to_string(),
        }
    }
}

/// Instruments the market starts with after every restart.
pub fn default_instruments() -> Vec<Instrument> {
    vec![
        Instrument::new("SAMS", "Samsung Electronics", 72_000.0, 0.012, "Semiconductors"),
        Instrument::new("KAKO", "Kakao", 54_000.0, 0.020, "Platforms"),
        Instrument::new("HYUN", "Hyundai Motor", 198_000.0, 0.015, "Automotive"),
        Instrument::new("ECOP", "EcoPro", 850_000.0, 0.035, "Batteries"),
        Instrument::new("BTC", "Bitcoin", 45_000_000.0, 0.050, "Crypto"),
    ]
}

/// A single price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub time: u64,
    pub price: f64,
}

/// Market state as seen by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub stocks: Vec<Instrument>,
    pub game_time: u64,
    pub latest_news: Option<NewsItem>,
    pub news_logs: Vec<NewsItem>,
    pub history: HashMap<String, Vec<HistoryPoint>>,
    /// Unix millis.
    pub last_updated: i64,
}

impl MarketSnapshot {
    /// Current price per instrument id.
    pub fn prices(&self) -> HashMap<String, f64> {
        self.stocks.iter().map(|s| (s.id.clone(), s.price)).collect()
    }
}
