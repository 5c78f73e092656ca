//! News Types

use serde::{Deserialize, Serialize};

/// Direction of a news-induced price shock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Good,
    Bad,
}

impl Sentiment {
    /// Multiplier applied to the target instrument's price.
    pub fn price_effect(&self) -> f64 {
        match self {
            Sentiment::Good => 1.05,
            Sentiment::Bad => 0.95,
        }
    }
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sentiment::Good => write!(f, "good"),
            Sentiment::Bad => write!(f, "bad"),
        }
    }
}

/// Headline and sentiment before they are published.
///
/// This is also the JSON shape requested from the generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsDraft {
    pub headline: String,
    #[serde(rename = "type")]
    pub sentiment: Sentiment,
}

/// A published news event. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub sentiment: Sentiment,
    /// Instrument the shock was applied to.
    pub stock_id: String,
    /// Unix millis.
    pub timestamp: i64,
}
