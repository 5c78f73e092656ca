use std::env;
use std::time::Duration;

/// Market simulation configuration.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    /// Time between ticks (ms).
    pub tick_interval_ms: u64,
    /// News is attempted on ticks divisible by this.
    pub news_interval_ticks: u64,
    /// Chance that an attempt actually publishes news (0-1).
    pub news_probability: f64,
    /// Prices never fall below this.
    pub price_floor: f64,
    /// History points retained per instrument.
    pub history_capacity: usize,
    /// Most recent history points included in each snapshot.
    pub snapshot_history: usize,
    /// News items retained in the log.
    pub news_log_capacity: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            news_interval_ticks: 25,
            news_probability: 0.4,
            price_floor: 100.0,
            history_capacity: 600,
            snapshot_history: 60,
            news_log_capacity: 20,
        }
    }
}

impl MarketConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// Text generation API configuration.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Without a key every news attempt uses the backup headlines.
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemma-3-12b-it".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// SQLite database file (":memory:" for an ephemeral store).
    pub database_path: String,
    pub market: MarketConfig,
    pub generation: GenerationConfig,
    /// Delay before a failed limit order may be retried (seconds).
    pub order_retry_cooldown_secs: u64,
    /// Minimum time between reward grants per account (seconds).
    pub reward_cooldown_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            database_path: "tycoon.db".to_string(),
            market: MarketConfig::default(),
            generation: GenerationConfig::default(),
            order_retry_cooldown_secs: 5,
            reward_cooldown_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        let market = MarketConfig::default();
        let generation = GenerationConfig::default();

        Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            database_path: env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
            market: MarketConfig {
                tick_interval_ms: env::var("TICK_INTERVAL_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(market.tick_interval_ms),
                news_interval_ticks: env::var("NEWS_INTERVAL_TICKS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|v: &u64| *v > 0)
                    .unwrap_or(market.news_interval_ticks),
                news_probability: env::var("NEWS_PROBABILITY")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|v: &f64| (0.0..=1.0).contains(v))
                    .unwrap_or(market.news_probability),
                price_floor: parse_price_floor(env::var("PRICE_FLOOR").ok())
                    .unwrap_or(market.price_floor),
                history_capacity: env::var("HISTORY_CAPACITY")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|v: &usize| *v > 0)
                    .unwrap_or(market.history_capacity),
                snapshot_history: env::var("SNAPSHOT_HISTORY_POINTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(market.snapshot_history),
                news_log_capacity: env::var("NEWS_LOG_CAPACITY")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .filter(|v: &usize| *v > 0)
                    .unwrap_or(market.news_log_capacity),
            },
            generation: GenerationConfig {
                api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.is_empty()),
                model: env::var("GEMINI_MODEL").unwrap_or(generation.model),
                base_url: env::var("GEMINI_BASE_URL").unwrap_or(generation.base_url),
                timeout_secs: env::var("GENERATION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(generation.timeout_secs),
            },
            order_retry_cooldown_secs: env::var("ORDER_RETRY_COOLDOWN_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.order_retry_cooldown_secs),
            reward_cooldown_secs: env::var("REWARD_COOLDOWN_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.reward_cooldown_secs),
        }
    }

    pub fn order_retry_cooldown(&self) -> Duration {
        Duration::from_secs(self.order_retry_cooldown_secs)
    }

    pub fn reward_cooldown(&self) -> Duration {
        Duration::from_secs(self.reward_cooldown_secs)
    }
}

/// A floor must be a positive finite price.
fn parse_price_floor(raw: Option<String>) -> Option<f64> {
    raw.and_then(|v| v.trim().parse().ok())
        .filter(|v: &f64| v.is_finite() && *v > 0.0)
}
