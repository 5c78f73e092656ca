//! Price Simulator
//!
//! In-memory market state: instrument prices, their bounded histories, the
//! tick counter and the news log. Only the market loop mutates it.

use crate::config::MarketConfig;
use crate::services::history::HistoryBuffer;
use crate::types::{HistoryPoint, Instrument, MarketSnapshot, NewsDraft, NewsItem};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, VecDeque};

/// Prefix for every published headline.
pub const NEWS_PREFIX: &str = "[Breaking]";

/// Shared market state.
#[derive(Debug, Clone)]
pub struct MarketState {
    instruments: Vec<Instrument>,
    history: HashMap<String, HistoryBuffer>,
    game_time: u64,
    latest_news: Option<NewsItem>,
    news_logs: VecDeque<NewsItem>,
    config: MarketConfig,
}

impl MarketState {
    pub fn new(config: MarketConfig, instruments: Vec<Instrument>) -> Self {
        let history = instruments
            .iter()
            .map(|i| (i.id.clone(), HistoryBuffer::new(config.history_capacity)))
            .collect();

        Self {
            instruments,
            history,
            game_time: 0,
            latest_news: None,
            news_logs: VecDeque::new(),
            config,
        }
    }

    /// Advance every instrument one random-walk step and record it.
    ///
    /// Each price moves by a uniform fraction in `[-volatility, +volatility]`
    /// and is clamped to the configured floor.
    pub fn step_prices<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let time = self.game_time;
        let floor = self.config.price_floor;

        for instrument in self.instruments.iter_mut() {
            let v = instrument.volatility.abs();
            let change = rng.gen_range(-v..=v);
            instrument.price = (instrument.price * (1.0 + change)).max(floor);

            self.history
                .entry(instrument.id.clone())
                .or_insert_with(|| HistoryBuffer::new(self.config.history_capacity))
                .push(time, instrument.price);
        }

        self.game_time += 1;
    }

    /// Whether this tick should attempt a news event.
    pub fn news_due<R: Rng + ?Sized>(&self, rng: &mut R) -> bool {
        let interval = self.config.news_interval_ticks.max(1);
        self.game_time % interval == 0 && rng.gen::<f64>() < self.config.news_probability
    }

    /// Uniformly random instrument to attach news to.
    pub fn pick_target<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Instrument> {
        self.instruments.choose(rng).cloned()
    }

    /// Publish news and shock the target instrument's price.
    ///
    /// Returns `None` if the instrument no longer exists. No other instrument
    /// is touched.
    pub fn apply_news(&mut self, stock_id: &str, draft: &NewsDraft) -> Option<NewsItem> {
        let instrument = self.instruments.iter_mut().find(|i| i.id == stock_id)?;
        instrument.price *= draft.sentiment.price_effect();

        let item = NewsItem {
            id: uuid::Uuid::new_v4().to_string(),
            text: format!("{} {}", NEWS_PREFIX, draft.headline),
            sentiment: draft.sentiment,
            stock_id: stock_id.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        self.latest_news = Some(item.clone());
        self.news_logs.push_front(item.clone());
        self.news_logs.truncate(self.config.news_log_capacity);

        Some(item)
    }

    pub fn instrument(&self, stock_id: &str) -> Option<&Instrument> {
        self.instruments.iter().find(|i| i.id == stock_id)
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn price(&self, stock_id: &str) -> Option<f64> {
        self.instrument(stock_id).map(|i| i.price)
    }

    pub fn prices(&self) -> HashMap<String, f64> {
        self.instruments
            .iter()
            .map(|i| (i.id.clone(), i.price))
            .collect()
    }

    pub fn game_time(&self) -> u64 {
        self.game_time
    }

    pub fn latest_news(&self) -> Option<&NewsItem> {
        self.latest_news.as_ref()
    }

    pub fn news_logs(&self) -> Vec<NewsItem> {
        self.news_logs.iter().cloned().collect()
    }

    /// The `limit` most recent history points for an instrument.
    pub fn history(&self, stock_id: &str, limit: usize) -> Option<Vec<HistoryPoint>> {
        self.history.get(stock_id).map(|h| h.recent(limit))
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Client-facing state with each history trimmed to the snapshot window.
    pub fn snapshot(&self) -> MarketSnapshot {
        let window = self.config.snapshot_history;
        MarketSnapshot {
            stocks: self.instruments.clone(),
            game_time: self.game_time,
            latest_news: self.latest_news.clone(),
            news_logs: self.news_logs(),
            history: self
                .history
                .iter()
                .map(|(id, h)| (id.clone(), h.recent(window)))
                .collect(),
            last_updated: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{default_instruments, Sentiment};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn state() -> MarketState {
        MarketState::new(MarketConfig::default(), default_instruments())
    }

    #[test]
    fn test_step_stays_within_volatility() {
        let mut market = state();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let before = market.prices();
            market.step_prices(&mut rng);

            for instrument in market.instruments() {
                let prev = before[&instrument.id];
                let change = instrument.price / prev - 1.0;
                assert!(
                    change.abs() <= instrument.volatility + 1e-12,
                    "{} moved {}",
                    instrument.id,
                    change
                );
            }
        }
        assert_eq!(market.game_time(), 200);
    }

    #[test]
    fn test_price_floor() {
        let config = MarketConfig {
            price_floor: 100.0,
            ..MarketConfig::default()
        };
        let mut market = MarketState::new(
            config,
            vec![Instrument::new("PENNY", "Penny", 100.0, 0.9, "Test")],
        );
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..500 {
            market.step_prices(&mut rng);
            assert!(market.price("PENNY").unwrap() >= 100.0);
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let config = MarketConfig {
            history_capacity: 10,
            ..MarketConfig::default()
        };
        let mut market = MarketState::new(config, default_instruments());
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..25 {
            market.step_prices(&mut rng);
        }

        let history = market.history("SAMS", usize::MAX).unwrap();
        assert_eq!(history.len(), 10);
        assert_eq!(history.first().unwrap().time, 15);
        assert_eq!(history.last().unwrap().time, 24);
        assert_eq!(history.last().unwrap().price, market.price("SAMS").unwrap());
    }

    #[test]
    fn test_news_shock_only_hits_target() {
        let mut market = state();
        let before = market.prices();

        let item = market
            .apply_news(
                "KAKO",
                &NewsDraft {
                    headline: "Kakao, record quarter".to_string(),
                    sentiment: Sentiment::Good,
                },
            )
            .unwrap();

        let after = market.prices();
        assert_eq!(after["KAKO"], before["KAKO"] * 1.05);
        for (id, price) in &after {
            if id != "KAKO" {
                assert_eq!(*price, before[id]);
            }
        }
        assert_eq!(item.text, "[Breaking] Kakao, record quarter");
        assert_eq!(market.latest_news().unwrap().id, item.id);
    }

    #[test]
    fn test_bad_news_effect() {
        let mut market = state();
        let before = market.price("BTC").unwrap();
        market.apply_news(
            "BTC",
            &NewsDraft {
                headline: "Exchange hack".to_string(),
                sentiment: Sentiment::Bad,
            },
        );
        assert_eq!(market.price("BTC").unwrap(), before * 0.95);
    }

    #[test]
    fn test_news_for_unknown_instrument() {
        let mut market = state();
        let draft = NewsDraft {
            headline: "x".to_string(),
            sentiment: Sentiment::Good,
        };
        assert!(market.apply_news("NOPE", &draft).is_none());
        assert!(market.news_logs().is_empty());
    }

    #[test]
    fn test_news_log_is_bounded_newest_first() {
        let mut market = state();
        for n in 0..25 {
            market.apply_news(
                "SAMS",
                &NewsDraft {
                    headline: format!("headline {}", n),
                    sentiment: Sentiment::Good,
                },
            );
        }

        let logs = market.news_logs();
        assert_eq!(logs.len(), 20);
        assert_eq!(logs[0].text, "[Breaking] headline 24");
        assert_eq!(logs[19].text, "[Breaking] headline 5");
    }

    #[test]
    fn test_news_due_only_on_interval() {
        let config = MarketConfig {
            news_interval_ticks: 5,
            news_probability: 1.0,
            ..MarketConfig::default()
        };
        let mut market = MarketState::new(config, default_instruments());
        let mut rng = StdRng::seed_from_u64(11);

        let mut due_ticks = Vec::new();
        for _ in 0..12 {
            market.step_prices(&mut rng);
            if market.news_due(&mut rng) {
                due_ticks.push(market.game_time());
            }
        }
        assert_eq!(due_ticks, vec![5, 10]);
    }

    #[test]
    fn test_news_never_due_with_zero_probability() {
        let config = MarketConfig {
            news_interval_ticks: 1,
            news_probability: 0.0,
            ..MarketConfig::default()
        };
        let market = MarketState::new(config, default_instruments());
        let mut rng = StdRng::seed_from_u64(5);
        assert!((0..100).all(|_| !market.news_due(&mut rng)));
    }

    #[test]
    fn test_snapshot_contents() {
        let mut market = state();
        let mut rng = StdRng::seed_from_u64(2);
        market.step_prices(&mut rng);

        let snapshot = market.snapshot();
        assert_eq!(snapshot.stocks.len(), 5);
        assert_eq!(snapshot.game_time, 1);
        assert_eq!(snapshot.history["ECOP"].len(), 1);
        assert!(snapshot.latest_news.is_none());
    }

    #[test]
    fn test_snapshot_history_window() {
        let config = MarketConfig {
            history_capacity: 50,
            snapshot_history: 5,
            ..MarketConfig::default()
        };
        let mut market = MarketState::new(config, default_instruments());
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..30 {
            market.step_prices(&mut rng);
        }

        let snapshot = market.snapshot();
        assert_eq!(snapshot.history["SAMS"].len(), 5);
        assert_eq!(snapshot.history["SAMS"][0].time, 25);
        assert_eq!(market.history("SAMS", usize::MAX).unwrap().len(), 30);
    }
}
