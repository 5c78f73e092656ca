pub mod generation;
pub mod history;
pub mod market;
pub mod news;
pub mod order_watcher;
pub mod simulator;
pub mod sqlite_store;
pub mod trading;

pub use generation::{GeminiClient, HeadlineSource, ModelInfo};
pub use history::HistoryBuffer;
pub use market::{MarketService, TickReport};
pub use news::NewsGenerator;
pub use order_watcher::{InFlightTracker, LimitOrderWatcher, WatchReport};
pub use simulator::MarketState;
pub use sqlite_store::{OrderFill, SqliteStore};
pub use trading::TradingService;
