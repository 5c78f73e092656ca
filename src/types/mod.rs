pub mod account;
pub mod market;
pub mod news;
pub mod order;
pub mod ws;

pub use account::*;
pub use market::*;
pub use news::*;
pub use order::*;
pub use ws::*;
