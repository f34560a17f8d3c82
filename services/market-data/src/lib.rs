pub mod types;
pub mod sources {
    pub mod eastmoney;
    pub mod health;
    pub mod sina;
}
pub mod cache;
pub mod client;
pub mod retry;
pub mod sessions;

pub use cache::{QuoteCache, TtlCache};
pub use client::{Clock, MarketDataClient, MarketDataConfig};
pub use retry::{Deadline, RetryPolicy};
pub use sessions::MarketSession;
pub use sources::eastmoney::EastMoneyClient;
pub use sources::sina::SinaClient;
pub use types::*;
