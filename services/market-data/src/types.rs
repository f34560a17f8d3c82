use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Exchange/market classification as encoded by the primary quote source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum MarketType {
    Shenzhen,
    Shanghai,
    UsNasdaq,
    UsNyse,
    UsAmex,
    HongKong,
    Other(i32),
}

impl MarketType {
    /// Every market type an unqualified code is fanned out over
    pub const CANDIDATES: [MarketType; 6] = [
        MarketType::Shenzhen,
        MarketType::Shanghai,
        MarketType::UsNasdaq,
        MarketType::UsNyse,
        MarketType::UsAmex,
        MarketType::HongKong,
    ];

    pub fn code(&self) -> i32 {
        match self {
            MarketType::Shenzhen => 0,
            MarketType::Shanghai => 1,
            MarketType::UsNasdaq => 105,
            MarketType::UsNyse => 106,
            MarketType::UsAmex => 107,
            MarketType::HongKong => 116,
            MarketType::Other(code) => *code,
        }
    }

    pub fn is_us(&self) -> bool {
        matches!(
            self,
            MarketType::UsNasdaq | MarketType::UsNyse | MarketType::UsAmex
        )
    }

    /// Prefix used by quote sites that qualify mainland codes ("SZ000001")
    pub fn exchange_prefix(&self) -> &'static str {
        match self {
            MarketType::Shenzhen => "SZ",
            MarketType::Shanghai => "SH",
            _ => "",
        }
    }
}

impl From<i32> for MarketType {
    fn from(code: i32) -> Self {
        match code {
            0 => MarketType::Shenzhen,
            1 => MarketType::Shanghai,
            105 => MarketType::UsNasdaq,
            106 => MarketType::UsNyse,
            107 => MarketType::UsAmex,
            116 => MarketType::HongKong,
            other => MarketType::Other(other),
        }
    }
}

impl From<MarketType> for i32 {
    fn from(market: MarketType) -> Self {
        market.code()
    }
}

/// One watch-list entry as produced by the config layer
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockConfig {
    #[serde(alias = "Code")]
    pub code: String,
    /// Explicit market type; when absent the code is looked up in every market
    #[serde(default, rename = "type", alias = "Type")]
    pub market_type: Option<MarketType>,
    #[serde(default, alias = "CostPrice")]
    pub cost_price: f64,
    #[serde(default, alias = "Position")]
    pub position: f64,
    #[serde(default, alias = "ShowInTitle")]
    pub show_in_title: Option<bool>,
    #[serde(default, alias = "EnableRealTimePic")]
    pub enable_real_time_pic: bool,
    #[serde(default, alias = "MonitorRules")]
    pub monitor_rules: Vec<String>,
}

impl StockConfig {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Default::default()
        }
    }

    pub fn with_market_type(mut self, market_type: MarketType) -> Self {
        self.market_type = Some(market_type);
        self
    }

    pub fn with_cost(mut self, cost_price: f64, position: f64) -> Self {
        self.cost_price = cost_price;
        self.position = position;
        self
    }

    pub fn with_rules<I, S>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.monitor_rules = rules.into_iter().map(Into::into).collect();
        self
    }

    /// Unset means shown
    pub fn shows_in_title(&self) -> bool {
        self.show_in_title.unwrap_or(true)
    }
}

/// Latest quote for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub code: String,
    pub name: String,
    pub price: f64,
    /// Percent change vs prior close
    pub diff: f64,
    pub market_type: MarketType,
    pub high: f64,
    pub open: f64,
    /// Prior trading day's close
    pub base_price: f64,
    /// Underlying equity for convertible bonds and other derivatives
    pub underlying_code: Option<String>,
}

impl Quote {
    pub fn with_after_hours(mut self, after_hours: &AfterHoursPrice) -> Self {
        self.price = after_hours.price;
        self.diff = after_hours.diff;
        self
    }
}

/// Price/diff pair parsed from the secondary (after-hours) source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AfterHoursPrice {
    pub price: f64,
    pub diff: f64,
}

/// Data source health/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: String,
    pub is_healthy: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub success_rate: f64,
    pub last_latency_ms: u64,
}

/// Error types for market data retrieval
#[derive(Debug, thiserror::Error)]
pub enum MarketDataError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("Rate limit exceeded for {source_name}")]
    RateLimit {
        source_name: String,
        retry_after: Option<u64>,
    },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Instrument not found: {0}")]
    NotFound(String),

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Cancelled by shutdown")]
    Cancelled,

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<MarketDataError>,
    },

    #[error("Market data unavailable: {0}")]
    Unavailable(String),
}

impl MarketDataError {
    /// Deadline and shutdown aborts are not worth retrying
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            MarketDataError::DeadlineExceeded | MarketDataError::Cancelled
        )
    }
}

/// Result type for market data operations
pub type Result<T> = std::result::Result<T, MarketDataError>;

/// Batch quote source (primary)
#[async_trait::async_trait]
pub trait QuoteSource: Send + Sync {
    /// Fetch quotes for the given configs, keyed by bare stock code
    async fn fetch(&self, configs: &[StockConfig]) -> Result<HashMap<String, Quote>>;

    fn name(&self) -> &str;

    fn health(&self) -> Option<SourceHealth> {
        None
    }
}

/// Single-code after-hours source (secondary)
#[async_trait::async_trait]
pub trait AfterHoursSource: Send + Sync {
    async fn fetch_after_hours(&self, code: &str) -> Result<AfterHoursPrice>;

    fn name(&self) -> &str;

    fn health(&self) -> Option<SourceHealth> {
        None
    }
}
