//! Price Monitor Library
//!
//! Watch-list price alerts: rule evaluation, alert cooldowns and the polling
//! loop on top of `market-data`.

pub mod dedup;
pub mod format;
pub mod market_hours;
pub mod metrics;
pub mod notifier;
pub mod portfolio;
pub mod provider;
pub mod rules;
pub mod runner;
pub mod settings;

pub use dedup::{DedupKey, NotificationDeduper};
pub use market_hours::{MarketCalendar, MarketPhase};
pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use notifier::{LogNotifier, Notification, Notifier, WebhookNotifier};
pub use portfolio::{MonitorSnapshot, PortfolioSummary, StockView};
pub use provider::{ConfigProvider, JsonFileConfigProvider, StaticConfigProvider};
pub use rules::{evaluate, triggers, Bounds, Rule, BREAK_EVEN_KEY};
pub use runner::{MonitorLoop, MonitorSettings, TickOutcome};
pub use settings::Settings;
