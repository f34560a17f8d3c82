//! Service settings
//!
//! Layered with the `config` crate: built-in defaults, then an optional file
//! named by `PRICE_MONITOR_CONFIG`, then `PRICE_MONITOR__*` environment
//! variables (`PRICE_MONITOR__MARKET_DATA__QUOTE_TTL_SECS=600`).

use chrono_tz::Tz;
use market_data::sources::eastmoney::EASTMONEY_BASE_URL;
use market_data::sources::sina::SINA_BASE_URL;
use market_data::MarketDataConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "PRICE_MONITOR_CONFIG";
pub const ENV_PREFIX: &str = "PRICE_MONITOR";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    /// Watch-list JSON file
    pub stocks_file: PathBuf,
    /// Zone of the Open/Closed phase calendar
    pub market_timezone: String,
    pub poll_interval_ms: u64,
    /// Refresh period while the market is closed
    pub closed_refresh_secs: u64,
    pub tick_deadline_secs: u64,
    pub market_data: MarketDataSettings,
    pub alerts: AlertSettings,
    pub notifier: NotifierSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            stocks_file: default_stocks_file(),
            market_timezone: "Asia/Shanghai".to_string(),
            poll_interval_ms: 2000,
            closed_refresh_secs: 60,
            tick_deadline_secs: 30,
            market_data: MarketDataSettings::default(),
            alerts: AlertSettings::default(),
            notifier: NotifierSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MarketDataSettings {
    pub primary_base_url: String,
    pub secondary_base_url: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub primary_retry_delay_ms: u64,
    pub secondary_retry_delay_ms: u64,
    pub quote_ttl_secs: u64,
    pub after_hours_ttl_secs: u64,
    pub secondary_concurrency: usize,
    pub max_cache_entries: usize,
}

impl Default for MarketDataSettings {
    fn default() -> Self {
        Self {
            primary_base_url: EASTMONEY_BASE_URL.to_string(),
            secondary_base_url: SINA_BASE_URL.to_string(),
            request_timeout_secs: 10,
            max_retries: 3,
            primary_retry_delay_ms: 1000,
            secondary_retry_delay_ms: 500,
            quote_ttl_secs: 30 * 60,
            after_hours_ttl_secs: 5 * 60,
            secondary_concurrency: 4,
            max_cache_entries: 10_000,
        }
    }
}

impl MarketDataSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn client_config(&self) -> MarketDataConfig {
        MarketDataConfig {
            max_retries: self.max_retries,
            primary_retry_delay: Duration::from_millis(self.primary_retry_delay_ms),
            secondary_retry_delay: Duration::from_millis(self.secondary_retry_delay_ms),
            quote_ttl: Duration::from_secs(self.quote_ttl_secs),
            after_hours_ttl: Duration::from_secs(self.after_hours_ttl_secs),
            secondary_concurrency: self.secondary_concurrency,
            max_cache_entries: self.max_cache_entries,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AlertSettings {
    pub rule_cooldown_secs: u64,
    pub break_even_cooldown_secs: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            rule_cooldown_secs: 5 * 60,
            break_even_cooldown_secs: 10 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifierSettings {
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

/// `PRICE_MONITOR__SECTION__KEY`, parsed into numbers where possible
fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

fn default_stocks_file() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("StockMonitor.json")
}

impl Settings {
    /// Defaults, then `PRICE_MONITOR_CONFIG` file, then environment
    pub fn load() -> Result<Self, SettingsError> {
        let file = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        Self::load_from(file.as_deref())
    }

    pub fn load_from(file: Option<&std::path::Path>) -> Result<Self, SettingsError> {
        Self::load_layers(file, environment())
    }

    fn load_layers(
        file: Option<&std::path::Path>,
        env: config::Environment,
    ) -> Result<Self, SettingsError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(env);

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let non_zero = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("closed_refresh_secs", self.closed_refresh_secs),
            ("tick_deadline_secs", self.tick_deadline_secs),
            ("market_data.request_timeout_secs", self.market_data.request_timeout_secs),
            ("market_data.quote_ttl_secs", self.market_data.quote_ttl_secs),
            ("market_data.after_hours_ttl_secs", self.market_data.after_hours_ttl_secs),
            ("alerts.rule_cooldown_secs", self.alerts.rule_cooldown_secs),
            ("alerts.break_even_cooldown_secs", self.alerts.break_even_cooldown_secs),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(SettingsError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.market_data.max_retries == 0 {
            return Err(SettingsError::Invalid {
                field: "market_data.max_retries",
                reason: "at least one attempt is required".to_string(),
            });
        }

        self.timezone()?;
        Ok(())
    }

    pub fn timezone(&self) -> Result<Tz, SettingsError> {
        self.market_timezone
            .parse::<Tz>()
            .map_err(|e| SettingsError::Invalid {
                field: "market_timezone",
                reason: e.to_string(),
            })
    }

    /// Unknown levels fall back to INFO
    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level
            .parse::<tracing::Level>()
            .unwrap_or(tracing::Level::INFO)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn closed_refresh(&self) -> Duration {
        Duration::from_secs(self.closed_refresh_secs)
    }

    pub fn tick_deadline(&self) -> Duration {
        Duration::from_secs(self.tick_deadline_secs)
    }

    pub fn rule_cooldown(&self) -> Duration {
        Duration::from_secs(self.alerts.rule_cooldown_secs)
    }

    pub fn break_even_cooldown(&self) -> Duration {
        Duration::from_secs(self.alerts.break_even_cooldown_secs)
    }
}
