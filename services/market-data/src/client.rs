//! Quote orchestration: cache first, primary with retry, after-hours overlay,
//! stale-cache degradation.

use crate::cache::{QuoteCache, DEFAULT_MAX_ENTRIES};
use crate::retry::{Deadline, RetryPolicy};
use crate::sessions::in_after_hours_window;
use crate::types::*;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Wall clock used for after-hours window checks
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Tunables for `MarketDataClient`
#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    pub max_retries: u32,
    pub primary_retry_delay: Duration,
    pub secondary_retry_delay: Duration,
    pub quote_ttl: Duration,
    pub after_hours_ttl: Duration,
    /// Max in-flight secondary requests per pass
    pub secondary_concurrency: usize,
    pub max_cache_entries: usize,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            primary_retry_delay: Duration::from_secs(1),
            secondary_retry_delay: Duration::from_millis(500),
            quote_ttl: Duration::from_secs(30 * 60),
            after_hours_ttl: Duration::from_secs(5 * 60),
            secondary_concurrency: 4,
            max_cache_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl MarketDataConfig {
    /// Builds the cache matching these TTLs
    pub fn build_cache(&self) -> QuoteCache {
        QuoteCache::with_capacity_limit(self.quote_ttl, self.after_hours_ttl, self.max_cache_entries)
    }
}

/// Multi-source quote client
pub struct MarketDataClient {
    primary: Arc<dyn QuoteSource>,
    secondary: Option<Arc<dyn AfterHoursSource>>,
    cache: QuoteCache,
    config: MarketDataConfig,
    clock: Clock,
}

impl MarketDataClient {
    pub fn new(primary: Arc<dyn QuoteSource>, cache: QuoteCache, config: MarketDataConfig) -> Self {
        Self {
            primary,
            secondary: None,
            cache,
            config,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_secondary(mut self, source: Arc<dyn AfterHoursSource>) -> Self {
        self.secondary = Some(source);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn cache(&self) -> &QuoteCache {
        &self.cache
    }

    pub fn config(&self) -> &MarketDataConfig {
        &self.config
    }

    fn primary_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.max_retries, self.config.primary_retry_delay)
    }

    fn secondary_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.max_retries, self.config.secondary_retry_delay)
    }

    /// Quotes for every config that resolved, keyed by stock code.
    ///
    /// Fails only when the primary source is exhausted and nothing at all is
    /// cached for the requested codes.
    pub async fn fetch_quotes(
        &self,
        configs: &[StockConfig],
        deadline: &Deadline,
    ) -> Result<HashMap<String, Quote>> {
        let mut result = HashMap::new();
        if configs.is_empty() {
            return Ok(result);
        }

        let mut missing: Vec<StockConfig> = Vec::new();
        for config in configs {
            match self.cache.fresh_quote(&config.code).await {
                Some(quote) => {
                    result.insert(config.code.clone(), quote);
                }
                None => {
                    if !missing.iter().any(|m| m.code == config.code) {
                        missing.push(config.clone());
                    }
                }
            }
        }

        if missing.is_empty() {
            debug!("All {} quotes served from cache", result.len());
            self.apply_after_hours(&mut result, deadline, false).await;
            return Ok(result);
        }

        debug!(
            "{} cached, {} to fetch from {}",
            result.len(),
            missing.len(),
            self.primary.name()
        );

        let primary = self.primary.clone();
        let fetched = self
            .primary_policy()
            .run(primary.name(), deadline, || primary.fetch(&missing))
            .await;

        match fetched {
            Ok(fresh) => {
                for (code, quote) in fresh {
                    self.cache.put_quote(quote.clone()).await;
                    result.insert(code, quote);
                }
                for config in &missing {
                    if result.contains_key(&config.code) {
                        continue;
                    }
                    if let Some(stale) = self.cache.last_known_quote(&config.code).await {
                        debug!("{} missing from response, using last known quote", config.code);
                        result.insert(config.code.clone(), stale);
                    }
                }
                self.apply_after_hours(&mut result, deadline, true).await;
                Ok(result)
            }
            Err(e) => {
                for config in &missing {
                    if let Some(stale) = self.cache.last_known_quote(&config.code).await {
                        result.insert(config.code.clone(), stale);
                    }
                }

                if result.is_empty() {
                    return Err(MarketDataError::Unavailable(e.to_string()));
                }

                warn!(
                    "{} fetch failed, serving {} cached quotes: {}",
                    primary.name(),
                    result.len(),
                    e
                );
                self.apply_after_hours(&mut result, deadline, false).await;
                Ok(result)
            }
        }
    }

    /// Overlay after-hours price/diff onto US quotes outside their session.
    /// With `allow_network` unset only cached after-hours prices are used,
    /// including expired ones that are not older than the cached quote.
    async fn apply_after_hours(
        &self,
        quotes: &mut HashMap<String, Quote>,
        deadline: &Deadline,
        allow_network: bool,
    ) {
        let now = (self.clock)();
        let mut to_fetch = Vec::new();

        for (code, quote) in quotes.iter_mut() {
            if !in_after_hours_window(quote.market_type, now) {
                continue;
            }
            let cached = match self.cache.fresh_after_hours(code).await {
                Some(after_hours) => Some(after_hours),
                None if allow_network => {
                    to_fetch.push(code.clone());
                    None
                }
                None => self.cache.last_known_after_hours(code).await,
            };
            if let Some(after_hours) = cached {
                *quote = quote.clone().with_after_hours(&after_hours);
            }
        }

        let secondary = match (&self.secondary, to_fetch.is_empty()) {
            (Some(source), false) => Arc::clone(source),
            _ => return,
        };

        let policy = self.secondary_policy();
        let results: Vec<(String, Result<AfterHoursPrice>)> = futures::stream::iter(to_fetch)
            .map(|code| {
                let source = Arc::clone(&secondary);
                async move {
                    let result = policy
                        .run(source.name(), deadline, || source.fetch_after_hours(&code))
                        .await;
                    (code, result)
                }
            })
            .buffer_unordered(self.config.secondary_concurrency.max(1))
            .collect()
            .await;

        for (code, result) in results {
            match result {
                Ok(after_hours) => {
                    self.cache.put_after_hours(&code, after_hours).await;
                    if let Some(quote) = quotes.get_mut(&code) {
                        debug!(
                            "{} after-hours {} ({:+.2}%) replaces {}",
                            code, after_hours.price, after_hours.diff, quote.price
                        );
                        *quote = quote.clone().with_after_hours(&after_hours);
                    }
                }
                Err(e) => {
                    warn!(
                        "After-hours lookup for {} via {} failed, keeping primary quote: {}",
                        code,
                        secondary.name(),
                        e
                    );
                }
            }
        }
    }

    /// Health of the configured sources
    pub fn health(&self) -> Vec<SourceHealth> {
        let mut healths = Vec::new();
        if let Some(health) = self.primary.health() {
            healths.push(health);
        }
        if let Some(health) = self.secondary.as_ref().and_then(|s| s.health()) {
            healths.push(health);
        }
        healths
    }

    /// Drop every cached quote
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("Quote cache cleared");
    }
}
