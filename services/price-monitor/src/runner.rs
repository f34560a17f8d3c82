//! Monitor loop: fetch, evaluate, dedup, notify

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use chrono::{DateTime, Utc};
use market_data::{Clock, Deadline, MarketDataClient, Quote, StockConfig};

use crate::dedup::NotificationDeduper;
use crate::format::{format_message, quote_link};
use crate::market_hours::{MarketCalendar, MarketPhase};
use crate::metrics::{names, MetricsCollector};
use crate::notifier::{Notification, Notifier};
use crate::portfolio::{MonitorSnapshot, StockView};
use crate::provider::ConfigProvider;
use crate::rules::{fired_rules, FiredRule};
use crate::settings::Settings;

/// Loop timing
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub closed_refresh: Duration,
    pub tick_deadline: Duration,
    pub purge_interval: Duration,
    /// Log a metrics summary every this many ticks
    pub summary_every: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            closed_refresh: Duration::from_secs(60),
            tick_deadline: Duration::from_secs(30),
            purge_interval: Duration::from_secs(5 * 60),
            summary_every: 150,
        }
    }
}

impl From<&Settings> for MonitorSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            closed_refresh: settings.closed_refresh(),
            tick_deadline: settings.tick_deadline(),
            ..Self::default()
        }
    }
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Market closed and the last pass is recent enough
    Skipped,
    Completed { quotes: usize, alerts: usize },
    /// Nothing usable this tick; the previous snapshot stays published
    Failed,
}

pub struct MonitorLoop {
    provider: Arc<dyn ConfigProvider>,
    market_data: Arc<MarketDataClient>,
    deduper: NotificationDeduper,
    notifier: Arc<dyn Notifier>,
    calendar: MarketCalendar,
    metrics: MetricsCollector,
    settings: MonitorSettings,
    clock: Clock,
    snapshot_tx: watch::Sender<MonitorSnapshot>,
    last_success: Option<Instant>,
    tick_count: u64,
}

impl MonitorLoop {
    pub fn new(
        provider: Arc<dyn ConfigProvider>,
        market_data: Arc<MarketDataClient>,
        deduper: NotificationDeduper,
        notifier: Arc<dyn Notifier>,
        calendar: MarketCalendar,
        settings: MonitorSettings,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(MonitorSnapshot::default());
        Self {
            provider,
            market_data,
            deduper,
            notifier,
            calendar,
            metrics: MetricsCollector::new(),
            settings,
            clock: Arc::new(Utc::now),
            snapshot_tx,
            last_success: None,
            tick_count: 0,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Latest snapshot; updated after every successful pass
    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn deduper(&self) -> &NotificationDeduper {
        &self.deduper
    }

    /// Drop expired alert cooldowns and report how many are still active
    pub async fn purge_cooldowns(&self) -> usize {
        let evicted = self.deduper.purge_expired().await;
        if evicted > 0 {
            debug!("Purged {} expired alert cooldowns", evicted);
        }
        let active = self.deduper.len().await;
        self.metrics
            .gauge(names::ACTIVE_COOLDOWNS, active as f64)
            .await;
        evicted
    }

    /// Closed phase still runs on cold start and every `closed_refresh`
    pub fn should_run(&self, phase: MarketPhase) -> bool {
        match (phase, self.last_success) {
            (MarketPhase::Open, _) => true,
            (MarketPhase::Closed, None) => true,
            (MarketPhase::Closed, Some(at)) => at.elapsed() >= self.settings.closed_refresh,
        }
    }

    /// Run ticks until shutdown is signalled (or its sender is dropped)
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        info!(
            "Monitor loop starting: poll every {:?}, closed refresh {:?}, {} timezone",
            self.settings.poll_interval,
            self.settings.closed_refresh,
            self.calendar.timezone()
        );

        let mut tick_interval = interval(self.settings.poll_interval);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut purge_interval = interval(self.settings.purge_interval);
        purge_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            let tick_shutdown = shutdown.clone();

            tokio::select! {
                _ = tick_interval.tick() => {
                    let now = (self.clock)();
                    let outcome = self.run_tick(now, Some(tick_shutdown)).await;
                    debug!("Tick {}: {:?}", self.tick_count, outcome);
                    if self.settings.summary_every > 0
                        && self.tick_count % self.settings.summary_every == 0
                    {
                        self.log_summary().await;
                    }
                }
                _ = purge_interval.tick() => {
                    self.purge_cooldowns().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown channel closed, stopping monitor loop");
                        break;
                    }
                }
            }
        }

        info!("Monitor loop stopped after {} ticks", self.tick_count);
        Ok(())
    }

    /// One fetch/evaluate/notify pass at wall time `now`
    pub async fn run_tick(
        &mut self,
        now: DateTime<Utc>,
        shutdown: Option<watch::Receiver<bool>>,
    ) -> TickOutcome {
        self.tick_count += 1;
        self.metrics.increment(names::TICKS, 1).await;

        let phase = self.calendar.phase_at(now);
        if !self.should_run(phase) {
            debug!("Market closed, skipping tick");
            self.metrics.increment(names::TICKS_SKIPPED, 1).await;
            return TickOutcome::Skipped;
        }

        let started = Instant::now();
        let configs = match self.provider.stock_configs().await {
            Ok(configs) => configs,
            Err(e) => {
                warn!("Failed to load watch-list: {}", e);
                return TickOutcome::Failed;
            }
        };

        if configs.is_empty() {
            self.publish(Vec::new(), phase, now);
            return TickOutcome::Completed {
                quotes: 0,
                alerts: 0,
            };
        }

        let mut deadline = Deadline::after(self.settings.tick_deadline);
        if let Some(shutdown) = shutdown {
            deadline = deadline.with_shutdown(shutdown);
        }

        let quotes = match self.market_data.fetch_quotes(&configs, &deadline).await {
            Ok(quotes) => quotes,
            Err(e) => {
                error!("No quotes available, keeping previous snapshot: {}", e);
                self.metrics.increment(names::FETCH_ERRORS, 1).await;
                return TickOutcome::Failed;
            }
        };

        let mut views = Vec::with_capacity(configs.len());
        let mut alerts = 0;
        for config in configs {
            let Some(quote) = quotes.get(&config.code) else {
                debug!("No quote for {}", config.code);
                continue;
            };
            for fired in fired_rules(&config, quote) {
                if self.dispatch(&config, quote, &fired).await {
                    alerts += 1;
                }
            }
            views.push(StockView::new(config, quote.clone()));
        }

        let resolved = views.len();
        self.publish(views, phase, now);
        self.metrics.record_pass(resolved, started.elapsed()).await;
        TickOutcome::Completed {
            quotes: resolved,
            alerts,
        }
    }

    /// Dedup then notify; delivery failures keep the cooldown marked
    async fn dispatch(&self, config: &StockConfig, quote: &Quote, fired: &FiredRule) -> bool {
        if !self.deduper.should_fire(&config.code, &fired.key).await {
            self.metrics.increment(names::ALERTS_SUPPRESSED, 1).await;
            return false;
        }

        let notification = Notification {
            title: quote.name.clone(),
            subtitle: format!("rule: {}", fired.text),
            message: format_message(quote),
            link: quote_link(config, quote),
        };
        info!(
            "Alert {} ({}) {}: {}",
            quote.name, config.code, notification.subtitle, notification.message
        );
        self.metrics.increment(names::ALERTS_FIRED, 1).await;

        if let Err(e) = self.notifier.notify(&notification).await {
            warn!(
                "{} notifier failed for {} / {}: {}",
                self.notifier.name(),
                config.code,
                fired.key,
                e
            );
            self.metrics.increment(names::NOTIFY_ERRORS, 1).await;
        }
        true
    }

    fn publish(&mut self, views: Vec<StockView>, phase: MarketPhase, now: DateTime<Utc>) {
        self.snapshot_tx
            .send_replace(MonitorSnapshot::new(views, phase, now));
        self.last_success = Some(Instant::now());
    }

    async fn log_summary(&self) {
        let snapshot = self.metrics.snapshot().await;
        info!(
            "Monitor summary: {} ticks ({} skipped), {} fetch errors, {} alerts ({:.0}% suppressed, {} delivery errors), uptime {}s",
            snapshot.counter(names::TICKS),
            snapshot.counter(names::TICKS_SKIPPED),
            snapshot.counter(names::FETCH_ERRORS),
            snapshot.counter(names::ALERTS_FIRED),
            snapshot.suppression_rate() * 100.0,
            snapshot.counter(names::NOTIFY_ERRORS),
            snapshot.uptime_secs
        );
        for health in self.market_data.health() {
            info!(
                "Source {}: healthy={} success_rate={:.2} latency={}ms",
                health.source, health.is_healthy, health.success_rate, health.last_latency_ms
            );
            if let Some(last_error) = &health.last_error {
                warn!(
                    "Source {} failing ({} in a row): {}",
                    health.source, health.consecutive_failures, last_error
                );
            }
        }
    }
}
