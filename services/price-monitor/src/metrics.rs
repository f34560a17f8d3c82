//! Loop counters and gauges

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Metric names
pub mod names {
    pub const TICKS: &str = "ticks_total";
    pub const TICKS_SKIPPED: &str = "ticks_skipped_total";
    pub const FETCH_ERRORS: &str = "fetch_errors_total";
    pub const ALERTS_FIRED: &str = "alerts_fired_total";
    pub const ALERTS_SUPPRESSED: &str = "alerts_suppressed_total";
    pub const NOTIFY_ERRORS: &str = "notify_errors_total";

    pub const WATCHED_STOCKS: &str = "watched_stocks";
    pub const LAST_PASS_MS: &str = "last_pass_ms";
    pub const ACTIVE_COOLDOWNS: &str = "active_cooldowns";
}

/// Shared by the loop and anything that wants to report on it
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<RwLock<MetricsInner>>,
}

struct MetricsInner {
    counters: HashMap<&'static str, u64>,
    gauges: HashMap<&'static str, f64>,
    started: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner {
                counters: HashMap::new(),
                gauges: HashMap::new(),
                started: Instant::now(),
            })),
        }
    }

    pub async fn increment(&self, name: &'static str, value: u64) {
        let mut inner = self.inner.write().await;
        *inner.counters.entry(name).or_insert(0) += value;
    }

    pub async fn gauge(&self, name: &'static str, value: f64) {
        self.inner.write().await.gauges.insert(name, value);
    }

    /// Gauges describing a completed pass
    pub async fn record_pass(&self, watched: usize, elapsed: Duration) {
        let mut inner = self.inner.write().await;
        inner.gauges.insert(names::WATCHED_STOCKS, watched as f64);
        inner
            .gauges
            .insert(names::LAST_PASS_MS, elapsed.as_secs_f64() * 1000.0);
    }

    pub async fn get_counter(&self, name: &str) -> u64 {
        self.inner.read().await.counters.get(name).copied().unwrap_or(0)
    }

    pub async fn get_gauge(&self, name: &str) -> Option<f64> {
        self.inner.read().await.gauges.get(name).copied()
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().await;
        MetricsSnapshot {
            counters: inner
                .counters
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
            gauges: inner
                .gauges
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
            uptime_secs: inner.started.elapsed().as_secs(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, f64>,
    pub uptime_secs: u64,
}

impl MetricsSnapshot {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Share of evaluated alerts that were held back by cooldowns
    pub fn suppression_rate(&self) -> f64 {
        let fired = self.counter(names::ALERTS_FIRED);
        let suppressed = self.counter(names::ALERTS_SUPPRESSED);
        match fired + suppressed {
            0 => 0.0,
            total => suppressed as f64 / total as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counters_accumulate_across_clones() {
        let metrics = MetricsCollector::new();
        let other = metrics.clone();

        metrics.increment(names::TICKS, 1).await;
        other.increment(names::TICKS, 2).await;
        other.increment(names::ALERTS_FIRED, 1).await;
        other.increment(names::ALERTS_SUPPRESSED, 3).await;

        assert_eq!(metrics.get_counter(names::TICKS).await, 3);
        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.counter(names::ALERTS_FIRED), 1);
        assert_eq!(snapshot.counter(names::NOTIFY_ERRORS), 0);
        assert_eq!(snapshot.suppression_rate(), 0.75);
    }

    #[tokio::test]
    async fn test_record_pass_gauges() {
        let metrics = MetricsCollector::new();
        assert_eq!(metrics.get_gauge(names::WATCHED_STOCKS).await, None);

        metrics.record_pass(12, Duration::from_millis(250)).await;
        assert_eq!(metrics.get_gauge(names::WATCHED_STOCKS).await, Some(12.0));
        assert_eq!(metrics.get_gauge(names::LAST_PASS_MS).await, Some(250.0));
    }
}
