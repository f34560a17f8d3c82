use crate::types::{MarketDataError, SourceHealth};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Request outcome tracking so health checks never hit the network
#[derive(Debug, Default)]
pub struct HealthTracker {
    /// Millis since epoch
    last_success_ms: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    consecutive_failures: AtomicU32,
    last_latency_ms: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one request
    pub fn record<T>(&self, result: &Result<T, MarketDataError>, elapsed: Duration) {
        match result {
            Ok(_) => self.record_success(elapsed.as_millis() as u64),
            Err(e) => self.record_failure(e),
        }
    }

    pub fn record_success(&self, latency_ms: u64) {
        let now_ms = Utc::now().timestamp_millis() as u64;
        self.last_success_ms.store(now_ms, Ordering::Relaxed);
        self.last_latency_ms.store(latency_ms, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: &MarketDataError) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last_error) = self.last_error.lock() {
            *last_error = Some(error.to_string());
        }
    }

    /// Healthy once a request has succeeded and none failed since
    pub fn is_healthy(&self) -> bool {
        self.last_success_ms.load(Ordering::Relaxed) > 0 && self.consecutive_failures() == 0
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn success_rate(&self) -> f64 {
        let successes = self.success_count.load(Ordering::Relaxed);
        let failures = self.failure_count.load(Ordering::Relaxed);
        match successes + failures {
            0 => 1.0,
            total => successes as f64 / total as f64,
        }
    }

    pub fn snapshot(&self, source: &str) -> SourceHealth {
        let last_success_ms = self.last_success_ms.load(Ordering::Relaxed);
        let last_success: Option<DateTime<Utc>> = match last_success_ms {
            0 => None,
            ms => DateTime::from_timestamp_millis(ms as i64),
        };
        let consecutive_failures = self.consecutive_failures();
        let last_error = if consecutive_failures > 0 {
            self.last_error.lock().ok().and_then(|e| e.clone())
        } else {
            None
        };

        SourceHealth {
            source: source.to_string(),
            is_healthy: self.is_healthy(),
            last_success,
            last_error,
            consecutive_failures,
            success_rate: self.success_rate(),
            last_latency_ms: self.last_latency_ms.load(Ordering::Relaxed),
        }
    }
}
