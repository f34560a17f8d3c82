//! Deadline-bounded retry with linear backoff

use crate::types::{MarketDataError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::warn;

/// Upper bound for one fetch pass, optionally tied to a shutdown signal
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Deadline {
    pub fn at(at: Instant) -> Self {
        Self { at, shutdown: None }
    }

    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn instant(&self) -> Instant {
        self.at
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves with the abort reason once the deadline passes or shutdown is signalled
    pub async fn expired(&self) -> MarketDataError {
        let mut shutdown = self.shutdown.clone();
        let shutdown_signalled = async move {
            match shutdown.as_mut() {
                Some(rx) => {
                    let sender_gone = rx.wait_for(|stop| *stop).await.is_err();
                    if sender_gone {
                        // Nobody can request shutdown anymore
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = tokio::time::sleep_until(self.at) => MarketDataError::DeadlineExceeded,
            _ = shutdown_signalled => MarketDataError::Cancelled,
        }
    }

    /// Run `fut` unless the deadline fires first
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_shutdown() {
            return Err(MarketDataError::Cancelled);
        }
        if self.is_expired() {
            return Err(MarketDataError::DeadlineExceeded);
        }
        tokio::select! {
            biased;
            abort = self.expired() => Err(abort),
            result = fut => result,
        }
    }

    /// Cancellable sleep
    pub async fn sleep(&self, delay: Duration) -> Result<()> {
        self.run(async {
            tokio::time::sleep(delay).await;
            Ok(())
        })
        .await
    }
}

/// Retry schedule: attempt `k` (1-based) waits `k * base_delay` before the next try
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Run `op` until it succeeds, attempts run out, or the deadline aborts
    pub async fn run<T, F, Fut>(&self, source: &str, deadline: &Deadline, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            match deadline.run(op()).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_abort() => return Err(e),
                Err(e) => {
                    if attempt < attempts {
                        let wait = self.delay_after(attempt);
                        warn!(
                            "{} request failed (attempt {}/{}), retrying in {:?}: {}",
                            source, attempt, attempts, wait, e
                        );
                        last_err = Some(e);
                        deadline.sleep(wait).await?;
                    } else {
                        last_err = Some(e);
                    }
                }
            }
        }

        Err(MarketDataError::RetriesExhausted {
            attempts,
            last: Box::new(
                last_err.unwrap_or_else(|| MarketDataError::Api("no attempt made".to_string())),
            ),
        })
    }
}
