//! Alert cooldowns keyed by (stock, rule)

use crate::rules::BREAK_EVEN_KEY;
use market_data::TtlCache;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_RULE_COOLDOWN: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_BREAK_EVEN_COOLDOWN: Duration = Duration::from_secs(10 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub code: String,
    pub rule: String,
}

impl DedupKey {
    pub fn new(code: &str, rule: &str) -> Self {
        Self {
            code: code.to_string(),
            rule: rule.to_string(),
        }
    }
}

/// Suppresses repeat alerts for the same key inside its cooldown window
#[derive(Clone)]
pub struct NotificationDeduper {
    fired: TtlCache<DedupKey, ()>,
    rule_cooldown: Duration,
    break_even_cooldown: Duration,
}

impl Default for NotificationDeduper {
    fn default() -> Self {
        Self::new(DEFAULT_RULE_COOLDOWN, DEFAULT_BREAK_EVEN_COOLDOWN)
    }
}

impl NotificationDeduper {
    pub fn new(rule_cooldown: Duration, break_even_cooldown: Duration) -> Self {
        Self {
            fired: TtlCache::new(rule_cooldown),
            rule_cooldown,
            break_even_cooldown,
        }
    }

    pub fn cooldown_for(&self, rule_key: &str) -> Duration {
        if rule_key == BREAK_EVEN_KEY {
            self.break_even_cooldown
        } else {
            self.rule_cooldown
        }
    }

    /// True at most once per cooldown window; a `true` marks the key as fired
    pub async fn should_fire(&self, code: &str, rule_key: &str) -> bool {
        let fire = self
            .fired
            .insert_if_vacant(DedupKey::new(code, rule_key), (), self.cooldown_for(rule_key))
            .await;
        if !fire {
            debug!("Suppressed repeat alert {} / {}", code, rule_key);
        }
        fire
    }

    /// Drop expired cooldowns
    pub async fn purge_expired(&self) -> usize {
        self.fired.purge_expired().await
    }

    pub async fn len(&self) -> usize {
        self.fired.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_once_per_window() {
        let deduper = NotificationDeduper::default();

        assert!(deduper.should_fire("600000", "3%").await);
        assert!(!deduper.should_fire("600000", "3%").await);
        // Different rule and different stock are independent keys
        assert!(deduper.should_fire("600000", "|-5%").await);
        assert!(deduper.should_fire("000001", "3%").await);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(!deduper.should_fire("600000", "3%").await);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(deduper.should_fire("600000", "3%").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_even_uses_long_cooldown() {
        let deduper = NotificationDeduper::default();
        assert_eq!(deduper.cooldown_for(BREAK_EVEN_KEY), DEFAULT_BREAK_EVEN_COOLDOWN);

        assert!(deduper.should_fire("600000", BREAK_EVEN_KEY).await);
        tokio::time::advance(Duration::from_secs(9 * 60 * 60)).await;
        assert!(!deduper.should_fire("600000", BREAK_EVEN_KEY).await);
        tokio::time::advance(Duration::from_secs(60 * 60)).await;
        assert!(deduper.should_fire("600000", BREAK_EVEN_KEY).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_fire_once() {
        let deduper = NotificationDeduper::default();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let deduper = deduper.clone();
                tokio::spawn(async move { deduper.should_fire("600000", "3%").await })
            })
            .collect();

        let mut fired = 0;
        for handle in handles {
            if handle.await.unwrap() {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let deduper = NotificationDeduper::default();
        deduper.should_fire("600000", "3%").await;
        deduper.should_fire("600000", BREAK_EVEN_KEY).await;

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(deduper.purge_expired().await, 1);
        assert_eq!(deduper.len().await, 1);
    }
}
