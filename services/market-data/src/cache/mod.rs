//! In-process TTL caches
//!
//! Entries keep their value after expiry so callers can still fall back to
//! the last known value; `get_fresh` treats an expired entry as absent.

use crate::types::{AfterHoursPrice, Quote};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default cap on the number of entries kept per cache
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: Instant,
    pub expires_at: Instant,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Shared-read/exclusive-write key-value store with per-entry expiry
pub struct TtlCache<K, V> {
    entries: Arc<RwLock<HashMap<K, CacheEntry<V>>>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            default_ttl: self.default_ttl,
            max_entries: self.max_entries,
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_capacity_limit(default_ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity_limit(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            default_ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Value if present and not expired
    pub async fn get_fresh(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value.clone())
    }

    /// Value regardless of expiry (last known value)
    pub async fn get_any(&self, key: &K) -> Option<V> {
        let entries = self.entries.read().await;
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Whole entry regardless of expiry
    pub async fn get_entry(&self, key: &K) -> Option<CacheEntry<V>> {
        let entries = self.entries.read().await;
        entries.get(key).cloned()
    }

    pub async fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.default_ttl).await;
    }

    pub async fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
                expires_at: now + ttl,
            },
        );
        Self::enforce_limit(&mut entries, self.max_entries);
    }

    /// Atomic check-and-mark: inserts and returns true only when no fresh
    /// entry exists for `key`.
    pub async fn insert_if_vacant(&self, key: K, value: V, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if entries.get(&key).is_some_and(|entry| entry.is_fresh(now)) {
            return false;
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: now,
                expires_at: now + ttl,
            },
        );
        Self::enforce_limit(&mut entries, self.max_entries);
        true
    }

    /// Drop expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(now));
        let evicted = before.saturating_sub(entries.len());
        if evicted > 0 {
            debug!("Cache: evicted {} expired entries", evicted);
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    // Evict soonest-expiring entries first
    fn enforce_limit(entries: &mut HashMap<K, CacheEntry<V>>, max_entries: usize) {
        if entries.len() <= max_entries {
            return;
        }
        let mut by_expiry: Vec<(K, Instant)> = entries
            .iter()
            .map(|(k, v)| (k.clone(), v.expires_at))
            .collect();
        by_expiry.sort_by_key(|(_, expires_at)| *expires_at);
        let excess = entries.len() - max_entries;
        for (key, _) in by_expiry.into_iter().take(excess) {
            entries.remove(&key);
        }
        warn!("Cache exceeded max size, truncated to {}", max_entries);
    }
}

/// Quote cache with separate TTLs for regular and after-hours prices
#[derive(Clone)]
pub struct QuoteCache {
    regular: TtlCache<String, Quote>,
    after_hours: TtlCache<String, AfterHoursPrice>,
}

impl QuoteCache {
    pub fn new(regular_ttl: Duration, after_hours_ttl: Duration) -> Self {
        Self::with_capacity_limit(regular_ttl, after_hours_ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity_limit(
        regular_ttl: Duration,
        after_hours_ttl: Duration,
        max_entries: usize,
    ) -> Self {
        Self {
            regular: TtlCache::with_capacity_limit(regular_ttl, max_entries),
            after_hours: TtlCache::with_capacity_limit(after_hours_ttl, max_entries),
        }
    }

    pub async fn fresh_quote(&self, code: &str) -> Option<Quote> {
        self.regular.get_fresh(&code.to_string()).await
    }

    pub async fn last_known_quote(&self, code: &str) -> Option<Quote> {
        self.regular.get_any(&code.to_string()).await
    }

    pub async fn put_quote(&self, quote: Quote) {
        self.regular.insert(quote.code.clone(), quote).await;
    }

    pub async fn fresh_after_hours(&self, code: &str) -> Option<AfterHoursPrice> {
        self.after_hours.get_fresh(&code.to_string()).await
    }

    /// Last after-hours price, expired or not, unless the regular quote was
    /// stored after it
    pub async fn last_known_after_hours(&self, code: &str) -> Option<AfterHoursPrice> {
        let code = code.to_string();
        let after_hours = self.after_hours.get_entry(&code).await?;
        match self.regular.get_entry(&code).await {
            Some(quote) if quote.stored_at > after_hours.stored_at => None,
            _ => Some(after_hours.value),
        }
    }

    pub async fn put_after_hours(&self, code: &str, price: AfterHoursPrice) {
        self.after_hours.insert(code.to_string(), price).await;
    }

    pub async fn len(&self) -> usize {
        self.regular.len().await
    }

    pub async fn clear(&self) {
        self.regular.clear().await;
        self.after_hours.clear().await;
    }
}
