//! Short-TTL caching decorators
//!
//! Wrap any `OracleReader` / `RateConverter`; the aggregator does not know
//! whether it talks to a cached or a live source. Uses DashMap so concurrent
//! workers read and refresh entries without a global lock.

use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use pricefeed_core::{Currency, PriceResult, RateError};
use crate::oracle::{FeedReading, OracleReader};
use crate::rates::RateConverter;

/// Timestamped cache entry
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        Self { value, fetched_at: Instant::now() }
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.age() >= ttl
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Counters {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, entries: usize) -> CacheStats {
        CacheStats {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Caches oracle readings per asset
pub struct CachedOracle<R> {
    inner: R,
    ttl: Duration,
    entries: DashMap<String, CacheEntry<FeedReading>>,
    counters: Counters,
}

impl<R: OracleReader> CachedOracle<R> {
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
            counters: Counters::default(),
        }
    }

    /// Drop the entry for one asset
    pub fn invalidate(&self, asset: &str) {
        self.entries.remove(&asset.trim().to_ascii_lowercase());
    }

    /// Remove expired entries
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| !entry.is_stale(ttl));
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.entries.len())
    }
}

#[async_trait::async_trait]
impl<R: OracleReader> OracleReader for CachedOracle<R> {
    async fn fetch_feed(&self, asset: &str) -> PriceResult<FeedReading> {
        let key = asset.trim().to_ascii_lowercase();

        if let Some(entry) = self.entries.get(&key) {
            if !entry.is_stale(self.ttl) {
                self.counters.hit();
                return Ok(entry.value.clone());
            }
        }

        // Errors are never cached
        self.counters.miss();
        let reading = self.inner.fetch_feed(&key).await?;
        debug!("Caching {} feed reading for {:?}", key, self.ttl);
        self.entries.insert(key, CacheEntry::new(reading.clone()));
        Ok(reading)
    }
}

/// Caches exchange rates per currency pair
pub struct CachedRates<C> {
    inner: C,
    ttl: Duration,
    entries: DashMap<(Currency, Currency), CacheEntry<Decimal>>,
    counters: Counters,
}

impl<C: RateConverter> CachedRates<C> {
    pub fn new(inner: C, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
            counters: Counters::default(),
        }
    }

    pub fn invalidate(&self, base: Currency, quote: Currency) {
        self.entries.remove(&(base, quote));
    }

    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| !entry.is_stale(ttl));
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.entries.len())
    }
}

#[async_trait::async_trait]
impl<C: RateConverter> RateConverter for CachedRates<C> {
    async fn fetch_rate(&self, base: Currency, quote: Currency) -> Result<Decimal, RateError> {
        if let Some(entry) = self.entries.get(&(base, quote)) {
            if !entry.is_stale(self.ttl) {
                self.counters.hit();
                return Ok(entry.value);
            }
        }

        self.counters.miss();
        let rate = self.inner.fetch_rate(base, quote).await?;
        self.entries.insert((base, quote), CacheEntry::new(rate));
        Ok(rate)
    }
}
