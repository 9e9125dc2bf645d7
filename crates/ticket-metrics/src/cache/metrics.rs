//! Cache metrics tracking

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for coordinator operations
#[derive(Debug)]
pub struct CacheMetrics {
    /// Fresh entries served
    hits: AtomicU64,
    /// Requests that started a recomputation
    misses: AtomicU64,
    /// Expired entries served while a recomputation was in flight
    stale_serves: AtomicU64,
    /// Requests that joined an in-flight recomputation
    coalesced: AtomicU64,
    /// Successful aggregations
    aggregations: AtomicU64,
    /// Failed aggregations
    aggregation_failures: AtomicU64,
    /// Entries evicted due to capacity
    evictions: AtomicU64,
    /// Entries and claims invalidated
    invalidations: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale_serves: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
            aggregations: AtomicU64::new(0),
            aggregation_failures: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_serve(&self) {
        self.stale_serves.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_aggregation(&self) {
        self.aggregations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_aggregation_failure(&self) {
        self.aggregation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidations(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn get_hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn get_misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn get_stale_serves(&self) -> u64 {
        self.stale_serves.load(Ordering::Relaxed)
    }

    pub fn get_coalesced(&self) -> u64 {
        self.coalesced.load(Ordering::Relaxed)
    }

    pub fn get_aggregations(&self) -> u64 {
        self.aggregations.load(Ordering::Relaxed)
    }

    pub fn get_aggregation_failures(&self) -> u64 {
        self.aggregation_failures.load(Ordering::Relaxed)
    }

    pub fn get_evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn get_invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Share of requests answered from the table, stale serves included.
    pub fn calculate_hit_ratio(&self) -> f64 {
        let served = self.get_hits() + self.get_stale_serves();
        let total = served + self.get_misses() + self.get_coalesced();

        if total == 0 {
            0.0
        } else {
            served as f64 / total as f64
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.stale_serves.store(0, Ordering::Relaxed);
        self.coalesced.store(0, Ordering::Relaxed);
        self.aggregations.store(0, Ordering::Relaxed);
        self.aggregation_failures.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}
