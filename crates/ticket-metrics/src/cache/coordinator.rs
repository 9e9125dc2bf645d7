//! Cache coordinator
//!
//! Maps query keys to cached results, decides hit/miss/stale, and makes sure
//! at most one recomputation per key is in flight. The entry table and the
//! claim registry share one lock, so a lookup either sees a fresh entry, joins
//! the existing claim, or registers a new one; there is no window in between.

use futures::FutureExt;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{Instrument, debug, error, trace, warn};

use super::claim::Claim;
use super::config::{CacheConfig, InvalidationMode};
use super::entry::CacheEntry;
use super::metrics::CacheMetrics;
use crate::aggregate::Aggregate;
use crate::error::{MetricsError, MetricsResult};
use crate::key::QueryKey;
use crate::result::MetricResult;

/// Where a served result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServedFrom {
    /// A fresh cached entry
    Fresh,
    /// An expired entry, served once while its recomputation runs
    Stale,
    /// This caller's own recomputation
    Computed,
    /// A recomputation started by another caller
    Coalesced,
}

impl ServedFrom {
    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Fresh | Self::Stale)
    }
}

/// A result handed back by [`CacheCoordinator::get`].
#[derive(Debug, Clone)]
pub struct Served {
    pub result: Arc<MetricResult>,
    pub source: ServedFrom,
    pub generation: u64,
}

impl Served {
    fn new(entry: &CacheEntry, source: ServedFrom) -> Self {
        Self {
            result: Arc::clone(entry.result()),
            source,
            generation: entry.generation(),
        }
    }
}

/// What an invalidation pass touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationReport {
    pub evicted: usize,
    pub marked_stale: usize,
    /// In-flight claims whose result will be installed already stale
    pub claims_flagged: usize,
}

impl InvalidationReport {
    pub fn total(&self) -> usize {
        self.evicted + self.marked_stale + self.claims_flagged
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    /// Entries that are expired or marked stale
    pub stale_entries: usize,
    pub max_entries: usize,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub stale_serves: u64,
    pub coalesced: u64,
    pub aggregations: u64,
    pub aggregation_failures: u64,
    pub hit_ratio: f64,
    pub evictions: u64,
    pub invalidations: u64,
}

struct Table {
    entries: LruCache<QueryKey, Arc<CacheEntry>>,
    claims: HashMap<QueryKey, Claim>,
}

/// Shared handle to the entry table, claim registry and aggregator.
///
/// Cloning is cheap; clones operate on the same table.
#[derive(Clone)]
pub struct CacheCoordinator {
    config: Arc<CacheConfig>,
    aggregator: Arc<dyn Aggregate>,
    table: Arc<RwLock<Table>>,
    metrics: Arc<CacheMetrics>,
    generations: Arc<AtomicU64>,
    claim_ids: Arc<AtomicU64>,
}

impl CacheCoordinator {
    pub fn new(config: CacheConfig, aggregator: Arc<dyn Aggregate>) -> Self {
        Self {
            config: Arc::new(config),
            aggregator,
            // Capacity is enforced by `enforce_capacity`, which skips claimed keys.
            table: Arc::new(RwLock::new(Table {
                entries: LruCache::unbounded(),
                claims: HashMap::new(),
            })),
            metrics: Arc::new(CacheMetrics::new()),
            generations: Arc::new(AtomicU64::new(0)),
            claim_ids: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Serve `key` from the table, or recompute it.
    ///
    /// Concurrent callers for the same key share one aggregation. Dropping the
    /// returned future never cancels that aggregation.
    #[tracing::instrument(skip(self), fields(key = %key, enabled = %self.config.enabled))]
    pub async fn get(&self, key: &QueryKey) -> MetricsResult<Served> {
        let (completion, source) = {
            let mut guard = self.table.write().await;
            let table = &mut *guard;

            let current = table.entries.get(key).cloned();
            if let Some(entry) = &current
                && entry.is_fresh()
            {
                debug!("cache hit");
                trace!(
                    generation = entry.generation(),
                    remaining_ms = entry.remaining_ttl().as_millis() as u64,
                    "serving cached entry"
                );
                self.metrics.record_hit();
                return Ok(Served::new(entry, ServedFrom::Fresh));
            }

            if let Some(claim) = table.claims.get_mut(key) {
                if self.config.serve_stale_while_refreshing
                    && let Some(entry) = current.as_ref().filter(|e| !e.is_marked_stale())
                    && claim.take_stale_serve()
                {
                    debug!(claim = claim.id(), "serving stale entry during recomputation");
                    self.metrics.record_stale_serve();
                    return Ok(Served::new(entry, ServedFrom::Stale));
                }
                debug!(
                    claim = claim.id(),
                    age_ms = claim.age().as_millis() as u64,
                    "joining in-flight recomputation"
                );
                self.metrics.record_coalesced();
                (claim.completion(), ServedFrom::Coalesced)
            } else {
                debug!(stale = current.is_some(), "cache miss");
                self.metrics.record_miss();
                let claim = self.spawn_claim(key.clone(), current.map(|e| e.generation()));
                let completion = claim.completion();
                table.claims.insert(key.clone(), claim);
                (completion, ServedFrom::Computed)
            }
        };

        let entry = completion.await?;
        Ok(Served::new(&entry, source))
    }

    fn spawn_claim(&self, key: QueryKey, base_generation: Option<u64>) -> Claim {
        let id = self.claim_ids.fetch_add(1, Ordering::Relaxed) + 1;
        let coordinator = self.clone();

        let task = async move {
            let aggregator = Arc::clone(&coordinator.aggregator);
            let compute_key = key.clone();
            let computation = tokio::spawn(
                async move { aggregator.compute(&compute_key).await }.in_current_span(),
            );
            let outcome = match computation.await {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    error!(error = %join_error, "aggregation task did not complete");
                    Err(MetricsError::internal(format!(
                        "aggregation for {} did not complete: {}",
                        key, join_error
                    )))
                }
            };
            coordinator.complete_claim(&key, id, outcome).await
        };

        let completion = tokio::spawn(task.in_current_span())
            .map(|joined| {
                joined.unwrap_or_else(|join_error| {
                    Err(MetricsError::internal(format!(
                        "recomputation task did not complete: {}",
                        join_error
                    )))
                })
            })
            .boxed()
            .shared();

        trace!(claim = id, ?base_generation, "claim registered");
        Claim::new(id, base_generation, completion)
    }

    /// Release the claim and, on success, install the new entry.
    async fn complete_claim(
        &self,
        key: &QueryKey,
        claim_id: u64,
        outcome: MetricsResult<MetricResult>,
    ) -> MetricsResult<Arc<CacheEntry>> {
        let mut guard = self.table.write().await;
        let table = &mut *guard;

        let claim = match table.claims.remove(key) {
            Some(claim) if claim.id() == claim_id => claim,
            other => {
                let found = other.as_ref().map(Claim::id);
                if let Some(claim) = other {
                    table.claims.insert(key.clone(), claim);
                }
                error!(
                    key = %key,
                    claim = claim_id,
                    registered = ?found,
                    "completing claim is not the registered claim"
                );
                return Err(MetricsError::internal(format!(
                    "claim {} for {} is not registered",
                    claim_id, key
                )));
            }
        };

        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                self.metrics.record_aggregation_failure();
                warn!(key = %key, code = %err.code(), error = %err, "aggregation failed");
                return Err(err);
            }
        };
        self.metrics.record_aggregation();

        let installed = table.entries.peek(key).map(|e| e.generation());
        if installed.is_some() && installed != claim.base_generation() {
            table.entries.pop(key);
            error!(
                key = %key,
                claim = claim_id,
                installed = ?installed,
                expected = ?claim.base_generation(),
                "entry changed under an in-flight claim"
            );
            return Err(MetricsError::internal(format!(
                "entry for {} changed while claim {} was in flight",
                key, claim_id
            )));
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let ttl = self.config.get_ttl(key.metric());
        let mut entry = CacheEntry::new(Arc::new(result), ttl, generation);
        if claim.is_invalidated() {
            debug!(key = %key, "installing result invalidated during recomputation as stale");
            entry = entry.marked_stale();
        }
        let entry = Arc::new(entry);

        if self.config.enabled {
            table.entries.put(key.clone(), Arc::clone(&entry));
            trace!(generation, ttl_ms = ttl.as_millis() as u64, "cache entry installed");
            self.enforce_capacity(table);
        }
        Ok(entry)
    }

    fn enforce_capacity(&self, table: &mut Table) {
        let capacity = self.config.capacity();
        while table.entries.len() > capacity {
            let victim = table
                .entries
                .iter()
                .rev()
                .map(|(key, _)| key)
                .find(|key| !table.claims.contains_key(*key))
                .cloned();

            let Some(victim) = victim else {
                warn!(
                    entries = table.entries.len(),
                    capacity, "every entry over capacity has a live claim"
                );
                break;
            };
            table.entries.pop(&victim);
            self.metrics.record_eviction();
            debug!("LRU eviction occurred");
        }
    }

    /// Evict or mark stale every entry whose key satisfies `matches`, and flag
    /// matching in-flight claims. Applying the same predicate twice has the
    /// same effect as applying it once.
    #[tracing::instrument(skip(self, matches), fields(mode = %self.config.invalidation_mode))]
    pub async fn invalidate_where<F>(&self, matches: F) -> InvalidationReport
    where
        F: Fn(&QueryKey) -> bool,
    {
        let mode = self.config.invalidation_mode;
        let mut guard = self.table.write().await;
        let table = &mut *guard;
        let mut report = InvalidationReport::default();

        let targets: Vec<QueryKey> = table
            .entries
            .iter()
            .filter(|(key, entry)| {
                (mode == InvalidationMode::Evict || !entry.is_marked_stale()) && matches(*key)
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in targets {
            match mode {
                InvalidationMode::Evict => {
                    table.entries.pop(&key);
                    report.evicted += 1;
                }
                InvalidationMode::MarkStale => {
                    if let Some(slot) = table.entries.peek_mut(&key) {
                        *slot = Arc::new(slot.marked_stale());
                        report.marked_stale += 1;
                    }
                }
            }
        }

        for (key, claim) in table.claims.iter_mut() {
            if matches(key) && claim.invalidate() {
                report.claims_flagged += 1;
            }
        }

        if report.is_empty() {
            trace!("no cached keys matched");
        } else {
            debug!(
                evicted = report.evicted,
                marked_stale = report.marked_stale,
                claims_flagged = report.claims_flagged,
                "cache entries invalidated"
            );
            self.metrics.record_invalidations(report.total() as u64);
        }
        report
    }

    /// Invalidate a single key
    pub async fn invalidate(&self, key: &QueryKey) -> InvalidationReport {
        self.invalidate_where(|candidate| candidate == key).await
    }

    /// Drop every entry and flag every in-flight claim
    #[tracing::instrument(skip(self))]
    pub async fn invalidate_all(&self) -> InvalidationReport {
        let mut guard = self.table.write().await;
        let table = &mut *guard;

        let mut report = InvalidationReport {
            evicted: table.entries.len(),
            ..Default::default()
        };
        table.entries.clear();
        for claim in table.claims.values_mut() {
            if claim.invalidate() {
                report.claims_flagged += 1;
            }
        }

        if report.is_empty() {
            trace!("cache was already empty");
        } else {
            debug!(count = report.total(), "all cache entries invalidated");
            self.metrics.record_invalidations(report.total() as u64);
        }
        report
    }

    /// Remove entries that can no longer be served and return how many were
    /// removed. Entries whose key is being recomputed are kept.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup_expired(&self) -> usize {
        let mut guard = self.table.write().await;
        let table = &mut *guard;

        let expired: Vec<QueryKey> = table
            .entries
            .iter()
            .filter(|(key, entry)| !entry.is_fresh() && !table.claims.contains_key(*key))
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired.len();
        for key in expired {
            table.entries.pop(&key);
        }

        if count > 0 {
            debug!(removed = %count, "expired entries cleaned up");
        } else {
            trace!("no expired entries to clean up");
        }
        count
    }

    /// Start a background task that calls [`cleanup_expired`](Self::cleanup_expired)
    /// every `interval`.
    ///
    /// The task runs until its handle is aborted; dropping the handle does not
    /// stop it.
    pub fn start_cleanup_task(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);

            loop {
                interval_timer.tick().await;

                let removed = coordinator.cleanup_expired().await;

                if removed > 0 {
                    tracing::info!(
                        removed = %removed,
                        interval_ms = %interval.as_millis(),
                        "background cleanup completed"
                    );
                }
            }
        })
    }

    /// The entry for `key` without touching recency.
    pub async fn peek(&self, key: &QueryKey) -> Option<Arc<CacheEntry>> {
        self.table.read().await.entries.peek(key).cloned()
    }

    pub async fn is_in_flight(&self, key: &QueryKey) -> bool {
        self.table.read().await.claims.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let table = self.table.read().await;
        let stale = table.entries.iter().filter(|(_, e)| !e.is_fresh()).count();

        CacheStats {
            total_entries: table.entries.len(),
            stale_entries: stale,
            max_entries: self.config.max_entries,
            in_flight: table.claims.len(),
            hits: self.metrics.get_hits(),
            misses: self.metrics.get_misses(),
            stale_serves: self.metrics.get_stale_serves(),
            coalesced: self.metrics.get_coalesced(),
            aggregations: self.metrics.get_aggregations(),
            aggregation_failures: self.metrics.get_aggregation_failures(),
            hit_ratio: self.metrics.calculate_hit_ratio(),
            evictions: self.metrics.get_evictions(),
            invalidations: self.metrics.get_invalidations(),
        }
    }

    /// Reset the counters reported by [`stats`](Self::stats)
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }
}

#[cfg(test)]
mod test_constants {
    use std::time::Duration;

    /// TTL used by expiry tests
    pub const SHORT_TTL: Duration = Duration::from_secs(10);

    /// How long the test aggregator takes per call
    pub const AGGREGATION_DELAY: Duration = Duration::from_millis(50);
}
