//! Cache entries

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::result::MetricResult;

/// An installed result with freshness metadata.
///
/// Entries are never mutated: recomputation installs a new entry with a higher
/// generation, and invalidation either removes the entry or swaps in a
/// stale-marked copy.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    result: Arc<MetricResult>,
    refreshed_at: Instant,
    ttl: Duration,
    generation: u64,
    marked_stale: bool,
}

impl CacheEntry {
    pub fn new(result: Arc<MetricResult>, ttl: Duration, generation: u64) -> Self {
        Self {
            result,
            refreshed_at: Instant::now(),
            ttl,
            generation,
            marked_stale: false,
        }
    }

    pub fn result(&self) -> &Arc<MetricResult> {
        &self.result
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn refreshed_at(&self) -> Instant {
        self.refreshed_at
    }

    /// Check if the entry has outlived its TTL
    pub fn is_expired(&self) -> bool {
        self.refreshed_at.elapsed() >= self.ttl
    }

    pub fn is_marked_stale(&self) -> bool {
        self.marked_stale
    }

    /// Servable without recomputation.
    pub fn is_fresh(&self) -> bool {
        !self.marked_stale && !self.is_expired()
    }

    /// Get the remaining TTL
    pub fn remaining_ttl(&self) -> Duration {
        if self.marked_stale {
            return Duration::ZERO;
        }
        self.ttl.saturating_sub(self.refreshed_at.elapsed())
    }

    /// A copy of this entry that will not be served again.
    #[must_use]
    pub fn marked_stale(&self) -> Self {
        Self {
            marked_stale: true,
            ..self.clone()
        }
    }
}
