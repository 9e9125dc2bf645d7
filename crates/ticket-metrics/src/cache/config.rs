//! Cache configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::key::MetricKind;

/// Default TTL for cache entries (5 minutes)
///
/// Metrics with different freshness needs can override this with
/// `CacheConfig::with_metric_ttl()`.
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Default maximum number of cache entries
///
/// When the limit is reached the least recently used entry without an
/// in-flight recomputation is evicted.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Default granularity query windows are rounded outward to (1 minute)
pub const DEFAULT_WINDOW_GRANULARITY_SECS: u64 = 60;

/// Coarsest allowed window granularity (1 day)
pub const MAX_WINDOW_GRANULARITY_SECS: u64 = 86_400;

/// How precisely a mutation is matched against cached keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationGranularity {
    /// Any key whose window covers the mutation time
    Bucket,
    /// Like `Bucket`, but keys filtered to other tickets or categories survive
    #[default]
    Ticket,
}

/// What happens to a matched entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationMode {
    /// Remove the entry
    #[default]
    Evict,
    /// Keep the entry but never serve it again
    MarkStale,
}

impl InvalidationGranularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bucket => "bucket",
            Self::Ticket => "ticket",
        }
    }
}

impl InvalidationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Evict => "evict",
            Self::MarkStale => "mark_stale",
        }
    }
}

impl fmt::Display for InvalidationGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for InvalidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvalidationGranularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bucket" => Ok(Self::Bucket),
            "ticket" => Ok(Self::Ticket),
            other => Err(format!("unknown invalidation granularity '{}'", other)),
        }
    }
}

impl FromStr for InvalidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "evict" => Ok(Self::Evict),
            "mark_stale" | "stale" => Ok(Self::MarkStale),
            other => Err(format!("unknown invalidation mode '{}'", other)),
        }
    }
}

/// Configuration for the cache coordinator
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Default TTL for cached entries
    pub default_ttl: Duration,
    /// Per-metric TTL overrides
    pub metric_ttl: HashMap<MetricKind, Duration>,
    /// Maximum number of entries in the cache
    pub max_entries: usize,
    /// Whether results are cached at all
    pub enabled: bool,
    /// Serve an expired entry once while its recomputation is in flight
    pub serve_stale_while_refreshing: bool,
    /// Query windows are rounded outward to this step
    pub window_granularity: Duration,
    pub invalidation_granularity: InvalidationGranularity,
    pub invalidation_mode: InvalidationMode,
}

impl CacheConfig {
    /// Create a new cache configuration with defaults
    pub fn new() -> Self {
        Self {
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            metric_ttl: HashMap::new(),
            max_entries: DEFAULT_MAX_ENTRIES,
            enabled: true,
            serve_stale_while_refreshing: true,
            window_granularity: Duration::from_secs(DEFAULT_WINDOW_GRANULARITY_SECS),
            invalidation_granularity: InvalidationGranularity::default(),
            invalidation_mode: InvalidationMode::default(),
        }
    }

    /// Set the default TTL for cached entries
    #[must_use = "This method returns a new CacheConfig and does not modify self"]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set a TTL for a specific metric
    #[must_use = "This method returns a new CacheConfig and does not modify self"]
    pub fn with_metric_ttl(mut self, metric: MetricKind, ttl: Duration) -> Self {
        self.metric_ttl.insert(metric, ttl);
        self
    }

    /// Set the maximum number of entries
    #[must_use = "This method returns a new CacheConfig and does not modify self"]
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Enable or disable caching
    #[must_use = "This method returns a new CacheConfig and does not modify self"]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use = "This method returns a new CacheConfig and does not modify self"]
    pub fn with_serve_stale(mut self, serve_stale: bool) -> Self {
        self.serve_stale_while_refreshing = serve_stale;
        self
    }

    #[must_use = "This method returns a new CacheConfig and does not modify self"]
    pub fn with_window_granularity(mut self, granularity: Duration) -> Self {
        self.window_granularity = granularity;
        self
    }

    #[must_use = "This method returns a new CacheConfig and does not modify self"]
    pub fn with_invalidation_granularity(mut self, granularity: InvalidationGranularity) -> Self {
        self.invalidation_granularity = granularity;
        self
    }

    #[must_use = "This method returns a new CacheConfig and does not modify self"]
    pub fn with_invalidation_mode(mut self, mode: InvalidationMode) -> Self {
        self.invalidation_mode = mode;
        self
    }

    /// Get the TTL for a specific metric
    pub fn get_ttl(&self, metric: MetricKind) -> Duration {
        self.metric_ttl
            .get(&metric)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    /// Capacity actually enforced; never below one.
    pub fn capacity(&self) -> usize {
        self.max_entries.max(1)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new()
    }
}
