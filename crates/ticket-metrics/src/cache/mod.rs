//! Result caching with single-flight recomputation
//!
//! The [`CacheCoordinator`] owns the entry table and the claim registry. A
//! lookup for a key is either a hit, a join on the key's in-flight
//! recomputation, or the start of a new one.
//!
//! # Example
//!
//! ```rust,ignore
//! use ticket_metrics::cache::{CacheConfig, CacheCoordinator};
//! use std::time::Duration;
//!
//! let config = CacheConfig::new()
//!     .with_default_ttl(Duration::from_secs(300))
//!     .with_max_entries(1000)
//!     .with_metric_ttl(MetricKind::SlaBreach, Duration::from_secs(30));
//!
//! let coordinator = CacheCoordinator::new(config, Arc::new(aggregator));
//! let served = coordinator.get(&key).await?;
//! ```
//!
//! # Tracing
//!
//! - **Debug level**: hits, misses, stale serves, coalesced waits,
//!   invalidations and evictions
//! - **Trace level**: generations, remaining TTLs and claim registration
//! - **Warn/Error level**: aggregation failures and registry inconsistencies

mod claim;
mod config;
mod coordinator;
mod entry;
mod metrics;

pub use config::{
    CacheConfig, DEFAULT_MAX_ENTRIES, DEFAULT_TTL_SECS, DEFAULT_WINDOW_GRANULARITY_SECS,
    InvalidationGranularity, InvalidationMode, MAX_WINDOW_GRANULARITY_SECS,
};
pub use coordinator::{CacheCoordinator, CacheStats, InvalidationReport, Served, ServedFrom};
pub use entry::CacheEntry;
pub use metrics::CacheMetrics;
