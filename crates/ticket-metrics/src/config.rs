//! Service configuration
//!
//! [`ServiceConfig`] bundles the cache policy with the facade and store
//! settings. Values come from defaults, then `TICKET_METRICS_*` environment
//! variables, then whatever the caller overrides with the `with_*` builders.
//!
//! # Example
//! ```rust,ignore
//! use ticket_metrics::{CacheConfig, ServiceConfig};
//! use std::time::Duration;
//!
//! let config = ServiceConfig::from_env()
//!     .with_request_timeout(Duration::from_secs(2))
//!     .with_cache(CacheConfig::new().with_max_entries(500));
//! config.validate()?;
//! ```

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::cache::{
    CacheConfig, InvalidationGranularity, InvalidationMode, MAX_WINDOW_GRANULARITY_SECS,
};

/// Prefix shared by every environment variable read by [`ServiceConfig::from_env`].
pub const ENV_PREFIX: &str = "TICKET_METRICS_";

/// Default facade timeout (5 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default interval of the background expired-entry sweep (1 minute)
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigValidationError {
    /// request_timeout must be greater than 0
    InvalidRequestTimeout,
    /// cache.default_ttl must be greater than 0
    InvalidTtl,
    /// cache.max_entries must be greater than 0
    InvalidMaxEntries,
    /// cache.window_granularity must be at least one second
    InvalidWindowGranularity,
    /// cache.window_granularity must be at most one day
    WindowGranularityTooLarge,
    /// max_connections must be greater than 0
    InvalidMaxConnections,
    /// cleanup_interval must be greater than 0
    InvalidCleanupInterval,
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequestTimeout => write!(f, "request_timeout must be greater than 0"),
            Self::InvalidTtl => write!(f, "cache.default_ttl must be greater than 0"),
            Self::InvalidMaxEntries => write!(f, "cache.max_entries must be greater than 0"),
            Self::InvalidWindowGranularity => {
                write!(f, "cache.window_granularity must be at least one second")
            }
            Self::WindowGranularityTooLarge => {
                write!(f, "cache.window_granularity must be at most one day")
            }
            Self::InvalidMaxConnections => write!(f, "max_connections must be greater than 0"),
            Self::InvalidCleanupInterval => write!(f, "cleanup_interval must be greater than 0"),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Top-level configuration for the metrics service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub cache: CacheConfig,
    /// Longest a caller waits for a result
    pub request_timeout: Duration,
    /// SQLite file; `None` keeps the store in memory
    pub database_path: Option<PathBuf>,
    pub max_connections: u32,
    pub cleanup_interval: Duration,
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self {
            cache: CacheConfig::new(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            database_path: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
        }
    }

    /// Defaults overlaid with `TICKET_METRICS_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let mut config = Self::new();

        if let Some(secs) = env.parsed::<u64>("CACHE_TTL_SECS") {
            config.cache.default_ttl = Duration::from_secs(secs);
        }
        if let Some(max) = env.parsed::<usize>("CACHE_MAX_ENTRIES") {
            config.cache.max_entries = max;
        }
        if let Some(enabled) = env.bool("CACHE_ENABLED") {
            config.cache.enabled = enabled;
        }
        if let Some(serve_stale) = env.bool("SERVE_STALE") {
            config.cache.serve_stale_while_refreshing = serve_stale;
        }
        if let Some(secs) = env.parsed::<u64>("WINDOW_GRANULARITY_SECS") {
            config.cache.window_granularity = Duration::from_secs(secs);
        }
        if let Some(granularity) = env.parsed::<InvalidationGranularity>("INVALIDATION_GRANULARITY")
        {
            config.cache.invalidation_granularity = granularity;
        }
        if let Some(mode) = env.parsed::<InvalidationMode>("INVALIDATION_MODE") {
            config.cache.invalidation_mode = mode;
        }
        if let Some(ms) = env.parsed::<u64>("REQUEST_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(path) = env.value("DATABASE_PATH") {
            config.database_path = Some(PathBuf::from(path));
        }
        if let Some(max) = env.parsed::<u32>("MAX_CONNECTIONS") {
            config.max_connections = max;
        }
        if let Some(secs) = env.parsed::<u64>("CLEANUP_INTERVAL_SECS") {
            config.cleanup_interval = Duration::from_secs(secs);
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigValidationError::InvalidRequestTimeout);
        }
        if self.cache.default_ttl.is_zero() {
            return Err(ConfigValidationError::InvalidTtl);
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigValidationError::InvalidMaxEntries);
        }
        if self.cache.window_granularity < Duration::from_secs(1) {
            return Err(ConfigValidationError::InvalidWindowGranularity);
        }
        if self.cache.window_granularity > Duration::from_secs(MAX_WINDOW_GRANULARITY_SECS) {
            return Err(ConfigValidationError::WindowGranularityTooLarge);
        }
        if self.max_connections == 0 {
            return Err(ConfigValidationError::InvalidMaxConnections);
        }
        if self.cleanup_interval.is_zero() {
            return Err(ConfigValidationError::InvalidCleanupInterval);
        }
        Ok(())
    }

    #[must_use = "This method returns a new ServiceConfig and does not modify self"]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    #[must_use = "This method returns a new ServiceConfig and does not modify self"]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use = "This method returns a new ServiceConfig and does not modify self"]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    #[must_use = "This method returns a new ServiceConfig and does not modify self"]
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    #[must_use = "This method returns a new ServiceConfig and does not modify self"]
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn value(&self, name: &str) -> Option<String> {
        (self.lookup)(&format!("{}{}", ENV_PREFIX, name))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str) -> Option<T>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        let raw = self.value(name)?;
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(variable = %format!("{}{}", ENV_PREFIX, name), value = %raw, error = %e, "ignoring invalid environment value");
                None
            }
        }
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let raw = self.value(name)?;
        match raw.to_lowercase().as_str() {
            "1" | "true" | "t" | "yes" | "y" | "on" => Some(true),
            "0" | "false" | "f" | "no" | "n" | "off" => Some(false),
            _ => {
                warn!(variable = %format!("{}{}", ENV_PREFIX, name), value = %raw, "ignoring invalid boolean");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (format!("{}{}", ENV_PREFIX, k), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.database_path, None);
    }

    #[test]
    fn test_from_lookup_reads_every_variable() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("CACHE_TTL_SECS", "30"),
            ("CACHE_MAX_ENTRIES", "64"),
            ("CACHE_ENABLED", "no"),
            ("SERVE_STALE", "false"),
            ("WINDOW_GRANULARITY_SECS", "300"),
            ("INVALIDATION_GRANULARITY", "bucket"),
            ("INVALIDATION_MODE", "mark_stale"),
            ("REQUEST_TIMEOUT_MS", "750"),
            ("DATABASE_PATH", "/tmp/tickets.db"),
            ("MAX_CONNECTIONS", "2"),
            ("CLEANUP_INTERVAL_SECS", "15"),
        ]));

        assert_eq!(config.cache.default_ttl, Duration::from_secs(30));
        assert_eq!(config.cache.max_entries, 64);
        assert!(!config.cache.enabled);
        assert!(!config.cache.serve_stale_while_refreshing);
        assert_eq!(config.cache.window_granularity, Duration::from_secs(300));
        assert_eq!(
            config.cache.invalidation_granularity,
            InvalidationGranularity::Bucket
        );
        assert_eq!(config.cache.invalidation_mode, InvalidationMode::MarkStale);
        assert_eq!(config.request_timeout, Duration::from_millis(750));
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/tickets.db")));
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.cleanup_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("CACHE_TTL_SECS", "soon"),
            ("CACHE_ENABLED", "maybe"),
            ("INVALIDATION_MODE", "shred"),
            ("DATABASE_PATH", "   "),
        ]));
        assert_eq!(config.cache.default_ttl, Duration::from_secs(300));
        assert!(config.cache.enabled);
        assert_eq!(config.cache.invalidation_mode, InvalidationMode::Evict);
        assert_eq!(config.database_path, None);
    }

    #[test]
    fn test_validate() {
        let zero_timeout = ServiceConfig::new().with_request_timeout(Duration::ZERO);
        assert_eq!(
            zero_timeout.validate(),
            Err(ConfigValidationError::InvalidRequestTimeout)
        );

        let fine_grained = ServiceConfig::new().with_cache(
            CacheConfig::new().with_window_granularity(Duration::from_millis(100)),
        );
        assert_eq!(
            fine_grained.validate(),
            Err(ConfigValidationError::InvalidWindowGranularity)
        );

        let coarse = ServiceConfig::new().with_cache(
            CacheConfig::new().with_window_granularity(Duration::from_secs(i64::MAX as u64)),
        );
        assert_eq!(
            coarse.validate(),
            Err(ConfigValidationError::WindowGranularityTooLarge)
        );
        let one_day = ServiceConfig::new().with_cache(
            CacheConfig::new().with_window_granularity(Duration::from_secs(86_400)),
        );
        assert!(one_day.validate().is_ok());

        let no_room = ServiceConfig::new().with_cache(CacheConfig::new().with_max_entries(0));
        assert_eq!(no_room.validate(), Err(ConfigValidationError::InvalidMaxEntries));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ConfigValidationError::InvalidMaxConnections.to_string(),
            "max_connections must be greater than 0"
        );
    }
}
