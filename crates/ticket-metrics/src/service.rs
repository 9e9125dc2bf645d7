//! Query service facade
//!
//! [`QueryService`] is what the RPC layer calls. It validates the request,
//! canonicalizes it into a [`QueryKey`], and waits on the coordinator for at
//! most the configured request timeout. A timed-out caller gets
//! [`MetricsError::Timeout`]; the recomputation it was waiting on keeps
//! running and installs its result for the next caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::aggregate::Aggregate;
use crate::cache::{CacheCoordinator, CacheStats, Served, ServedFrom};
use crate::config::ServiceConfig;
use crate::error::{MetricsError, MetricsResult};
use crate::key::{Filter, MetricKind, QueryKey, TimeWindow};
use crate::validation::{FieldError, Validate, ValidationResult, ValidationRules, parse_timestamp};

/// A metrics request as it arrives over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsRequest {
    pub metric: String,
    #[serde(default)]
    pub filters: Vec<String>,
    pub start: String,
    pub end: String,
}

impl MetricsRequest {
    pub fn new(
        metric: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        Self {
            metric: metric.into(),
            filters: Vec::new(),
            start: start.into(),
            end: end.into(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }
}

impl Validate for MetricsRequest {
    fn validate(&self) -> ValidationResult {
        let allowed: Vec<&str> = MetricKind::ALL.iter().map(MetricKind::as_str).collect();
        let mut rules = ValidationRules::new().required("metric", &self.metric);
        if !self.metric.trim().is_empty() {
            rules = rules.one_of("metric", self.metric.trim(), &allowed);
        }

        let mut rules = rules
            .required("start", &self.start)
            .required("end", &self.end)
            .timestamp("start", &self.start)
            .timestamp("end", &self.end)
            .date_order("end", &self.start, &self.end);

        for raw in &self.filters {
            if let Err(err) = raw.parse::<Filter>() {
                for error in err.field_errors() {
                    rules = rules.add_error(error.clone());
                }
            }
        }

        rules.build()
    }
}

/// What the facade hands back for a successful query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub metric: MetricKind,
    pub values: BTreeMap<String, f64>,
    pub served_from_cache: bool,
    pub source: ServedFrom,
    /// When the values were computed
    pub as_of: DateTime<Utc>,
    /// The canonical window the values cover
    pub window: TimeWindow,
    pub generation: u64,
}

impl From<Served> for MetricsResponse {
    fn from(served: Served) -> Self {
        Self {
            metric: served.result.metric(),
            values: served.result.values().clone(),
            served_from_cache: served.source.is_cached(),
            source: served.source,
            as_of: served.result.computed_at(),
            window: served.result.window(),
            generation: served.generation,
        }
    }
}

/// Entry point for metric queries.
#[derive(Clone)]
pub struct QueryService {
    coordinator: CacheCoordinator,
    request_timeout: Duration,
}

impl QueryService {
    pub fn new(coordinator: CacheCoordinator, request_timeout: Duration) -> Self {
        Self {
            coordinator,
            request_timeout,
        }
    }

    /// Build a coordinator from `config` around `aggregator`.
    pub fn from_config(config: &ServiceConfig, aggregator: Arc<dyn Aggregate>) -> Self {
        let coordinator = CacheCoordinator::new(config.cache.clone(), aggregator);
        Self::new(coordinator, config.request_timeout)
    }

    pub fn coordinator(&self) -> &CacheCoordinator {
        &self.coordinator
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Validate `request` and turn it into a canonical key.
    pub fn parse(&self, request: &MetricsRequest) -> MetricsResult<QueryKey> {
        request.validate().into_result()?;

        let metric: MetricKind = request.metric.parse()?;
        let filters = request
            .filters
            .iter()
            .map(|raw| raw.parse::<Filter>())
            .collect::<MetricsResult<Vec<_>>>()?;

        let (Some(start), Some(end)) = (parse_timestamp(&request.start), parse_timestamp(&request.end))
        else {
            return Err(MetricsError::from_field_errors(vec![FieldError::custom(
                "start",
                "start and end must be timestamps",
            )]));
        };
        let window = TimeWindow::new(start, end)?;

        QueryKey::canonical(
            metric,
            filters,
            window,
            self.coordinator.config().window_granularity,
        )
    }

    /// Validate and answer a request.
    #[tracing::instrument(skip(self, request), fields(metric = %request.metric))]
    pub async fn query(&self, request: &MetricsRequest) -> MetricsResult<MetricsResponse> {
        let key = match self.parse(request) {
            Ok(key) => key,
            Err(err) => {
                debug!(error = %err, "rejected metrics request");
                return Err(err);
            }
        };
        self.query_key(&key).await
    }

    /// Answer an already canonical key, waiting at most the request timeout.
    pub async fn query_key(&self, key: &QueryKey) -> MetricsResult<MetricsResponse> {
        match tokio::time::timeout(self.request_timeout, self.coordinator.get(key)).await {
            Ok(served) => served.map(MetricsResponse::from),
            Err(_) => {
                warn!(
                    key = %key,
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    "metrics request timed out; recomputation continues"
                );
                Err(MetricsError::Timeout(self.request_timeout))
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        self.coordinator.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregator;
    use crate::error::ErrorCode;
    use crate::model::{Rating, RatingCategory};
    use crate::store::{MemoryStore, StoreAdapter};
    use chrono::TimeZone;

    fn service(config: ServiceConfig) -> (QueryService, MemoryStore) {
        let store = MemoryStore::new();
        store.insert_category(RatingCategory::new(1, "Tone", 1.0));
        store.insert_rating(Rating::new(
            1,
            10,
            1,
            4,
            Utc.with_ymd_and_hms(2025, 7, 1, 9, 30, 0).unwrap(),
        ));
        let aggregator = Aggregator::new(StoreAdapter::new(Arc::new(store.clone())));
        (QueryService::from_config(&config, Arc::new(aggregator)), store)
    }

    fn request() -> MetricsRequest {
        MetricsRequest::new("overall_score", "2025-07-01T00:00:00Z", "2025-07-02T00:00:00Z")
    }

    #[test]
    fn test_validation_collects_every_field_error() {
        let request = MetricsRequest {
            metric: "median".into(),
            filters: vec!["ticket:0".into(), "owner:me".into()],
            start: "".into(),
            end: "yesterday".into(),
        };
        let result = request.validate();
        let fields = result.errors_by_field();
        assert!(fields.contains_key("metric"));
        assert!(fields.contains_key("start"));
        assert!(fields.contains_key("end"));
        assert!(fields.contains_key("ticket"));
        assert!(fields.contains_key("filters"));
    }

    #[test]
    fn test_end_before_start_is_rejected() {
        let request = MetricsRequest::new("ticket_counts", "2025-07-02T00:00:00Z", "2025-07-01T00:00:00Z");
        let result = request.validate();
        assert_eq!(result.errors().len(), 1);
        assert_eq!(result.errors()[0].field, "end");
    }

    #[tokio::test]
    async fn test_equivalent_requests_share_a_key() {
        let (service, _) = service(ServiceConfig::new());
        let first = service
            .parse(
                &MetricsRequest::new("overall_score", "2025-07-01T00:00:10Z", "2025-07-01T00:59:30")
                    .with_filter("category:2")
                    .with_filter("ticket=1"),
            )
            .unwrap();
        let second = service
            .parse(
                &MetricsRequest::new("overall_score", "2025-07-01T00:00:00Z", "2025-07-01T01:00:00Z")
                    .with_filter("TICKET:1")
                    .with_filter("category:2")
                    .with_filter("category:2"),
            )
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unsupported_filter_is_invalid_query() {
        let (service, _) = service(ServiceConfig::new());
        let err = service
            .query(&request().with_filter("status:open"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidQuery);
        assert_eq!(err.field_errors()[0].code, "unsupported_filter");
    }

    #[tokio::test]
    async fn test_second_query_is_served_from_cache() {
        let (service, store) = service(ServiceConfig::new());
        let first = service.query(&request()).await.unwrap();
        assert!(!first.served_from_cache);
        assert_eq!(first.values.get("score"), Some(&80.0));

        let reads = store.reads();
        let second = service.query(&request()).await.unwrap();
        assert!(second.served_from_cache);
        assert_eq!(second.values, first.values);
        assert_eq!(second.as_of, first.as_of);
        assert_eq!(store.reads(), reads);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_recomputation_running() {
        let config = ServiceConfig::new().with_request_timeout(Duration::from_millis(100));
        let (service, store) = service(config);
        store.set_latency(Duration::from_secs(1));

        let err = service.query(&request()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);

        let key = service.parse(&request()).unwrap();
        assert!(service.coordinator().is_in_flight(&key).await);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!service.coordinator().is_in_flight(&key).await);
        let served = service.query(&request()).await.unwrap();
        assert!(served.served_from_cache);
        assert_eq!(service.stats().await.aggregations, 1);
    }

    #[tokio::test]
    async fn test_oversized_granularity_is_invalid_query() {
        use crate::cache::CacheConfig;

        let config = ServiceConfig::new().with_cache(
            CacheConfig::new().with_window_granularity(Duration::from_secs(i64::MAX as u64)),
        );
        let (service, store) = service(config);
        let err = service
            .query(&MetricsRequest::new(
                "ticket_counts",
                "2025-07-01T00:00:00Z",
                "2025-07-02T00:00:00Z",
            ))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidQuery);
        assert_eq!(store.reads(), 0);
    }
}
