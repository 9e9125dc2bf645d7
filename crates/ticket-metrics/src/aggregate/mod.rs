//! Metric aggregation
//!
//! The [`Aggregate`] trait is the seam between the cache coordinator and the
//! computation. [`Aggregator`] is the store-backed implementation: it loads
//! rows through a [`StoreAdapter`] and folds them with the pure functions in
//! [`score`] and [`tickets`]. It never touches cache state.

pub mod bucket;
pub mod score;
pub mod tickets;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{MetricsError, MetricsResult};
use crate::key::{MetricKind, QueryKey};
use crate::result::MetricResult;
use crate::store::{MetricInputs, StoreAdapter};

/// Computes a [`MetricResult`] for a query key.
#[async_trait]
pub trait Aggregate: Send + Sync + 'static {
    async fn compute(&self, key: &QueryKey) -> MetricsResult<MetricResult>;
}

/// Store-backed aggregator.
#[derive(Clone)]
pub struct Aggregator {
    adapter: StoreAdapter,
}

impl Aggregator {
    pub fn new(adapter: StoreAdapter) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &StoreAdapter {
        &self.adapter
    }

    /// Fold loaded rows into values for `key`.
    pub fn fold(key: &QueryKey, inputs: &MetricInputs) -> MetricsResult<MetricResult> {
        let window = key.window();
        let values = match key.metric() {
            MetricKind::TicketCounts => tickets::ticket_counts(&inputs.tickets),
            MetricKind::ResolutionTime => tickets::resolution_time(&inputs.tickets),
            MetricKind::SlaBreach => tickets::sla_breach(&inputs.tickets, &window),
            MetricKind::OverallScore => score::overall_score(&inputs.ratings, &inputs.weights),
            MetricKind::CategoryScores => score::category_scores(&inputs.ratings, &window),
            MetricKind::TicketScore => {
                if key.ticket_ids().len() != 1 {
                    return Err(MetricsError::invalid_query(
                        "ticket_score requires exactly one ticket filter",
                    ));
                }
                score::ticket_score(&inputs.ratings, &inputs.weights)
            }
            MetricKind::PeriodOverPeriod => score::period_over_period(
                &inputs.ratings,
                &inputs.previous_ratings,
                &inputs.weights,
            ),
            MetricKind::TicketCategoryMatrix => {
                score::ticket_category_matrix(&inputs.ratings, &inputs.weights)
            }
        };
        Ok(MetricResult::new(key.metric(), window, values))
    }
}

#[async_trait]
impl Aggregate for Aggregator {
    #[tracing::instrument(skip(self), fields(key = %key))]
    async fn compute(&self, key: &QueryKey) -> MetricsResult<MetricResult> {
        let inputs = self.adapter.load(key).await.map_err(|e| {
            warn!(error = %e, "store read failed");
            MetricsError::from(e)
        })?;
        debug!(
            tickets = inputs.tickets.len(),
            ratings = inputs.ratings.len(),
            "aggregating"
        );
        Self::fold(key, &inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::key::{Filter, TimeWindow};
    use crate::model::{Rating, RatingCategory, Ticket};
    use crate::store::MemoryStore;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, d, 0, 0, 0).unwrap()
    }

    fn aggregator(store: &MemoryStore) -> Aggregator {
        Aggregator::new(StoreAdapter::new(Arc::new(store.clone())))
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_category(RatingCategory::new(1, "Tone", 1.0));
        store.insert_category(RatingCategory::new(2, "Grammar", 0.5));
        store.insert_ticket(Ticket::new(1, "a", day(2)).resolved(day(3)));
        store.insert_rating(Rating::new(1, 1, 1, 4, day(2)));
        store.insert_rating(Rating::new(2, 1, 2, 2, day(2)));
        store
    }

    #[tokio::test]
    async fn test_every_metric_is_zero_over_an_empty_window() {
        let store = seeded();
        let aggregator = aggregator(&store);
        let empty = TimeWindow::new(day(20), day(21)).unwrap();

        for metric in MetricKind::ALL {
            let filters = if metric == MetricKind::TicketScore {
                vec![Filter::Ticket(1)]
            } else {
                Vec::new()
            };
            let key = QueryKey::new(metric, filters, empty).unwrap();
            let result = aggregator.compute(&key).await.unwrap();
            assert!(result.is_zero(), "{metric} was not zero: {:?}", result.values());
        }
    }

    #[tokio::test]
    async fn test_identical_data_gives_identical_values() {
        let store = seeded();
        let key = QueryKey::new(
            MetricKind::CategoryScores,
            [],
            TimeWindow::new(day(1), day(5)).unwrap(),
        )
        .unwrap();
        let first = aggregator(&store).compute(&key).await.unwrap();
        let second = aggregator(&store).compute(&key).await.unwrap();
        assert_eq!(first.values(), second.values());
    }

    #[tokio::test]
    async fn test_overall_score() {
        let store = seeded();
        let key = QueryKey::new(
            MetricKind::OverallScore,
            [],
            TimeWindow::new(day(1), day(5)).unwrap(),
        )
        .unwrap();
        let result = aggregator(&store).compute(&key).await.unwrap();
        assert_eq!(result.value("score"), Some(66.67));
        assert_eq!(result.value("ratings"), Some(2.0));
    }

    #[tokio::test]
    async fn test_store_failure_is_store_unavailable() {
        let store = seeded();
        store.set_available(false);
        let key = QueryKey::new(
            MetricKind::TicketCounts,
            [],
            TimeWindow::new(day(1), day(5)).unwrap(),
        )
        .unwrap();
        let err = aggregator(&store).compute(&key).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::StoreUnavailable);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_ticket_category_matrix() {
        let store = seeded();
        let key = QueryKey::new(
            MetricKind::TicketCategoryMatrix,
            [],
            TimeWindow::new(day(1), day(5)).unwrap(),
        )
        .unwrap();
        let result = aggregator(&store).compute(&key).await.unwrap();
        assert_eq!(result.value("ticket.1.category.1"), Some(80.0));
        assert_eq!(result.value("ticket.1.category.2"), Some(40.0));
        assert_eq!(result.value("tickets"), Some(1.0));

        let empty = QueryKey::new(
            MetricKind::TicketCategoryMatrix,
            [Filter::Ticket(1)],
            TimeWindow::new(day(20), day(21)).unwrap(),
        )
        .unwrap();
        assert!(aggregator(&store).compute(&empty).await.unwrap().is_zero());
    }
}
