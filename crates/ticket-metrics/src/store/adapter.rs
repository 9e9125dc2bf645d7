use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

use super::{RowQuery, TicketStore, TicketTime};
use crate::error::StoreError;
use crate::key::{MetricKind, QueryKey};
use crate::model::{Rating, Ticket};

/// Rows one metric computation needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricInputs {
    pub tickets: Vec<Ticket>,
    pub ratings: Vec<Rating>,
    /// Ratings of the period before the key's window
    pub previous_ratings: Vec<Rating>,
    pub weights: BTreeMap<u32, f64>,
}

/// Translates query keys into store reads. Holds no cache state.
#[derive(Clone)]
pub struct StoreAdapter {
    store: Arc<dyn TicketStore>,
}

impl StoreAdapter {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.store
    }

    pub async fn load(&self, key: &QueryKey) -> Result<MetricInputs, StoreError> {
        let query = RowQuery::new(key.window())
            .with_tickets(key.ticket_ids())
            .with_categories(key.category_ids())
            .with_statuses(key.statuses());

        trace!(
            key = %key,
            backend = self.store.backend_name(),
            "loading metric inputs"
        );

        let mut inputs = MetricInputs::default();
        match key.metric() {
            MetricKind::TicketCounts | MetricKind::SlaBreach => {
                inputs.tickets = self.store.tickets(&query, TicketTime::Created).await?;
            }
            MetricKind::ResolutionTime => {
                inputs.tickets = self.store.tickets(&query, TicketTime::Resolved).await?;
            }
            MetricKind::OverallScore
            | MetricKind::CategoryScores
            | MetricKind::TicketScore
            | MetricKind::TicketCategoryMatrix => {
                inputs.ratings = self.store.ratings(&query).await?;
                inputs.weights = self.store.category_weights().await?;
            }
            MetricKind::PeriodOverPeriod => {
                inputs.ratings = self.store.ratings(&query).await?;
                inputs.previous_ratings = self
                    .store
                    .ratings(&query.over(key.window().previous()))
                    .await?;
                inputs.weights = self.store.category_weights().await?;
            }
        }
        Ok(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Filter, TimeWindow};
    use crate::model::{RatingCategory, TicketStatus};
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, d, 0, 0, 0).unwrap()
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_category(RatingCategory::new(1, "Tone", 1.0));
        store.insert_ticket(Ticket::new(1, "a", day(2)).resolved(day(3)));
        store.insert_ticket(Ticket::new(2, "b", day(5)).with_status(TicketStatus::Pending));
        store.insert_rating(Rating::new(1, 1, 1, 4, day(2)));
        store.insert_rating(Rating::new(2, 1, 1, 2, day(12)));
        store
    }

    #[tokio::test]
    async fn test_ticket_metrics_read_tickets_only() {
        let adapter = StoreAdapter::new(Arc::new(seeded()));
        let key = QueryKey::new(
            MetricKind::TicketCounts,
            [Filter::Status(TicketStatus::Pending)],
            TimeWindow::new(day(1), day(10)).unwrap(),
        )
        .unwrap();
        let inputs = adapter.load(&key).await.unwrap();
        assert_eq!(inputs.tickets.len(), 1);
        assert_eq!(inputs.tickets[0].id, 2);
        assert!(inputs.ratings.is_empty());
        assert!(inputs.weights.is_empty());
    }

    #[tokio::test]
    async fn test_resolution_reads_by_resolved_time() {
        let adapter = StoreAdapter::new(Arc::new(seeded()));
        let key = QueryKey::new(
            MetricKind::ResolutionTime,
            [],
            TimeWindow::new(day(3), day(4)).unwrap(),
        )
        .unwrap();
        let inputs = adapter.load(&key).await.unwrap();
        assert_eq!(inputs.tickets.len(), 1);
        assert_eq!(inputs.tickets[0].id, 1);
    }

    #[tokio::test]
    async fn test_period_over_period_reads_previous_window() {
        let adapter = StoreAdapter::new(Arc::new(seeded()));
        let key = QueryKey::new(
            MetricKind::PeriodOverPeriod,
            [],
            TimeWindow::new(day(10), day(18)).unwrap(),
        )
        .unwrap();
        let inputs = adapter.load(&key).await.unwrap();
        assert_eq!(inputs.ratings.len(), 1);
        assert_eq!(inputs.ratings[0].id, 2);
        assert_eq!(inputs.previous_ratings.len(), 1);
        assert_eq!(inputs.previous_ratings[0].id, 1);
        assert_eq!(inputs.weights.get(&1), Some(&1.0));
    }

    #[tokio::test]
    async fn test_unavailable_store_propagates() {
        let store = seeded();
        store.set_available(false);
        let adapter = StoreAdapter::new(Arc::new(store));
        let key = QueryKey::new(
            MetricKind::OverallScore,
            [],
            TimeWindow::new(day(1), day(2)).unwrap(),
        )
        .unwrap();
        assert!(matches!(
            adapter.load(&key).await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_matrix_reads_ratings_and_weights() {
        let adapter = StoreAdapter::new(Arc::new(seeded()));
        let key = QueryKey::new(
            MetricKind::TicketCategoryMatrix,
            [Filter::Ticket(1), Filter::Category(1)],
            TimeWindow::new(day(1), day(10)).unwrap(),
        )
        .unwrap();
        let inputs = adapter.load(&key).await.unwrap();
        assert_eq!(inputs.ratings.len(), 1);
        assert_eq!(inputs.ratings[0].id, 1);
        assert_eq!(inputs.weights.get(&1), Some(&1.0));
        assert!(inputs.tickets.is_empty());
    }
}
