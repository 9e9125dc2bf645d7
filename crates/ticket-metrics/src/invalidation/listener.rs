use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::InvalidationSignal;
use crate::cache::{CacheCoordinator, InvalidationGranularity, InvalidationReport};

/// Applies ticket mutations to a coordinator.
#[derive(Clone)]
pub struct InvalidationListener {
    coordinator: CacheCoordinator,
    granularity: InvalidationGranularity,
}

impl InvalidationListener {
    /// Uses the coordinator's configured granularity.
    pub fn new(coordinator: CacheCoordinator) -> Self {
        let granularity = coordinator.config().invalidation_granularity;
        Self {
            coordinator,
            granularity,
        }
    }

    #[must_use]
    pub fn with_granularity(mut self, granularity: InvalidationGranularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Evict or mark stale every cached key the mutation could affect.
    #[tracing::instrument(
        skip(self, signal),
        fields(ticket = signal.ticket_id, kind = %signal.kind)
    )]
    pub async fn on_mutation(&self, signal: &InvalidationSignal) -> InvalidationReport {
        let granularity = self.granularity;
        let report = self
            .coordinator
            .invalidate_where(|key| signal.applies_to(key, granularity))
            .await;
        debug!(
            changed_at = %signal.changed_at,
            affected = report.total(),
            "mutation applied"
        );
        report
    }

    /// Consume signals until every sender is dropped.
    pub fn spawn(self, mut receiver: mpsc::Receiver<InvalidationSignal>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut applied = 0u64;
            while let Some(signal) = receiver.recv().await {
                self.on_mutation(&signal).await;
                applied += 1;
            }
            info!(applied, "invalidation channel closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregate;
    use crate::cache::CacheConfig;
    use crate::error::MetricsResult;
    use crate::invalidation::MutationKind;
    use crate::key::{Filter, MetricKind, QueryKey, TimeWindow};
    use crate::result::MetricResult;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct ZeroAggregator;

    #[async_trait]
    impl Aggregate for ZeroAggregator {
        async fn compute(&self, key: &QueryKey) -> MetricsResult<MetricResult> {
            Ok(MetricResult::new(key.metric(), key.window(), BTreeMap::new()))
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_750_000_000 + secs, 0).unwrap()
    }

    fn score_key(start: i64, end: i64) -> QueryKey {
        QueryKey::new(
            MetricKind::OverallScore,
            [],
            TimeWindow::new(at(start), at(end)).unwrap(),
        )
        .unwrap()
    }

    fn listener() -> (InvalidationListener, CacheCoordinator) {
        let coordinator = CacheCoordinator::new(CacheConfig::new(), Arc::new(ZeroAggregator));
        (InvalidationListener::new(coordinator.clone()), coordinator)
    }

    #[tokio::test]
    async fn test_second_application_is_a_no_op() {
        let (listener, coordinator) = listener();
        coordinator.get(&score_key(0, 10)).await.unwrap();
        coordinator.get(&score_key(20, 30)).await.unwrap();

        let signal = InvalidationSignal::new(1, MutationKind::Rated, at(7));
        let first = listener.on_mutation(&signal).await;
        assert_eq!(first.evicted, 1);
        assert_eq!(coordinator.len().await, 1);

        let second = listener.on_mutation(&signal).await;
        assert!(second.is_empty());
        assert_eq!(coordinator.len().await, 1);
        assert!(coordinator.peek(&score_key(20, 30)).await.is_some());
    }

    #[tokio::test]
    async fn test_spawned_listener_drains_channel() {
        let (listener, coordinator) = listener();
        coordinator.get(&score_key(0, 10)).await.unwrap();

        let (sender, receiver) = mpsc::channel(8);
        let handle = listener.spawn(receiver);
        sender
            .send(InvalidationSignal::new(1, MutationKind::Rated, at(3)))
            .await
            .unwrap();
        drop(sender);
        handle.await.unwrap();

        assert!(coordinator.is_empty().await);
    }

    #[tokio::test]
    async fn test_bucket_granularity_ignores_filters() {
        let (listener, coordinator) = listener();
        let other_ticket = QueryKey::new(
            MetricKind::OverallScore,
            [Filter::Ticket(2)],
            TimeWindow::new(at(0), at(10)).unwrap(),
        )
        .unwrap();
        coordinator.get(&other_ticket).await.unwrap();

        let signal = InvalidationSignal::new(1, MutationKind::Rated, at(5));
        assert!(listener.on_mutation(&signal).await.is_empty());

        let coarse = listener.with_granularity(InvalidationGranularity::Bucket);
        assert_eq!(coarse.on_mutation(&signal).await.evicted, 1);
        assert!(coordinator.is_empty().await);
    }
}
