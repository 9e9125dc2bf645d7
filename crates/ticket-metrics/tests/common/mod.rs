//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use ticket_metrics::{
    Aggregate, Aggregator, MemoryStore, MetricResult, MetricsResult, QueryKey, Rating,
    RatingCategory, StoreAdapter, Ticket, TimeWindow,
};

/// 2025-07-01T00:00:00Z plus `secs`
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap() + ChronoDuration::seconds(secs)
}

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, d, 0, 0, 0).unwrap()
}

pub fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> TimeWindow {
    TimeWindow::new(start, end).unwrap()
}

/// Two weighted categories, three tickets and a handful of ratings in the
/// first week of July 2025.
pub fn seed(store: &MemoryStore) {
    store.insert_category(RatingCategory::new(1, "Spelling", 1.0));
    store.insert_category(RatingCategory::new(2, "Grammar", 0.5));

    store.insert_ticket(
        Ticket::new(1, "Printer on fire", day(1))
            .with_sla_deadline(day(2))
            .resolved(day(1) + ChronoDuration::hours(4)),
    );
    store.insert_ticket(Ticket::new(2, "Password reset", day(2)).with_sla_deadline(day(3)));
    store.insert_ticket(
        Ticket::new(3, "Invoice question", day(3)).resolved(day(3) + ChronoDuration::hours(2)),
    );

    store.insert_rating(Rating::new(1, 1, 1, 5, day(1) + ChronoDuration::hours(5)));
    store.insert_rating(Rating::new(2, 1, 2, 3, day(1) + ChronoDuration::hours(5)));
    store.insert_rating(Rating::new(3, 3, 1, 4, day(3) + ChronoDuration::hours(3)));
    store.insert_rating(Rating::new(4, 3, 2, 2, day(3) + ChronoDuration::hours(3)));
}

pub fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    seed(&store);
    store
}

/// Store-backed aggregator that counts calls and can be slowed down or made
/// to panic.
pub struct CountingAggregator {
    inner: Aggregator,
    pub calls: AtomicUsize,
    pub panic: AtomicBool,
    delay: Duration,
}

impl CountingAggregator {
    pub fn new(store: &MemoryStore, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: Aggregator::new(StoreAdapter::new(Arc::new(store.clone()))),
            calls: AtomicUsize::new(0),
            panic: AtomicBool::new(false),
            delay,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Aggregate for CountingAggregator {
    async fn compute(&self, key: &QueryKey) -> MetricsResult<MetricResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panic.load(Ordering::SeqCst) {
            panic!("aggregation exploded for {}", key);
        }
        self.inner.compute(key).await
    }
}
