use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use super::{RowQuery, TicketStore, TicketTime};
use crate::error::StoreError;
use crate::model::{Rating, RatingCategory, Ticket};

/// In-process ticket store.
///
/// Cheap to clone; clones share the same tables. Reads can be made to fail
/// with [`set_available`](Self::set_available) and slowed down with
/// [`set_latency`](Self::set_latency).
#[derive(Clone)]
pub struct MemoryStore {
    tickets: Arc<DashMap<u32, Ticket>>,
    ratings: Arc<DashMap<u32, Rating>>,
    categories: Arc<DashMap<u32, RatingCategory>>,
    available: Arc<AtomicBool>,
    latency_ms: Arc<AtomicU64>,
    reads: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tickets: Arc::new(DashMap::new()),
            ratings: Arc::new(DashMap::new()),
            categories: Arc::new(DashMap::new()),
            available: Arc::new(AtomicBool::new(true)),
            latency_ms: Arc::new(AtomicU64::new(0)),
            reads: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Insert or replace a ticket.
    pub fn insert_ticket(&self, ticket: Ticket) {
        self.tickets.insert(ticket.id, ticket);
    }

    pub fn insert_rating(&self, rating: Rating) {
        self.ratings.insert(rating.id, rating);
    }

    pub fn insert_category(&self, category: RatingCategory) {
        self.categories.insert(category.id, category);
    }

    pub fn remove_ticket(&self, id: u32) -> Option<Ticket> {
        self.tickets.remove(&id).map(|(_, ticket)| ticket)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of reads served or refused so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    async fn begin_read(&self) -> Result<(), StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store is offline".into()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn tickets(&self, query: &RowQuery, time: TicketTime) -> Result<Vec<Ticket>, StoreError> {
        self.begin_read().await?;
        let mut rows: Vec<Ticket> = self
            .tickets
            .iter()
            .filter(|entry| query.matches_ticket(entry.value(), time))
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|t| t.id);
        Ok(rows)
    }

    async fn ratings(&self, query: &RowQuery) -> Result<Vec<Rating>, StoreError> {
        self.begin_read().await?;
        let mut rows: Vec<Rating> = self
            .ratings
            .iter()
            .filter(|entry| query.matches_rating(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn category_weights(&self) -> Result<BTreeMap<u32, f64>, StoreError> {
        self.begin_read().await?;
        Ok(self
            .categories
            .iter()
            .map(|entry| (*entry.key(), entry.value().weight))
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
