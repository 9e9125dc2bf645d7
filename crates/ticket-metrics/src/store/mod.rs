//! Ticket store contract and implementations
//!
//! The engine reads the persistent store only through [`TicketStore`]. Two
//! implementations ship with the crate:
//!
//! - [`SqliteStore`]: file-backed SQLite via `sqlx`, WAL journal mode
//! - [`MemoryStore`]: in-process maps, with an availability switch for tests
//!
//! [`StoreAdapter`] turns a [`QueryKey`](crate::key::QueryKey) into the reads a
//! metric needs.

mod adapter;
mod memory;
mod sqlite;

pub use adapter::{MetricInputs, StoreAdapter};
pub use memory::MemoryStore;
pub use sqlite::{SqliteConfig, SqliteStore};

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::key::TimeWindow;
use crate::model::{Rating, Ticket, TicketStatus};

/// Which ticket timestamp a read is ranged over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketTime {
    Created,
    Resolved,
}

/// A ranged, filtered read.
///
/// Empty id/status lists mean "no restriction".
#[derive(Debug, Clone, PartialEq)]
pub struct RowQuery {
    pub window: TimeWindow,
    pub ticket_ids: Vec<u32>,
    pub category_ids: Vec<u32>,
    pub statuses: Vec<TicketStatus>,
}

impl RowQuery {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            ticket_ids: Vec::new(),
            category_ids: Vec::new(),
            statuses: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tickets(mut self, ids: Vec<u32>) -> Self {
        self.ticket_ids = ids;
        self
    }

    #[must_use]
    pub fn with_categories(mut self, ids: Vec<u32>) -> Self {
        self.category_ids = ids;
        self
    }

    #[must_use]
    pub fn with_statuses(mut self, statuses: Vec<TicketStatus>) -> Self {
        self.statuses = statuses;
        self
    }

    /// Same filters over a different window.
    #[must_use]
    pub fn over(&self, window: TimeWindow) -> Self {
        Self {
            window,
            ..self.clone()
        }
    }

    pub fn matches_ticket(&self, ticket: &Ticket, time: TicketTime) -> bool {
        let at = match time {
            TicketTime::Created => Some(ticket.created_at),
            TicketTime::Resolved => ticket.resolved_at,
        };
        at.is_some_and(|at| self.window.contains(at))
            && (self.ticket_ids.is_empty() || self.ticket_ids.contains(&ticket.id))
            && (self.statuses.is_empty() || self.statuses.contains(&ticket.status))
    }

    pub fn matches_rating(&self, rating: &Rating) -> bool {
        self.window.contains(rating.created_at)
            && (self.ticket_ids.is_empty() || self.ticket_ids.contains(&rating.ticket_id))
            && (self.category_ids.is_empty() || self.category_ids.contains(&rating.category_id))
    }
}

/// Read contract for the persistent ticket store.
///
/// Implementations return rows ordered by id and fail only with
/// [`StoreError`].
#[async_trait]
pub trait TicketStore: Send + Sync + 'static {
    /// Tickets whose `time` timestamp falls inside the query window.
    async fn tickets(&self, query: &RowQuery, time: TicketTime) -> Result<Vec<Ticket>, StoreError>;

    /// Ratings created inside the query window.
    async fn ratings(&self, query: &RowQuery) -> Result<Vec<Rating>, StoreError>;

    /// Category id to weight.
    async fn category_weights(&self) -> Result<BTreeMap<u32, f64>, StoreError>;

    /// Short name used in logs.
    fn backend_name(&self) -> &'static str;
}
