//! # Ticket metrics
//!
//! Aggregate metrics over support-ticket data with an in-process cache that
//! stays coherent under concurrent reads and ticket mutations.
//!
//! ## Overview
//!
//! ```text
//! RPC ──▶ QueryService ──▶ CacheCoordinator ──(miss/stale)──▶ Aggregator ──▶ StoreAdapter ──▶ TicketStore
//!                                 ▲
//! mutation ──▶ InvalidationListener
//! ```
//!
//! - [`QueryService`] validates a request, canonicalizes it into a
//!   [`QueryKey`] and waits on the coordinator for at most the request timeout.
//! - [`CacheCoordinator`] serves fresh entries, and runs at most one
//!   recomputation per key; concurrent callers share its result.
//! - [`Aggregator`] folds store rows into a [`MetricResult`]; it never touches
//!   cache state.
//! - [`InvalidationListener`] evicts or marks stale every cached key a ticket
//!   mutation could affect.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ticket_metrics::{Aggregator, MetricsRequest, QueryService, ServiceConfig, SqliteStore, StoreAdapter};
//!
//! let config = ServiceConfig::from_env();
//! config.validate()?;
//! let store = SqliteStore::open("tickets.db").await?;
//! let aggregator = Aggregator::new(StoreAdapter::new(Arc::new(store)));
//! let service = QueryService::from_config(&config, Arc::new(aggregator));
//!
//! let response = service
//!     .query(&MetricsRequest::new("overall_score", "2025-07-01T00:00:00Z", "2025-08-01T00:00:00Z"))
//!     .await?;
//! ```

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod key;
pub mod model;
pub mod result;
pub mod rpc;
pub mod service;
pub mod store;
pub mod validation;

pub use aggregate::{Aggregate, Aggregator};
pub use cache::{
    CacheConfig, CacheCoordinator, CacheStats, InvalidationGranularity, InvalidationMode,
    InvalidationReport, Served, ServedFrom,
};
pub use config::{ConfigValidationError, ServiceConfig};
pub use error::{ErrorCode, MetricsError, MetricsResult, StoreError};
pub use invalidation::{InvalidationListener, InvalidationSignal, MutationKind};
pub use key::{Filter, MetricKind, QueryKey, TimeWindow};
pub use model::{Rating, RatingCategory, Ticket, TicketStatus};
pub use result::MetricResult;
pub use service::{MetricsRequest, MetricsResponse, QueryService};
pub use store::{MemoryStore, SqliteConfig, SqliteStore, StoreAdapter, TicketStore};
pub use validation::{FieldError, Validate, ValidationResult};

/// Commonly used types
pub mod prelude {
    pub use crate::rpc::{Context, RpcError, RpcResult};
    pub use crate::{
        CacheConfig, ErrorCode, InvalidationSignal, MetricKind, MetricsError, MetricsRequest,
        MetricsResponse, MutationKind, QueryService, ServiceConfig,
    };
}
