//! SQLite-backed ticket store
//!
//! Timestamps are stored as unix seconds. The schema is created on open, so a
//! fresh file is ready to seed immediately.
//!
//! # Example
//! ```ignore
//! use ticket_metrics::store::SqliteStore;
//!
//! let store = SqliteStore::open("tickets.db").await?;
//! store.insert_category(&RatingCategory::new(1, "Tone", 1.0)).await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use super::{RowQuery, TicketStore, TicketTime};
use crate::error::StoreError;
use crate::model::{Rating, RatingCategory, Ticket, TicketStatus};

const MEMORY_PATH: &str = ":memory:";

/// SQLite store configuration
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file path, or `:memory:`
    pub path: String,
    /// Enable WAL mode
    pub wal_mode: bool,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Busy timeout in seconds
    pub busy_timeout_secs: u64,
    /// Create database if missing
    pub create_if_missing: bool,
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "ticket_metrics.db".to_string(),
            wal_mode: true,
            max_connections: 5,
            busy_timeout_secs: 5,
            create_if_missing: true,
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Each in-memory connection is its own database, so the pool is pinned
    /// to a single connection.
    pub fn in_memory() -> Self {
        Self {
            path: MEMORY_PATH.to_string(),
            wal_mode: false,
            max_connections: 1,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max.max(1);
        self
    }

    fn is_memory(&self) -> bool {
        self.path == MEMORY_PATH
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(config: SqliteConfig) -> Result<Self, StoreError> {
        let base = if config.is_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::new().filename(&config.path)
        };
        let options = base
            .journal_mode(if config.wal_mode {
                SqliteJournalMode::Wal
            } else {
                SqliteJournalMode::Delete
            })
            .create_if_missing(config.create_if_missing)
            .foreign_keys(config.foreign_keys)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs));

        let mut pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
        if config.is_memory() {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;

        let store = Self { pool };
        store.initialize_schema().await?;
        debug!(path = %config.path, wal = config.wal_mode, "sqlite store opened");
        Ok(store)
    }

    /// Open a file-backed store with default configuration
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::new(SqliteConfig::new(path.as_ref().to_string_lossy().to_string())).await
    }

    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::new(SqliteConfig::in_memory()).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn initialize_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rating_categories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                weight REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id INTEGER PRIMARY KEY,
                subject TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                resolved_at INTEGER,
                sla_deadline INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ratings (
                id INTEGER PRIMARY KEY,
                ticket_id INTEGER NOT NULL REFERENCES tickets(id),
                rating_category_id INTEGER NOT NULL REFERENCES rating_categories(id),
                rating INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tickets_created ON tickets(created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tickets_resolved ON tickets(resolved_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_ratings_created ON ratings(created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn insert_category(&self, category: &RatingCategory) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO rating_categories (id, name, weight) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name, weight = excluded.weight
            "#,
        )
        .bind(i64::from(category.id))
        .bind(&category.name)
        .bind(category.weight)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a ticket, or replace every column of an existing one.
    pub async fn upsert_ticket(&self, ticket: &Ticket) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tickets (id, subject, status, created_at, resolved_at, sla_deadline)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                subject = excluded.subject,
                status = excluded.status,
                created_at = excluded.created_at,
                resolved_at = excluded.resolved_at,
                sla_deadline = excluded.sla_deadline
            "#,
        )
        .bind(i64::from(ticket.id))
        .bind(&ticket.subject)
        .bind(ticket.status.as_str())
        .bind(ticket.created_at.timestamp())
        .bind(ticket.resolved_at.map(|t| t.timestamp()))
        .bind(ticket.sla_deadline.map(|t| t.timestamp()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_rating(&self, rating: &Rating) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ratings (id, ticket_id, rating_category_id, rating, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(i64::from(rating.id))
        .bind(i64::from(rating.ticket_id))
        .bind(i64::from(rating.category_id))
        .bind(i64::from(rating.rating))
        .bind(rating.created_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn push_id_filter(builder: &mut QueryBuilder<'_, Sqlite>, column: &str, ids: &[u32]) {
    if ids.is_empty() {
        return;
    }
    builder.push(" AND ").push(column).push(" IN (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(i64::from(*id));
    }
    separated.push_unseparated(")");
}

fn push_window(builder: &mut QueryBuilder<'_, Sqlite>, column: &str, query: &RowQuery) {
    builder
        .push(column)
        .push(" >= ")
        .push_bind(query.window.start().timestamp())
        .push(" AND ")
        .push(column)
        .push(" < ")
        .push_bind(query.window.end().timestamp());
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::Decode(format!("timestamp {} out of range", secs)))
}

fn small_id(value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Decode(format!("id {} out of range", value)))
}

#[async_trait]
impl TicketStore for SqliteStore {
    async fn tickets(&self, query: &RowQuery, time: TicketTime) -> Result<Vec<Ticket>, StoreError> {
        let column = match time {
            TicketTime::Created => "created_at",
            TicketTime::Resolved => "resolved_at",
        };

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, subject, status, created_at, resolved_at, sla_deadline FROM tickets WHERE ",
        );
        push_window(&mut builder, column, query);
        push_id_filter(&mut builder, "id", &query.ticket_ids);
        if !query.statuses.is_empty() {
            builder.push(" AND status IN (");
            let mut separated = builder.separated(", ");
            for status in &query.statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }
        builder.push(" ORDER BY id");

        let rows: Vec<TicketRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(TicketRow::into_ticket).collect()
    }

    async fn ratings(&self, query: &RowQuery) -> Result<Vec<Rating>, StoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, ticket_id, rating_category_id, rating, created_at FROM ratings WHERE ",
        );
        push_window(&mut builder, "created_at", query);
        push_id_filter(&mut builder, "ticket_id", &query.ticket_ids);
        push_id_filter(&mut builder, "rating_category_id", &query.category_ids);
        builder.push(" ORDER BY id");

        let rows: Vec<RatingRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(RatingRow::into_rating).collect()
    }

    async fn category_weights(&self) -> Result<BTreeMap<u32, f64>, StoreError> {
        let rows: Vec<(i64, f64)> =
            sqlx::query_as("SELECT id, weight FROM rating_categories ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|(id, weight)| Ok((small_id(id)?, weight)))
            .collect()
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

/// Internal row type for ticket queries
#[derive(sqlx::FromRow)]
struct TicketRow {
    id: i64,
    subject: String,
    status: String,
    created_at: i64,
    resolved_at: Option<i64>,
    sla_deadline: Option<i64>,
}

impl TicketRow {
    fn into_ticket(self) -> Result<Ticket, StoreError> {
        Ok(Ticket {
            id: small_id(self.id)?,
            subject: self.subject,
            status: TicketStatus::from_str(&self.status).map_err(StoreError::Decode)?,
            created_at: timestamp(self.created_at)?,
            resolved_at: self.resolved_at.map(timestamp).transpose()?,
            sla_deadline: self.sla_deadline.map(timestamp).transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RatingRow {
    id: i64,
    ticket_id: i64,
    rating_category_id: i64,
    rating: i64,
    created_at: i64,
}

impl RatingRow {
    fn into_rating(self) -> Result<Rating, StoreError> {
        let rating = u8::try_from(self.rating)
            .map_err(|_| StoreError::Decode(format!("rating {} out of range", self.rating)))?;
        Ok(Rating::new(
            small_id(self.id)?,
            small_id(self.ticket_id)?,
            small_id(self.rating_category_id)?,
            rating,
            timestamp(self.created_at)?,
        ))
    }
}
