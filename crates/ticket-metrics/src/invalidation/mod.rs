//! Mutation-driven invalidation
//!
//! A ticket mutation is described by an [`InvalidationSignal`]. The
//! [`InvalidationListener`] decides which cached keys the mutation could
//! affect and asks the coordinator to evict or mark them stale.
//!
//! A key is affected when:
//! - the metric reads the kind of row that changed (ticket lifecycle rows for
//!   `created`/`closed`, ratings for `rated`, both for `updated`), and
//! - the key's coverage window overlaps the signal's affected window, and
//! - under [`InvalidationGranularity::Ticket`], the key's ticket and category
//!   filters do not exclude the mutated ticket.

mod listener;

pub use listener::InvalidationListener;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::cache::InvalidationGranularity;
use crate::key::{MetricFamily, QueryKey, TimeWindow};

/// What happened to the ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Created,
    Updated,
    Closed,
    Rated,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Closed => "closed",
            Self::Rated => "rated",
        }
    }

    pub fn affects(&self, family: MetricFamily) -> bool {
        match self {
            Self::Created | Self::Closed => family == MetricFamily::Tickets,
            Self::Rated => family == MetricFamily::Ratings,
            Self::Updated => true,
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "closed" => Ok(Self::Closed),
            "rated" => Ok(Self::Rated),
            other => Err(format!("unknown mutation kind '{}'", other)),
        }
    }
}

/// A ticket mutation. Delivered at least once; applying it twice is harmless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidationSignal {
    pub ticket_id: u32,
    pub kind: MutationKind,
    pub changed_at: DateTime<Utc>,
    /// Rating category touched, for `rated` mutations
    #[serde(default)]
    pub category_id: Option<u32>,
    /// Time range whose aggregates the mutation changes, when wider than
    /// `changed_at` itself (e.g. a status change of a ticket created earlier)
    #[serde(default)]
    pub window: Option<TimeWindow>,
}

impl InvalidationSignal {
    pub fn new(ticket_id: u32, kind: MutationKind, changed_at: DateTime<Utc>) -> Self {
        Self {
            ticket_id,
            kind,
            changed_at,
            category_id: None,
            window: None,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category_id: u32) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Explicit window if given, otherwise the second containing `changed_at`.
    pub fn affected_window(&self) -> TimeWindow {
        self.window
            .unwrap_or_else(|| TimeWindow::point(self.changed_at))
    }

    /// Whether this mutation can change the result cached under `key`.
    pub fn applies_to(&self, key: &QueryKey, granularity: InvalidationGranularity) -> bool {
        if !self.kind.affects(key.metric().family()) {
            return false;
        }
        if !key.coverage().overlaps(&self.affected_window()) {
            return false;
        }
        if granularity == InvalidationGranularity::Bucket {
            return true;
        }

        let tickets = key.ticket_ids();
        if !tickets.is_empty() && !tickets.contains(&self.ticket_id) {
            return false;
        }
        let categories = key.category_ids();
        match self.category_id {
            Some(category) => categories.is_empty() || categories.contains(&category),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{Filter, MetricKind};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_750_000_000 + secs, 0).unwrap()
    }

    fn window(start: i64, end: i64) -> TimeWindow {
        TimeWindow::new(at(start), at(end)).unwrap()
    }

    fn key(metric: MetricKind, filters: Vec<Filter>, start: i64, end: i64) -> QueryKey {
        QueryKey::new(metric, filters, window(start, end)).unwrap()
    }

    #[test]
    fn test_overlapping_windows_both_match() {
        let signal = InvalidationSignal::new(1, MutationKind::Rated, at(7));
        let first = key(MetricKind::OverallScore, vec![], 0, 10);
        let second = key(MetricKind::OverallScore, vec![], 5, 15);
        let later = key(MetricKind::OverallScore, vec![], 10, 20);
        assert!(signal.applies_to(&first, InvalidationGranularity::Ticket));
        assert!(signal.applies_to(&second, InvalidationGranularity::Ticket));
        assert!(!signal.applies_to(&later, InvalidationGranularity::Ticket));
    }

    #[test]
    fn test_mutation_kind_selects_metric_family() {
        let counts = key(MetricKind::TicketCounts, vec![], 0, 10);
        let score = key(MetricKind::OverallScore, vec![], 0, 10);
        let g = InvalidationGranularity::Bucket;

        let rated = InvalidationSignal::new(1, MutationKind::Rated, at(3));
        assert!(!rated.applies_to(&counts, g));
        assert!(rated.applies_to(&score, g));

        let closed = InvalidationSignal::new(1, MutationKind::Closed, at(3));
        assert!(closed.applies_to(&counts, g));
        assert!(!closed.applies_to(&score, g));

        let updated = InvalidationSignal::new(1, MutationKind::Updated, at(3));
        assert!(updated.applies_to(&counts, g));
        assert!(updated.applies_to(&score, g));
    }

    #[test]
    fn test_ticket_granularity_honours_filters() {
        let other_ticket = key(MetricKind::OverallScore, vec![Filter::Ticket(2)], 0, 10);
        let other_category = key(MetricKind::OverallScore, vec![Filter::Category(9)], 0, 10);
        let signal = InvalidationSignal::new(1, MutationKind::Rated, at(3)).with_category(4);

        assert!(!signal.applies_to(&other_ticket, InvalidationGranularity::Ticket));
        assert!(!signal.applies_to(&other_category, InvalidationGranularity::Ticket));
        assert!(signal.applies_to(&other_ticket, InvalidationGranularity::Bucket));
        assert!(signal.applies_to(&other_category, InvalidationGranularity::Bucket));

        let same = key(
            MetricKind::OverallScore,
            vec![Filter::Ticket(1), Filter::Category(4)],
            0,
            10,
        );
        assert!(signal.applies_to(&same, InvalidationGranularity::Ticket));
    }

    #[test]
    fn test_period_over_period_reacts_to_previous_period() {
        let pop = key(MetricKind::PeriodOverPeriod, vec![], 100, 200);
        let signal = InvalidationSignal::new(1, MutationKind::Rated, at(50));
        assert!(signal.applies_to(&pop, InvalidationGranularity::Ticket));

        let older = InvalidationSignal::new(1, MutationKind::Rated, at(-1));
        assert!(!older.applies_to(&pop, InvalidationGranularity::Ticket));
    }

    #[test]
    fn test_explicit_window_widens_reach() {
        let counts = key(MetricKind::TicketCounts, vec![], 0, 10);
        let signal = InvalidationSignal::new(1, MutationKind::Closed, at(500));
        assert!(!signal.applies_to(&counts, InvalidationGranularity::Ticket));

        let widened = signal.with_window(window(2, 501));
        assert!(widened.applies_to(&counts, InvalidationGranularity::Ticket));
    }

    #[test]
    fn test_signal_deserializes_without_optionals() {
        let signal: InvalidationSignal = serde_json::from_str(
            r#"{"ticket_id": 3, "kind": "closed", "changed_at": "2025-07-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(signal.kind, MutationKind::Closed);
        assert_eq!(signal.category_id, None);
        assert_eq!(signal.window, None);
    }
}
