//! Domain rows read from the ticket store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Highest value a rating can take.
pub const MAX_RATING: u8 = 5;

/// Lifecycle status of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Pending,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 4] = [Self::Open, Self::Pending, Self::Resolved, Self::Closed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown ticket status '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: u32,
    pub subject: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub sla_deadline: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn new(id: u32, subject: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            subject: subject.into(),
            status: TicketStatus::Open,
            created_at,
            resolved_at: None,
            sla_deadline: None,
        }
    }

    #[must_use]
    pub fn resolved(mut self, at: DateTime<Utc>) -> Self {
        self.status = TicketStatus::Resolved;
        self.resolved_at = Some(at);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: TicketStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_sla_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.sla_deadline = Some(deadline);
        self
    }

    /// Seconds between creation and resolution, if resolved.
    pub fn resolution_secs(&self) -> Option<i64> {
        self.resolved_at
            .map(|resolved| (resolved - self.created_at).num_seconds())
    }
}

/// A customer's 0..=5 rating of one category of a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub id: u32,
    pub ticket_id: u32,
    pub category_id: u32,
    pub rating: u8,
    pub created_at: DateTime<Utc>,
}

impl Rating {
    pub fn new(
        id: u32,
        ticket_id: u32,
        category_id: u32,
        rating: u8,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            ticket_id,
            category_id,
            rating: rating.min(MAX_RATING),
            created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingCategory {
    pub id: u32,
    pub name: String,
    pub weight: f64,
}

impl RatingCategory {
    pub fn new(id: u32, name: impl Into<String>, weight: f64) -> Self {
        Self {
            id,
            name: name.into(),
            weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_round_trip_through_str() {
        for status in TicketStatus::ALL {
            assert_eq!(status.as_str().parse::<TicketStatus>(), Ok(status));
        }
        assert_eq!("CLOSED".parse::<TicketStatus>(), Ok(TicketStatus::Closed));
        assert!("archived".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn test_resolution_secs() {
        let created = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
        let ticket = Ticket::new(1, "printer", created);
        assert_eq!(ticket.resolution_secs(), None);

        let ticket = ticket.resolved(created + chrono::Duration::minutes(90));
        assert_eq!(ticket.status, TicketStatus::Resolved);
        assert_eq!(ticket.resolution_secs(), Some(5400));
    }

    #[test]
    fn test_rating_is_clamped() {
        let at = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
        assert_eq!(Rating::new(1, 1, 1, 9, at).rating, MAX_RATING);
    }
}
