//! Procedure inputs and outputs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ticket_metrics::validation::ValidationRules;
use ticket_metrics::{
    InvalidationReport, InvalidationSignal, MutationKind, TimeWindow, Validate, ValidationResult,
};

/// Input of `tickets.mutated`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketMutatedInput {
    pub ticket_id: u32,
    pub kind: MutationKind,
    pub changed_at: DateTime<Utc>,
    #[serde(default)]
    pub category_id: Option<u32>,
    /// Creation time of the ticket; widens the affected range back to it so
    /// status changes reach aggregates over the creation window.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl TicketMutatedInput {
    pub fn into_signal(self) -> InvalidationSignal {
        let mut signal = InvalidationSignal::new(self.ticket_id, self.kind, self.changed_at);
        if let Some(category_id) = self.category_id {
            signal = signal.with_category(category_id);
        }
        if let Some(created_at) = self.created_at.filter(|c| *c < self.changed_at)
            && let Ok(window) = TimeWindow::new(created_at, self.changed_at + Duration::seconds(1))
        {
            signal = signal.with_window(window);
        }
        signal
    }
}

impl Validate for TicketMutatedInput {
    fn validate(&self) -> ValidationResult {
        let mut rules = ValidationRules::new().positive("ticket_id", i64::from(self.ticket_id));
        if let Some(category_id) = self.category_id {
            rules = rules.positive("category_id", i64::from(category_id));
        }
        rules.build()
    }
}

/// Output of `tickets.mutated`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationAck {
    pub ticket_id: u32,
    pub evicted: usize,
    pub marked_stale: usize,
    pub claims_flagged: usize,
}

impl MutationAck {
    pub fn new(ticket_id: u32, report: InvalidationReport) -> Self {
        Self {
            ticket_id,
            evicted: report.evicted,
            marked_stale: report.marked_stale,
            claims_flagged: report.claims_flagged,
        }
    }
}

/// Output of `health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: String,
    pub cache_enabled: bool,
    pub cache_entries: usize,
}
