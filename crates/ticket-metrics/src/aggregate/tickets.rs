use std::collections::BTreeMap;

use crate::key::TimeWindow;
use crate::model::{Ticket, TicketStatus};
use crate::result::round_half_up;

/// Total tickets and a count per status, zeros included.
pub fn ticket_counts(tickets: &[Ticket]) -> BTreeMap<String, f64> {
    let mut values = BTreeMap::new();
    values.insert("total".to_string(), tickets.len() as f64);
    for status in TicketStatus::ALL {
        let count = tickets.iter().filter(|t| t.status == status).count();
        values.insert(format!("status.{}", status), count as f64);
    }
    values
}

/// Mean seconds from creation to resolution.
pub fn resolution_time(tickets: &[Ticket]) -> BTreeMap<String, f64> {
    let durations: Vec<i64> = tickets.iter().filter_map(Ticket::resolution_secs).collect();
    let average = if durations.is_empty() {
        0.0
    } else {
        round_half_up(
            durations.iter().sum::<i64>() as f64 / durations.len() as f64,
            2,
        )
    };
    BTreeMap::from([
        ("resolved".to_string(), durations.len() as f64),
        ("avg_resolution_secs".to_string(), average),
    ])
}

/// A ticket with a deadline breaches if it was resolved after the deadline,
/// or is still unresolved and the deadline passed before the window closed.
pub fn sla_breach(tickets: &[Ticket], window: &TimeWindow) -> BTreeMap<String, f64> {
    let mut eligible = 0usize;
    let mut breached = 0usize;
    for ticket in tickets {
        let Some(deadline) = ticket.sla_deadline else {
            continue;
        };
        eligible += 1;
        let late = match ticket.resolved_at {
            Some(resolved) => resolved > deadline,
            None => deadline < window.end(),
        };
        if late {
            breached += 1;
        }
    }

    let rate = if eligible == 0 {
        0.0
    } else {
        round_half_up(breached as f64 / eligible as f64, 4)
    };
    BTreeMap::from([
        ("eligible".to_string(), eligible as f64),
        ("breached".to_string(), breached as f64),
        ("breach_rate".to_string(), rate),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_counts_include_every_status() {
        let tickets = vec![
            Ticket::new(1, "a", hour(1)),
            Ticket::new(2, "b", hour(2)).resolved(hour(3)),
            Ticket::new(3, "c", hour(2)),
        ];
        let values = ticket_counts(&tickets);
        assert_eq!(values["total"], 3.0);
        assert_eq!(values["status.open"], 2.0);
        assert_eq!(values["status.resolved"], 1.0);
        assert_eq!(values["status.closed"], 0.0);
        assert_eq!(values["status.pending"], 0.0);
    }

    #[test]
    fn test_resolution_time() {
        let tickets = vec![
            Ticket::new(1, "a", hour(1)).resolved(hour(2)),
            Ticket::new(2, "b", hour(1)).resolved(hour(1) + Duration::seconds(1801)),
        ];
        let values = resolution_time(&tickets);
        assert_eq!(values["resolved"], 2.0);
        assert_eq!(values["avg_resolution_secs"], 2700.5);
    }

    #[test]
    fn test_sla_breach() {
        let window = TimeWindow::new(hour(0), hour(12)).unwrap();
        let tickets = vec![
            Ticket::new(1, "late", hour(1))
                .with_sla_deadline(hour(2))
                .resolved(hour(3)),
            Ticket::new(2, "on time", hour(1))
                .with_sla_deadline(hour(4))
                .resolved(hour(3)),
            Ticket::new(3, "overdue", hour(1)).with_sla_deadline(hour(5)),
            Ticket::new(4, "still ok", hour(1)).with_sla_deadline(hour(20)),
            Ticket::new(5, "no sla", hour(1)),
        ];
        let values = sla_breach(&tickets, &window);
        assert_eq!(values["eligible"], 4.0);
        assert_eq!(values["breached"], 2.0);
        assert_eq!(values["breach_rate"], 0.5);
    }

    #[test]
    fn test_empty_inputs_are_zero() {
        let window = TimeWindow::new(hour(0), hour(1)).unwrap();
        assert!(ticket_counts(&[]).values().all(|v| *v == 0.0));
        assert!(resolution_time(&[]).values().all(|v| *v == 0.0));
        assert!(sla_breach(&[], &window).values().all(|v| *v == 0.0));
    }
}
