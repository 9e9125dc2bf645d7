//! Computed metric values

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::key::{MetricKind, TimeWindow};

/// Values computed for one query key. Immutable once produced; the cache
/// shares it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    metric: MetricKind,
    values: BTreeMap<String, f64>,
    computed_at: DateTime<Utc>,
    window: TimeWindow,
}

impl MetricResult {
    pub fn new(metric: MetricKind, window: TimeWindow, values: BTreeMap<String, f64>) -> Self {
        Self {
            metric,
            values,
            computed_at: Utc::now(),
            window,
        }
    }

    pub fn metric(&self) -> MetricKind {
        self.metric
    }

    pub fn values(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn computed_at(&self) -> DateTime<Utc> {
        self.computed_at
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// True when every value is zero.
    pub fn is_zero(&self) -> bool {
        self.values.values().all(|v| *v == 0.0)
    }
}

/// Fixed-scale rounding, halves away from zero.
pub fn round_half_up(value: f64, scale: i32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(scale);
    // Nudge by a few ulps so values like 2.675 that are stored just below the
    // half still round up.
    let scaled = value * factor;
    let nudged = scaled + scaled.signum() * scaled.abs() * f64::EPSILON * 4.0;
    nudged.round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_half_up() {
        assert_eq!(round_half_up(2.675, 2), 2.68);
        assert_eq!(round_half_up(1.005, 2), 1.01);
        assert_eq!(round_half_up(66.666_666, 2), 66.67);
        assert_eq!(round_half_up(0.123_45, 4), 0.1235);
        assert_eq!(round_half_up(-1.5, 0), -2.0);
        assert_eq!(round_half_up(f64::NAN, 2), 0.0);
    }

    #[test]
    fn test_is_zero() {
        let window = TimeWindow::point(Utc::now());
        let zero = MetricResult::new(
            MetricKind::TicketCounts,
            window,
            BTreeMap::from([("total".to_string(), 0.0)]),
        );
        assert!(zero.is_zero());
        let nonzero = MetricResult::new(
            MetricKind::TicketCounts,
            window,
            BTreeMap::from([("total".to_string(), 3.0)]),
        );
        assert!(!nonzero.is_zero());
        assert_eq!(nonzero.value("total"), Some(3.0));
    }
}
