//! Query keys
//!
//! A [`QueryKey`] identifies one metrics request: the metric kind, a canonical
//! set of filters and a time window. Two requests that mean the same thing
//! produce equal keys, so they share a cache entry and a recomputation.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::{MetricsError, MetricsResult};
use crate::model::TicketStatus;
use crate::validation::FieldError;

/// `category:3`, `ticket=12`, `status:open`
static FILTER_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(category|ticket|status)\s*[:=]\s*(\S+)$"));

/// The metric families a key can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    TicketCounts,
    ResolutionTime,
    SlaBreach,
    OverallScore,
    CategoryScores,
    TicketScore,
    PeriodOverPeriod,
    TicketCategoryMatrix,
}

/// Which rows a metric is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricFamily {
    /// Ticket lifecycle rows
    Tickets,
    /// Rating rows weighted by category
    Ratings,
}

impl MetricKind {
    pub const ALL: [MetricKind; 8] = [
        Self::TicketCounts,
        Self::ResolutionTime,
        Self::SlaBreach,
        Self::OverallScore,
        Self::CategoryScores,
        Self::TicketScore,
        Self::PeriodOverPeriod,
        Self::TicketCategoryMatrix,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TicketCounts => "ticket_counts",
            Self::ResolutionTime => "resolution_time",
            Self::SlaBreach => "sla_breach",
            Self::OverallScore => "overall_score",
            Self::CategoryScores => "category_scores",
            Self::TicketScore => "ticket_score",
            Self::PeriodOverPeriod => "period_over_period",
            Self::TicketCategoryMatrix => "ticket_category_matrix",
        }
    }

    pub fn family(&self) -> MetricFamily {
        match self {
            Self::TicketCounts | Self::ResolutionTime | Self::SlaBreach => MetricFamily::Tickets,
            Self::OverallScore
            | Self::CategoryScores
            | Self::TicketScore
            | Self::PeriodOverPeriod
            | Self::TicketCategoryMatrix => MetricFamily::Ratings,
        }
    }

    /// Whether the computation reads the period before the key's window.
    pub fn reads_previous_period(&self) -> bool {
        matches!(self, Self::PeriodOverPeriod)
    }

    pub fn accepts(&self, filter: &Filter) -> bool {
        match (self.family(), filter) {
            (MetricFamily::Tickets, Filter::Status(_) | Filter::Ticket(_)) => true,
            (MetricFamily::Tickets, Filter::Category(_)) => false,
            (_, Filter::Status(_)) => false,
            (_, Filter::Category(_)) => *self != Self::TicketScore,
            (_, Filter::Ticket(_)) => matches!(
                self,
                Self::OverallScore | Self::TicketScore | Self::TicketCategoryMatrix
            ),
        }
    }

    /// Reject filter sets this metric cannot be computed for.
    pub fn check_filters(&self, filters: &BTreeSet<Filter>) -> MetricsResult<()> {
        let mut errors: Vec<FieldError> = filters
            .iter()
            .filter(|filter| !self.accepts(filter))
            .map(|filter| {
                FieldError::new(
                    "filters",
                    format!("filter '{}' is not supported by metric {}", filter, self),
                    "unsupported_filter",
                )
            })
            .collect();

        if *self == Self::TicketScore {
            let tickets = filters
                .iter()
                .filter(|f| matches!(f, Filter::Ticket(_)))
                .count();
            if tickets != 1 {
                errors.push(FieldError::new(
                    "filters",
                    "ticket_score requires exactly one ticket filter",
                    "ticket_required",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MetricsError::from_field_errors(errors))
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = Self::ALL.iter().map(MetricKind::as_str).collect();
                MetricsError::from_field_errors(vec![FieldError::one_of("metric", s, &allowed)])
            })
    }
}

/// One predicate of a query key.
///
/// Ordering is derived, so a `BTreeSet<Filter>` is already canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Filter {
    Category(u32),
    Ticket(u32),
    Status(TicketStatus),
}

fn parse_id(field: &str, raw: &str) -> MetricsResult<u32> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 && id <= i64::from(u32::MAX) => Ok(id as u32),
        _ => Err(MetricsError::from_field_errors(vec![FieldError::positive(
            field,
        )])),
    }
}

impl FromStr for Filter {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pattern = FILTER_PATTERN
            .as_ref()
            .map_err(|e| MetricsError::internal(format!("filter pattern failed to compile: {e}")))?;

        let normalized = s.trim().to_ascii_lowercase();
        let Some(captures) = pattern.captures(&normalized) else {
            return Err(MetricsError::from_field_errors(vec![FieldError::new(
                "filters",
                format!(
                    "filter '{}' must look like category:<id>, ticket:<id> or status:<status>",
                    s.trim()
                ),
                "pattern",
            )]));
        };

        let value = &captures[2];
        match &captures[1] {
            "category" => parse_id("category", value).map(Filter::Category),
            "ticket" => parse_id("ticket", value).map(Filter::Ticket),
            _ => value.parse::<TicketStatus>().map(Filter::Status).map_err(|_| {
                let allowed: Vec<&str> = TicketStatus::ALL.iter().map(|s| s.as_str()).collect();
                MetricsError::from_field_errors(vec![FieldError::one_of("status", value, &allowed)])
            }),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Category(id) => write!(f, "category:{}", id),
            Self::Ticket(id) => write!(f, "ticket:{}", id),
            Self::Status(status) => write!(f, "status:{}", status),
        }
    }
}

impl From<Filter> for String {
    fn from(filter: Filter) -> Self {
        filter.to_string()
    }
}

impl TryFrom<String> for Filter {
    type Error = MetricsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    /// Fails with `InvalidQuery` if `end` is before `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> MetricsResult<Self> {
        if end < start {
            return Err(MetricsError::from_field_errors(vec![FieldError::date_order(
                "end",
            )]));
        }
        Ok(Self { start, end })
    }

    /// The one-second window containing `at`.
    pub fn point(at: DateTime<Utc>) -> Self {
        Self {
            start: at,
            end: at + chrono::Duration::seconds(1),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn length(&self) -> chrono::Duration {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The window of the same length ending where this one starts.
    pub fn previous(&self) -> TimeWindow {
        Self {
            start: self.start - self.length(),
            end: self.start,
        }
    }

    /// Floor the start and ceil the end to a multiple of `granularity`
    /// (whole seconds, at least one). Fails with `InvalidQuery` when the
    /// rounded window does not fit in a timestamp.
    pub fn round_outward(&self, granularity: Duration) -> MetricsResult<Self> {
        let out_of_range = || MetricsError::invalid_query("time window is out of range");
        let step = i64::try_from(granularity.as_secs().max(1)).map_err(|_| out_of_range())?;

        let start = self
            .start
            .timestamp()
            .div_euclid(step)
            .checked_mul(step)
            .ok_or_else(out_of_range)?;

        let mut end = self.end.timestamp();
        if self.end.timestamp_subsec_nanos() > 0 {
            end = end.checked_add(1).ok_or_else(out_of_range)?;
        }
        let end = end
            .checked_add(step - 1)
            .map(|padded| padded.div_euclid(step))
            .and_then(|buckets| buckets.checked_mul(step))
            .ok_or_else(out_of_range)?;

        let to_datetime =
            |secs: i64| DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(out_of_range);
        Ok(Self {
            start: to_datetime(start)?,
            end: to_datetime(end)?,
        })
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Identity of a metrics request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct QueryKey {
    metric: MetricKind,
    filters: BTreeSet<Filter>,
    window: TimeWindow,
}

impl QueryKey {
    /// Build a key over an already canonical window.
    pub fn new(
        metric: MetricKind,
        filters: impl IntoIterator<Item = Filter>,
        window: TimeWindow,
    ) -> MetricsResult<Self> {
        let filters: BTreeSet<Filter> = filters.into_iter().collect();
        metric.check_filters(&filters)?;
        Ok(Self {
            metric,
            filters,
            window,
        })
    }

    /// Build a key, rounding the window outward to `granularity`.
    pub fn canonical(
        metric: MetricKind,
        filters: impl IntoIterator<Item = Filter>,
        window: TimeWindow,
        granularity: Duration,
    ) -> MetricsResult<Self> {
        Self::new(metric, filters, window.round_outward(granularity)?)
    }

    pub fn metric(&self) -> MetricKind {
        self.metric
    }

    pub fn filters(&self) -> &BTreeSet<Filter> {
        &self.filters
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    /// Every instant whose data can change this key's result.
    pub fn coverage(&self) -> TimeWindow {
        if self.metric.reads_previous_period() {
            TimeWindow {
                start: self.window.previous().start,
                end: self.window.end,
            }
        } else {
            self.window
        }
    }

    pub fn ticket_ids(&self) -> Vec<u32> {
        self.filters
            .iter()
            .filter_map(|f| match f {
                Filter::Ticket(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn category_ids(&self) -> Vec<u32> {
        self.filters
            .iter()
            .filter_map(|f| match f {
                Filter::Category(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<TicketStatus> {
        self.filters
            .iter()
            .filter_map(|f| match f {
                Filter::Status(status) => Some(*status),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filters: Vec<String> = self.filters.iter().map(Filter::to_string).collect();
        write!(f, "{}[{}]@{}", self.metric, filters.join(","), self.window)
    }
}
