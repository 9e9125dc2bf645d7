use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::key::TimeWindow;

/// Windows up to this many days get daily buckets; longer ones weekly.
pub const DAILY_BUCKET_LIMIT_DAYS: i64 = 31;

/// Timeline bucket size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBucket {
    Daily,
    /// Weeks start on Monday
    Weekly,
}

impl TimeBucket {
    pub fn for_window(window: &TimeWindow) -> Self {
        if window.length() <= chrono::Duration::days(DAILY_BUCKET_LIMIT_DAYS) {
            Self::Daily
        } else {
            Self::Weekly
        }
    }

    /// First day of the bucket containing `at`.
    pub fn start_of(&self, at: DateTime<Utc>) -> NaiveDate {
        let date = at.date_naive();
        match self {
            Self::Daily => date,
            Self::Weekly => {
                date - chrono::Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 15, 30, 0).unwrap()
    }

    #[test]
    fn test_bucket_choice() {
        let month = TimeWindow::new(day(2025, 7, 1), day(2025, 8, 1)).unwrap();
        assert_eq!(TimeBucket::for_window(&month), TimeBucket::Daily);

        let quarter = TimeWindow::new(day(2025, 7, 1), day(2025, 10, 1)).unwrap();
        assert_eq!(TimeBucket::for_window(&quarter), TimeBucket::Weekly);
    }

    #[test]
    fn test_weekly_bucket_starts_on_monday() {
        // 2025-07-03 is a Thursday
        let start = TimeBucket::Weekly.start_of(day(2025, 7, 3));
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());

        let monday = TimeBucket::Weekly.start_of(day(2025, 6, 30));
        assert_eq!(monday, NaiveDate::from_ymd_opt(2025, 6, 30).unwrap());
    }

    #[test]
    fn test_daily_bucket_drops_time_of_day() {
        let start = TimeBucket::Daily.start_of(day(2025, 7, 3));
        assert_eq!(start, NaiveDate::from_ymd_opt(2025, 7, 3).unwrap());
    }
}
