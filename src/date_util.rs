use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

/// Get the last day of a given month.
pub fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap() - Duration::days(1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap() - Duration::days(1)
    }
}

/// Get the quarter (1-4) for a given date.
pub fn quarter_of(d: NaiveDate) -> u8 {
    ((d.month() - 1) / 3 + 1) as u8
}

/// Whole minutes from `from` to `to`, rounded toward negative infinity.
///
/// A `to` earlier than `from` yields a negative count: 90 seconds backwards
/// is -2 minutes, not -1.
pub fn floor_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds().div_euclid(60_000)
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}
