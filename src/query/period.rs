use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::date_util::{last_day_of_month, parse_date, quarter_of};
use crate::error::{Error, Result};

/// Roughly a century.
const MAX_ROLLING_DAYS: u32 = 36_600;

static RE_HALF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-H([12])$").unwrap());
static RE_QUARTER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-Q([1-4])$").unwrap());
static RE_WEEK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-W(\d{1,2})$").unwrap());
static RE_MONTH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})$").unwrap());
static RE_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})\.\.(\d{4}-\d{2}-\d{2})$").unwrap());

/// An inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// True if the UTC calendar date of `ts` falls in the range.
    pub fn contains_instant(&self, ts: DateTime<Utc>) -> bool {
        self.contains(ts.date_naive())
    }

    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Canonical key used for snapshot caching.
    pub fn to_key(&self) -> String {
        format!("{}..{}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }
}

/// A reporting period for the order date filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    Year(i32),
    Half(i32, u8),
    Quarter(i32, u8),
    Month(i32, u8),
    Week(i32, u8),
    Day(NaiveDate),
    Range(NaiveDate, NaiveDate),
    Rolling(u32, NaiveDate),
    YearToDate(i32),
    HalfToDate(i32, u8),
    QuarterToDate(i32, u8),
    MonthToDate(i32, u8),
    WeekToDate(i32, u8),
}

impl Period {
    /// Parse a period string.
    ///
    /// Supported formats:
    /// - `2025`: year
    /// - `2025-H1`: half
    /// - `2025-Q1`: quarter
    /// - `2025-01`: month
    /// - `2025-W05`: ISO week
    /// - `2025-01-15`: single day
    /// - `2025-01-01..2025-01-31`: explicit inclusive range
    /// - `today`, `30d`: rolling last N days
    /// - `ytd`, `htd`, `qtd`, `mtd`, `wtd`: to date
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let today = chrono::Local::now().date_naive();

        match s.to_lowercase().as_str() {
            "today" => return Ok(Period::Day(today)),
            "ytd" => return Ok(Period::YearToDate(today.year())),
            "htd" => {
                let half = if today.month() <= 6 { 1 } else { 2 };
                return Ok(Period::HalfToDate(today.year(), half));
            }
            "qtd" => return Ok(Period::QuarterToDate(today.year(), quarter_of(today))),
            "mtd" => return Ok(Period::MonthToDate(today.year(), today.month() as u8)),
            "wtd" => {
                let iw = today.iso_week();
                return Ok(Period::WeekToDate(iw.year(), iw.week() as u8));
            }
            _ => {}
        }

        // Rolling: "30d", "7d", etc.
        if s.ends_with('d') || s.ends_with('D') {
            if let Ok(n) = s[..s.len() - 1].parse::<u32>() {
                if n == 0 || n > MAX_ROLLING_DAYS {
                    return Err(Error::PeriodParse(format!("rolling window out of range: {s}")));
                }
                return Ok(Period::Rolling(n, today));
            }
        }

        if let Some(caps) = RE_RANGE.captures(s) {
            let start = parse_date(&caps[1])
                .ok_or_else(|| Error::PeriodParse(format!("invalid start date: {s}")))?;
            let end = parse_date(&caps[2])
                .ok_or_else(|| Error::PeriodParse(format!("invalid end date: {s}")))?;
            if end < start {
                return Err(Error::PeriodParse(format!("range ends before it starts: {s}")));
            }
            return Ok(Period::Range(start, end));
        }

        if let Some(day) = parse_date(s) {
            return Ok(Period::Day(day));
        }

        // Year: "2025"
        if s.len() == 4 {
            if let Ok(year) = s.parse::<i32>() {
                return Ok(Period::Year(year));
            }
        }

        if let Some(caps) = RE_HALF.captures(s) {
            let year: i32 = caps[1].parse().unwrap();
            let half: u8 = caps[2].parse().unwrap();
            return Ok(Period::Half(year, half));
        }

        if let Some(caps) = RE_QUARTER.captures(s) {
            let year: i32 = caps[1].parse().unwrap();
            let q: u8 = caps[2].parse().unwrap();
            return Ok(Period::Quarter(year, q));
        }

        if let Some(caps) = RE_WEEK.captures(s) {
            let year: i32 = caps[1].parse().unwrap();
            let week: u8 = caps[2].parse().unwrap();
            if (1..=last_iso_week(year)).contains(&week) {
                return Ok(Period::Week(year, week));
            }
        }

        if let Some(caps) = RE_MONTH.captures(s) {
            let year: i32 = caps[1].parse().unwrap();
            let month: u8 = caps[2].parse().unwrap();
            if (1..=12).contains(&month) {
                return Ok(Period::Month(year, month));
            }
        }

        Err(Error::PeriodParse(format!("unrecognized period: {s}")))
    }

    /// Canonical key string.
    pub fn to_key(&self) -> String {
        match self {
            Period::Year(y) => format!("{y}"),
            Period::Half(y, h) => format!("{y}-H{h}"),
            Period::Quarter(y, q) => format!("{y}-Q{q}"),
            Period::Month(y, m) => format!("{y}-{m:02}"),
            Period::Week(y, w) => format!("{y}-W{w:02}"),
            Period::Day(d) => d.format("%Y-%m-%d").to_string(),
            Period::Range(s, e) => DateRange::new(*s, *e).to_key(),
            Period::Rolling(n, _) => format!("{n}d"),
            Period::YearToDate(y) => format!("{y}-ytd"),
            Period::HalfToDate(y, h) => format!("{y}-H{h}-td"),
            Period::QuarterToDate(y, q) => format!("{y}-Q{q}-td"),
            Period::MonthToDate(y, m) => format!("{y}-{m:02}-td"),
            Period::WeekToDate(y, w) => format!("{y}-W{w:02}-td"),
        }
    }

    /// The inclusive date range covered by this period.
    pub fn date_range(&self) -> DateRange {
        self.date_range_as_of(chrono::Local::now().date_naive())
    }

    /// Like [`Period::date_range`], with to-date periods ending on `today`.
    pub fn date_range_as_of(&self, today: NaiveDate) -> DateRange {
        let ymd = |y: i32, m: u32, d: u32| NaiveDate::from_ymd_opt(y, m, d).unwrap();
        let (start, end) = match self {
            Period::Year(y) => (ymd(*y, 1, 1), ymd(*y, 12, 31)),
            Period::Half(y, 1) => (ymd(*y, 1, 1), ymd(*y, 6, 30)),
            Period::Half(y, _) => (ymd(*y, 7, 1), ymd(*y, 12, 31)),
            Period::Quarter(y, q) => {
                let start_month = (*q as u32 - 1) * 3 + 1;
                (ymd(*y, start_month, 1), last_day_of_month(*y, *q as u32 * 3))
            }
            Period::Month(y, m) => (ymd(*y, *m as u32, 1), last_day_of_month(*y, *m as u32)),
            Period::Week(y, w) => {
                let start = NaiveDate::from_isoywd_opt(*y, *w as u32, Weekday::Mon).unwrap();
                (start, start + Duration::days(6))
            }
            Period::Day(d) => (*d, *d),
            Period::Range(s, e) => (*s, *e),
            Period::Rolling(n, as_of) => (*as_of - Duration::days(*n as i64 - 1), *as_of),
            Period::YearToDate(y) => (ymd(*y, 1, 1), today),
            Period::HalfToDate(y, h) => (ymd(*y, (*h as u32 - 1) * 6 + 1, 1), today),
            Period::QuarterToDate(y, q) => (ymd(*y, (*q as u32 - 1) * 3 + 1, 1), today),
            Period::MonthToDate(y, m) => (ymd(*y, *m as u32, 1), today),
            Period::WeekToDate(y, w) => (
                NaiveDate::from_isoywd_opt(*y, *w as u32, Weekday::Mon).unwrap(),
                today,
            ),
        };
        DateRange::new(start, end)
    }

    /// The previous period of the same shape, for period-over-period
    /// comparisons.
    pub fn previous(&self) -> Self {
        self.previous_as_of(chrono::Local::now().date_naive())
    }

    pub fn previous_as_of(&self, today: NaiveDate) -> Self {
        match self {
            Period::Year(y) => Period::Year(y - 1),
            Period::Half(y, 1) => Period::Half(y - 1, 2),
            Period::Half(y, _) => Period::Half(*y, 1),
            Period::Quarter(y, 1) => Period::Quarter(y - 1, 4),
            Period::Quarter(y, q) => Period::Quarter(*y, q - 1),
            Period::Month(y, 1) => Period::Month(y - 1, 12),
            Period::Month(y, m) => Period::Month(*y, m - 1),
            Period::Week(y, 1) => Period::Week(y - 1, last_iso_week(y - 1)),
            Period::Week(y, w) => Period::Week(*y, w - 1),
            Period::Day(d) => Period::Day(*d - Duration::days(1)),
            Period::Range(s, e) => {
                let len = Duration::days((*e - *s).num_days() + 1);
                Period::Range(*s - len, *e - len)
            }
            Period::Rolling(n, as_of) => Period::Rolling(*n, *as_of - Duration::days(*n as i64)),
            // To-date periods compare against the same number of days at
            // the start of the prior period.
            Period::YearToDate(y) => self.same_span_from(Period::Year(y - 1), today),
            Period::HalfToDate(y, h) => {
                self.same_span_from(Period::Half(*y, *h).previous(), today)
            }
            Period::QuarterToDate(y, q) => {
                self.same_span_from(Period::Quarter(*y, *q).previous(), today)
            }
            Period::MonthToDate(y, m) => {
                self.same_span_from(Period::Month(*y, *m).previous(), today)
            }
            Period::WeekToDate(y, w) => {
                self.same_span_from(Period::Week(*y, *w).previous(), today)
            }
        }
    }

    /// The prior range never runs past the end of `prior`, so a longer
    /// current period cannot overlap itself.
    fn same_span_from(&self, prior: Period, today: NaiveDate) -> Self {
        let days = self.date_range_as_of(today).num_days();
        let prior = prior.date_range_as_of(today);
        let end = (prior.start + Duration::days(days - 1)).min(prior.end);
        Period::Range(prior.start, end)
    }
}

fn last_iso_week(year: i32) -> u8 {
    if NaiveDate::from_isoywd_opt(year, 53, Weekday::Mon).is_some() {
        53
    } else {
        52
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_calendar_periods() {
        assert_eq!(Period::parse("2025").unwrap(), Period::Year(2025));
        assert_eq!(Period::parse("2025-H2").unwrap(), Period::Half(2025, 2));
        assert_eq!(Period::parse("2025-Q4").unwrap(), Period::Quarter(2025, 4));
        assert_eq!(Period::parse("2025-01").unwrap(), Period::Month(2025, 1));
        assert_eq!(Period::parse("2025-W05").unwrap(), Period::Week(2025, 5));
    }

    #[test]
    fn test_parse_day_and_range() {
        assert_eq!(
            Period::parse("2025-03-10").unwrap(),
            Period::Day(d(2025, 3, 10))
        );
        assert_eq!(
            Period::parse("2025-03-01..2025-03-15").unwrap(),
            Period::Range(d(2025, 3, 1), d(2025, 3, 15))
        );
        assert!(Period::parse("2025-03-15..2025-03-01").is_err());
    }

    #[test]
    fn test_parse_rolling() {
        match Period::parse("30d").unwrap() {
            Period::Rolling(30, _) => {}
            p => panic!("expected Rolling(30, _), got {p:?}"),
        }
        assert!(Period::parse("0d").is_err());
    }

    #[test]
    fn test_parse_to_date() {
        let today = chrono::Local::now().date_naive();
        match Period::parse("mtd").unwrap() {
            Period::MonthToDate(y, m) => {
                assert_eq!(y, today.year());
                assert_eq!(m, today.month() as u8);
            }
            p => panic!("expected MonthToDate, got {p:?}"),
        }
        assert_eq!(Period::parse("today").unwrap().date_range().num_days(), 1);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Period::parse("garbage").is_err());
        assert!(Period::parse("2025-Q5").is_err());
        assert!(Period::parse("2025-13").is_err());
        assert!(Period::parse("2025-W53").is_err());
        assert!(Period::parse("2026-W53").is_ok());
    }

    #[test]
    fn test_date_ranges() {
        assert_eq!(
            Period::Quarter(2025, 2).date_range(),
            DateRange::new(d(2025, 4, 1), d(2025, 6, 30))
        );
        assert_eq!(
            Period::Month(2024, 2).date_range(),
            DateRange::new(d(2024, 2, 1), d(2024, 2, 29))
        );
        let week = Period::Week(2025, 1).date_range();
        assert_eq!(week.start.weekday(), Weekday::Mon);
        assert_eq!(week.num_days(), 7);
        assert_eq!(
            Period::Rolling(7, d(2025, 3, 10)).date_range(),
            DateRange::new(d(2025, 3, 4), d(2025, 3, 10))
        );
    }

    #[test]
    fn test_previous() {
        assert_eq!(Period::Quarter(2025, 1).previous(), Period::Quarter(2024, 4));
        assert_eq!(Period::Month(2025, 6).previous(), Period::Month(2025, 5));
        assert_eq!(
            Period::Range(d(2025, 3, 8), d(2025, 3, 14)).previous(),
            Period::Range(d(2025, 3, 1), d(2025, 3, 7))
        );
        assert_eq!(
            Period::Day(d(2025, 3, 1)).previous(),
            Period::Day(d(2025, 2, 28))
        );
        // 2020 has 53 ISO weeks, 2024 has 52.
        assert_eq!(Period::Week(2021, 1).previous(), Period::Week(2020, 53));
        assert_eq!(Period::Week(2025, 1).previous(), Period::Week(2024, 52));
    }

    #[test]
    fn test_previous_to_date_keeps_span() {
        let today = d(2025, 3, 10);
        let mtd = Period::MonthToDate(2025, 3);
        assert_eq!(
            mtd.previous_as_of(today),
            Period::Range(d(2025, 2, 1), d(2025, 2, 10))
        );
        let htd = Period::HalfToDate(2025, 1);
        assert_eq!(
            htd.previous_as_of(today).date_range_as_of(today),
            DateRange::new(d(2024, 7, 1), d(2024, 9, 7))
        );
        let htd = Period::parse("htd").unwrap();
        assert!(htd.date_range().contains(chrono::Local::now().date_naive()));
    }

    #[test]
    fn test_previous_to_date_stops_at_prior_period_end() {
        // 31 days into March against a 28-day February.
        let today = d(2025, 3, 31);
        let prior = Period::MonthToDate(2025, 3).previous_as_of(today);
        assert_eq!(prior, Period::Range(d(2025, 2, 1), d(2025, 2, 28)));

        // 91 days into Q2 against a 90-day Q1.
        let today = d(2025, 6, 30);
        let prior = Period::QuarterToDate(2025, 2).previous_as_of(today);
        assert_eq!(prior, Period::Range(d(2025, 1, 1), d(2025, 3, 31)));

        // 184 days into H2 against a 181-day H1.
        let today = d(2025, 12, 31);
        let current = Period::HalfToDate(2025, 2);
        let prior = current.previous_as_of(today).date_range_as_of(today);
        assert_eq!(prior.end, d(2025, 6, 30));
        assert!(prior.end < current.date_range_as_of(today).start);
    }

    #[test]
    fn test_range_contains_and_key() {
        let r = DateRange::new(d(2025, 3, 1), d(2025, 3, 31));
        assert!(r.contains(d(2025, 3, 1)));
        assert!(r.contains(d(2025, 3, 31)));
        assert!(!r.contains(d(2025, 4, 1)));
        assert_eq!(r.to_key(), "2025-03-01..2025-03-31");
        assert_eq!(r.to_key(), Period::Range(r.start, r.end).to_key());
    }
}
