//! Calendar date ranges for earnings queries.
//!
//! Rules implemented:
//! - year: `{year}-01-01 .. {year}-12-31`
//! - year + quarter: fixed quarter boundaries (Q1 Jan 1 - Mar 31, ... Q4 Oct 1 - Dec 31)
//! - today / tomorrow: single-day range
//! - next N days: `today .. today + N`
//! - previous N days: `today - N .. today`
//!
//! Relative windows take `today` as an argument; the caller decides which
//! timezone "today" is evaluated in.

use std::fmt;

use chrono::{Datelike, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CalendarYear(i32);

impl CalendarYear {
    pub fn new(year: i32) -> Result<Self, RangeError> {
        if (0..=9999).contains(&year) {
            Ok(Self(year))
        } else {
            Err(RangeError::InvalidYear(year.to_string()))
        }
    }

    pub fn value(self) -> i32 {
        self.0
    }
}

impl fmt::Display for CalendarYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    pub fn from_number(number: u32) -> Option<Self> {
        match number {
            1 => Some(Self::Q1),
            2 => Some(Self::Q2),
            3 => Some(Self::Q3),
            4 => Some(Self::Q4),
            _ => None,
        }
    }

    pub fn number(self) -> u32 {
        match self {
            Self::Q1 => 1,
            Self::Q2 => 2,
            Self::Q3 => 3,
            Self::Q4 => 4,
        }
    }

    pub fn containing_month(month: u32) -> Self {
        match month {
            1..=3 => Self::Q1,
            4..=6 => Self::Q2,
            7..=9 => Self::Q3,
            _ => Self::Q4,
        }
    }

    /// `(month, day)` of the first and last day of the quarter.
    fn bounds(self) -> ((u32, u32), (u32, u32)) {
        match self {
            Self::Q1 => ((1, 1), (3, 31)),
            Self::Q2 => ((4, 1), (6, 30)),
            Self::Q3 => ((7, 1), (9, 30)),
            Self::Q4 => ((10, 1), (12, 31)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeMode {
    Year(CalendarYear),
    YearQuarter(CalendarYear, Quarter),
    Today,
    Tomorrow,
    NextNDays(u32),
    PreviousNDays(u32),
}

impl RangeMode {
    /// Full year when `quarter` is absent, otherwise the quarter of that year.
    pub fn for_year(year: CalendarYear, quarter: Option<Quarter>) -> Self {
        match quarter {
            Some(quarter) => Self::YearQuarter(year, quarter),
            None => Self::Year(year),
        }
    }
}

/// Inclusive date range; serialized as `{ "from": "YYYY-MM-DD", "to": "YYYY-MM-DD" }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn single_day(day: NaiveDate) -> Self {
        Self { from: day, to: day }
    }

    pub fn from_text(&self) -> String {
        format_day(self.from)
    }

    pub fn to_text(&self) -> String {
        format_day(self.to)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.from <= day && day <= self.to
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", format_day(self.from), format_day(self.to))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("invalid year: {0:?} (expected 4 digits)")]
    InvalidYear(String),
}

/// Accepts exactly four ASCII digits.
pub fn parse_year(input: &str) -> Result<CalendarYear, RangeError> {
    let trimmed = input.trim();
    if trimmed.len() != 4 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::InvalidYear(input.to_string()));
    }

    let year = trimmed
        .parse::<i32>()
        .map_err(|_| RangeError::InvalidYear(input.to_string()))?;
    CalendarYear::new(year)
}

/// Anything other than `1`..`4` yields `None`, which callers treat as "full year".
pub fn parse_quarter(input: &str) -> Option<Quarter> {
    input
        .trim()
        .parse::<u32>()
        .ok()
        .and_then(Quarter::from_number)
}

pub fn resolve_range(mode: RangeMode, today: NaiveDate) -> DateRange {
    match mode {
        RangeMode::Year(year) => DateRange {
            from: ymd(year, 1, 1),
            to: ymd(year, 12, 31),
        },
        RangeMode::YearQuarter(year, quarter) => {
            let ((from_month, from_day), (to_month, to_day)) = quarter.bounds();
            DateRange {
                from: ymd(year, from_month, from_day),
                to: ymd(year, to_month, to_day),
            }
        }
        RangeMode::Today => DateRange::single_day(today),
        RangeMode::Tomorrow => DateRange::single_day(add_days(today, 1)),
        RangeMode::NextNDays(n) => DateRange {
            from: today,
            to: add_days(today, n),
        },
        RangeMode::PreviousNDays(n) => DateRange {
            from: sub_days(today, n),
            to: today,
        },
    }
}

/// Year and quarter containing `today`; the dashboard's default search period.
pub fn current_period(today: NaiveDate) -> (CalendarYear, Quarter) {
    let year = CalendarYear::new(today.year()).unwrap_or(CalendarYear(9999));
    (year, Quarter::containing_month(today.month()))
}

pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

pub fn format_day(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

pub fn parse_day(input: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").ok()
}

fn ymd(year: CalendarYear, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year.value(), month, day)
        .expect("quarter boundaries are valid for every 4-digit year")
}

fn add_days(day: NaiveDate, n: u32) -> NaiveDate {
    day.checked_add_days(Days::new(u64::from(n)))
        .unwrap_or(NaiveDate::MAX)
}

fn sub_days(day: NaiveDate, n: u32) -> NaiveDate {
    day.checked_sub_days(Days::new(u64::from(n)))
        .unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn year(raw: &str) -> CalendarYear {
        parse_year(raw).unwrap()
    }

    #[test]
    fn full_year_range() {
        let range = resolve_range(RangeMode::Year(year("2025")), day(2030, 6, 1));
        assert_eq!(range.from_text(), "2025-01-01");
        assert_eq!(range.to_text(), "2025-12-31");
    }

    #[test]
    fn quarter_boundaries_are_fixed() {
        let cases = [
            (Quarter::Q1, "2025-01-01", "2025-03-31"),
            (Quarter::Q2, "2025-04-01", "2025-06-30"),
            (Quarter::Q3, "2025-07-01", "2025-09-30"),
            (Quarter::Q4, "2025-10-01", "2025-12-31"),
        ];

        for (quarter, from, to) in cases {
            let range = resolve_range(
                RangeMode::YearQuarter(year("2025"), quarter),
                day(2025, 1, 1),
            );
            assert_eq!(range.from_text(), from);
            assert_eq!(range.to_text(), to);
        }
    }

    #[test]
    fn leap_year_q1_still_ends_march_31() {
        let range = resolve_range(
            RangeMode::YearQuarter(year("2024"), Quarter::Q1),
            day(2024, 1, 1),
        );
        assert_eq!(range.to_text(), "2024-03-31");
    }

    #[test]
    fn invalid_quarter_falls_back_to_full_year() {
        for raw in ["0", "5", "q2", "", "2.0", "-1"] {
            assert_eq!(parse_quarter(raw), None, "quarter {raw:?}");
            let mode = RangeMode::for_year(year("2024"), parse_quarter(raw));
            let range = resolve_range(mode, day(2024, 5, 5));
            assert_eq!(range.from_text(), "2024-01-01");
            assert_eq!(range.to_text(), "2024-12-31");
        }
        assert_eq!(parse_quarter(" 3 "), Some(Quarter::Q3));
    }

    #[test]
    fn year_must_be_four_digits() {
        assert_eq!(year("2025").value(), 2025);
        assert_eq!(year("0999").to_string(), "0999");
        for raw in ["25", "20255", "abcd", "", "20a5", "-202"] {
            assert_eq!(
                parse_year(raw).unwrap_err(),
                RangeError::InvalidYear(raw.to_string())
            );
        }
    }

    #[test]
    fn today_and_tomorrow_are_single_day() {
        let today = day(2025, 12, 31);
        let range = resolve_range(RangeMode::Today, today);
        assert_eq!(range.from, today);
        assert_eq!(range.to, today);

        let range = resolve_range(RangeMode::Tomorrow, today);
        assert_eq!(range.from_text(), "2026-01-01");
        assert_eq!(range.to_text(), "2026-01-01");
    }

    #[test]
    fn next_and_previous_windows_cross_month_boundaries() {
        let today = day(2025, 2, 10);
        let next = resolve_range(RangeMode::NextNDays(30), today);
        assert_eq!(next.from_text(), "2025-02-10");
        assert_eq!(next.to_text(), "2025-03-12");

        let previous = resolve_range(RangeMode::PreviousNDays(30), today);
        assert_eq!(previous.from_text(), "2025-01-11");
        assert_eq!(previous.to_text(), "2025-02-10");
    }

    #[test]
    fn every_mode_yields_ordered_well_formed_dates() {
        let re = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
        let today = day(2024, 2, 29);
        let mut modes = vec![
            RangeMode::Today,
            RangeMode::Tomorrow,
            RangeMode::NextNDays(0),
            RangeMode::NextNDays(365),
            RangeMode::PreviousNDays(45),
            RangeMode::Year(year("0001")),
        ];
        modes.extend(
            Quarter::ALL
                .iter()
                .map(|q| RangeMode::YearQuarter(year("2024"), *q)),
        );

        for mode in modes {
            let range = resolve_range(mode, today);
            assert!(range.from <= range.to, "{mode:?}");
            assert!(re.is_match(&range.from_text()), "{mode:?}");
            assert!(re.is_match(&range.to_text()), "{mode:?}");
        }
    }

    #[test]
    fn current_period_follows_month() {
        assert_eq!(current_period(day(2025, 3, 31)), (year("2025"), Quarter::Q1));
        assert_eq!(current_period(day(2025, 4, 1)), (year("2025"), Quarter::Q2));
        assert_eq!(current_period(day(2025, 9, 15)), (year("2025"), Quarter::Q3));
        assert_eq!(current_period(day(2025, 12, 1)), (year("2025"), Quarter::Q4));
    }

    #[test]
    fn range_serializes_as_plain_dates() {
        let range = resolve_range(RangeMode::Year(year("2025")), day(2025, 1, 1));
        let json = serde_json::to_value(range).unwrap();
        assert_eq!(json["from"], "2025-01-01");
        assert_eq!(json["to"], "2025-12-31");
        assert!(range.contains(day(2025, 6, 1)));
        assert!(!range.contains(day(2026, 1, 1)));
    }
}
