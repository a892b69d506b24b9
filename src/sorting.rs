//! Column sorting for normalized earnings rows.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::normalize::NormalizedEarnings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Symbol,
    Exchange,
    Date,
    Actual,
    Estimate,
    Surprise,
    SurprisePercent,
}

impl SortField {
    pub const ALL: [SortField; 7] = [
        SortField::Symbol,
        SortField::Exchange,
        SortField::Date,
        SortField::Estimate,
        SortField::Actual,
        SortField::Surprise,
        SortField::SurprisePercent,
    ];

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "symbol" => Some(Self::Symbol),
            "exchange" => Some(Self::Exchange),
            "date" => Some(Self::Date),
            "actual" => Some(Self::Actual),
            "estimate" => Some(Self::Estimate),
            "surprise" => Some(Self::Surprise),
            "surprisePercent" => Some(Self::SurprisePercent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Symbol => "symbol",
            Self::Exchange => "exchange",
            Self::Date => "date",
            Self::Actual => "actual",
            Self::Estimate => "estimate",
            Self::Surprise => "surprise",
            Self::SurprisePercent => "surprisePercent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Current column sort. `field: None` means unsorted (input order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortState {
    pub field: Option<SortField>,
    pub direction: Option<SortDirection>,
}

impl SortState {
    pub fn unsorted() -> Self {
        Self::default()
    }

    pub fn by(field: SortField, direction: SortDirection) -> Self {
        Self {
            field: Some(field),
            direction: Some(direction),
        }
    }

    pub fn active(self) -> Option<(SortField, SortDirection)> {
        match (self.field, self.direction) {
            (Some(field), Some(direction)) => Some((field, direction)),
            _ => None,
        }
    }
}

/// Header click transition: asc -> desc -> unsorted on the same column, and
/// any other column starts at asc.
pub fn next_sort_state(current: SortState, clicked: SortField) -> SortState {
    if current.field != Some(clicked) {
        return SortState::by(clicked, SortDirection::Asc);
    }

    match current.direction {
        Some(SortDirection::Asc) => SortState::by(clicked, SortDirection::Desc),
        Some(SortDirection::Desc) => SortState::unsorted(),
        None => SortState::by(clicked, SortDirection::Asc),
    }
}

pub fn sort_by(
    records: &[NormalizedEarnings],
    field: SortField,
    direction: SortDirection,
) -> Vec<NormalizedEarnings> {
    let mut out = records.to_vec();
    sort_in_place(&mut out, field, direction);
    out
}

/// Stable sort. Missing values (absent numbers, unparseable dates, unknown
/// exchange) go last regardless of direction.
pub fn sort_in_place(records: &mut [NormalizedEarnings], field: SortField, direction: SortDirection) {
    records.sort_by(|a, b| compare_records(a, b, field, direction));
}

pub fn apply_sort_state(records: Vec<NormalizedEarnings>, state: SortState) -> Vec<NormalizedEarnings> {
    match state.active() {
        Some((field, direction)) => {
            let mut records = records;
            sort_in_place(&mut records, field, direction);
            records
        }
        None => records,
    }
}

pub fn compare_records(
    a: &NormalizedEarnings,
    b: &NormalizedEarnings,
    field: SortField,
    direction: SortDirection,
) -> Ordering {
    match field {
        SortField::Symbol => directed(a.symbol.cmp(&b.symbol), direction),
        SortField::Exchange => compare_present(
            a.exchange.as_deref(),
            b.exchange.as_deref(),
            direction,
            |x, y| x.cmp(y),
        ),
        SortField::Date => compare_present(
            sortable_date(&a.date),
            sortable_date(&b.date),
            direction,
            |x, y| x.cmp(y),
        ),
        SortField::Actual => compare_numbers(a.actual, b.actual, direction),
        SortField::Estimate => compare_numbers(a.estimate, b.estimate, direction),
        SortField::Surprise => compare_numbers(a.surprise, b.surprise, direction),
        SortField::SurprisePercent => {
            compare_numbers(a.surprise_percent, b.surprise_percent, direction)
        }
    }
}

fn compare_numbers(a: Option<f64>, b: Option<f64>, direction: SortDirection) -> Ordering {
    compare_present(a, b, direction, |x, y| {
        x.partial_cmp(y).unwrap_or(Ordering::Equal)
    })
}

fn compare_present<T>(
    a: Option<T>,
    b: Option<T>,
    direction: SortDirection,
    cmp: impl Fn(&T, &T) -> Ordering,
) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => directed(cmp(&x, &y), direction),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn directed(ordering: Ordering, direction: SortDirection) -> Ordering {
    match direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

fn sortable_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.date_naive())
        })
}
