//! Raw calendar entries -> normalized earnings rows with surprise metrics.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::tickers::TickerLookup;

/// One entry of the upstream `earningsCalendar` array. EPS fields arrive as
/// numbers, numeric strings, `null`, or are missing altogether. Every other
/// field is coerced on read; a value of the wrong shape becomes empty instead
/// of rejecting the entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEarningsEntry {
    #[serde(default, deserialize_with = "lenient_string")]
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(default)]
    pub eps_actual: Option<Value>,
    #[serde(default)]
    pub eps_estimate: Option<Value>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub hour: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub quarter: Option<u32>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub year: Option<i32>,
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(lenient_opt_string(deserializer)?.unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        _ => None,
    })
}

/// Whole numbers, integral floats and numeric strings.
fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|v| v.fract() == 0.0 && v.is_finite())
                .map(|v| v as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(integer_value(&value).and_then(|v| u32::try_from(v).ok()))
}

fn lenient_i32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i32>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(integer_value(&value).and_then(|v| i32::try_from(v).ok()))
}

impl RawEarningsEntry {
    pub fn new(symbol: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            date: date.into(),
            ..Self::default()
        }
    }

    pub fn with_eps(mut self, actual: Option<Value>, estimate: Option<Value>) -> Self {
        self.eps_actual = actual;
        self.eps_estimate = estimate;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEarnings {
    pub symbol: String,
    pub date: String,
    pub actual: Option<f64>,
    pub estimate: Option<f64>,
    pub surprise: Option<f64>,
    pub surprise_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarter: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

pub fn normalize(raw: &RawEarningsEntry, tickers: Option<&dyn TickerLookup>) -> NormalizedEarnings {
    let actual = parse_eps(raw.eps_actual.as_ref());
    let estimate = parse_eps(raw.eps_estimate.as_ref());
    let (surprise, surprise_percent) = surprise_metrics(actual, estimate);
    let meta = tickers.and_then(|lookup| lookup.lookup(&raw.symbol));

    NormalizedEarnings {
        symbol: raw.symbol.clone(),
        date: raw.date.clone(),
        actual,
        estimate,
        surprise,
        surprise_percent,
        hour: raw.hour.clone().filter(|hour| !hour.trim().is_empty()),
        quarter: raw.quarter,
        year: raw.year,
        exchange: meta.and_then(|m| non_empty(&m.exchange)),
        description: meta.and_then(|m| non_empty(&m.description)),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn normalize_batch(
    raws: &[RawEarningsEntry],
    tickers: Option<&dyn TickerLookup>,
) -> Vec<NormalizedEarnings> {
    raws.iter().map(|raw| normalize(raw, tickers)).collect()
}

/// Drops entries whose symbol is not in the reference set, keeping input order.
pub fn retain_known_symbols(
    raws: Vec<RawEarningsEntry>,
    tickers: &dyn TickerLookup,
) -> Vec<RawEarningsEntry> {
    raws.into_iter()
        .filter(|raw| tickers.contains(&raw.symbol))
        .collect()
}

/// Numbers are taken as-is, strings are parsed as `f64`. Everything else,
/// including empty strings and non-finite results, is absent.
pub fn parse_eps(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// `(actual - estimate, (actual - estimate) / |estimate| * 100)`; the percent
/// is absent for a zero estimate.
pub fn surprise_metrics(actual: Option<f64>, estimate: Option<f64>) -> (Option<f64>, Option<f64>) {
    let (Some(actual), Some(estimate)) = (actual, estimate) else {
        return (None, None);
    };

    let surprise = actual - estimate;
    let percent = if estimate != 0.0 {
        Some(surprise / estimate.abs() * 100.0)
    } else {
        None
    };

    (Some(surprise), percent.filter(|v| v.is_finite()))
}
