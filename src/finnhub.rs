//! Finnhub earnings-calendar client.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::date_range::{format_day, parse_day, DateRange};
use crate::normalize::RawEarningsEntry;

pub const DEFAULT_FINNHUB_BASE_URL: &str = "https://finnhub.io/api/v1";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarQuery {
    pub range: Option<DateRange>,
    pub symbol: Option<String>,
}

impl CalendarQuery {
    pub fn for_range(range: DateRange) -> Self {
        Self {
            range: Some(range),
            symbol: None,
        }
    }

    pub fn for_symbol(symbol: impl Into<String>, range: Option<DateRange>) -> Self {
        Self {
            range,
            symbol: Some(symbol.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP client build error: {0}")]
    ClientBuild(String),
    #[error("invalid upstream URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("upstream returned HTTP status {status}")]
    Status { status: u16 },
    #[error("malformed upstream payload: {0}")]
    Decode(String),
}

/// Source of raw earnings calendar entries.
pub trait CalendarFetcher: Send + Sync + 'static {
    fn fetch_calendar(&self, query: &CalendarQuery) -> Result<Vec<RawEarningsEntry>, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinnhubConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
}

impl FinnhubConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_FINNHUB_BASE_URL.to_string(),
            api_key: api_key.into(),
            timeout_ms: 15_000,
        }
    }
}

pub struct FinnhubClient {
    client: reqwest::blocking::Client,
    cfg: FinnhubConfig,
}

impl FinnhubClient {
    pub fn new(cfg: FinnhubConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|err| FetchError::ClientBuild(err.to_string()))?;
        Ok(Self { client, cfg })
    }

    /// Full request URL including the API token.
    pub fn calendar_url(&self, query: &CalendarQuery) -> Result<Url, FetchError> {
        let endpoint = format!("{}/calendar/earnings", self.cfg.base_url.trim_end_matches('/'));
        let mut url = Url::parse(&endpoint).map_err(|err| FetchError::InvalidUrl {
            url: endpoint.clone(),
            message: err.to_string(),
        })?;

        {
            let mut pairs = url.query_pairs_mut();
            if let Some(symbol) = &query.symbol {
                pairs.append_pair("symbol", symbol);
            }
            if let Some(range) = &query.range {
                pairs.append_pair("from", &range.from_text());
                pairs.append_pair("to", &range.to_text());
            }
            pairs.append_pair("token", &self.cfg.api_key);
        }

        Ok(url)
    }
}

impl CalendarFetcher for FinnhubClient {
    fn fetch_calendar(&self, query: &CalendarQuery) -> Result<Vec<RawEarningsEntry>, FetchError> {
        let url = self.calendar_url(query)?;
        let started = Instant::now();
        let range = query.range.map(|r| r.to_string());

        let response = self.client.get(url).send().map_err(|err| {
            let err = FetchError::Transport(err.without_url().to_string());
            log_fetch_error(query, &err);
            err
        })?;

        let status = response.status();
        if !status.is_success() {
            let err = FetchError::Status {
                status: status.as_u16(),
            };
            log_fetch_error(query, &err);
            return Err(err);
        }

        let bytes = response.bytes().map_err(|err| {
            let err = FetchError::Transport(err.without_url().to_string());
            log_fetch_error(query, &err);
            err
        })?;

        let entries =
            parse_calendar_payload(&bytes).inspect_err(|err| log_fetch_error(query, err))?;

        info!(
            component = "finnhub",
            event = "upstream.fetch",
            symbol = query.symbol.as_deref().unwrap_or("*"),
            range = range.as_deref().unwrap_or("*"),
            entries = entries.len(),
            elapsed_ms = started.elapsed().as_millis() as u64
        );

        Ok(entries)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarPayload {
    #[serde(default)]
    earnings_calendar: Value,
}

/// A missing or non-array `earningsCalendar` is an empty calendar. Items that
/// are not objects are skipped; mistyped fields inside an entry are coerced.
pub fn parse_calendar_payload(bytes: &[u8]) -> Result<Vec<RawEarningsEntry>, FetchError> {
    let payload: CalendarPayload =
        serde_json::from_slice(bytes).map_err(|err| FetchError::Decode(err.to_string()))?;

    let Value::Array(items) = payload.earnings_calendar else {
        return Ok(Vec::new());
    };

    let mut entries = Vec::with_capacity(items.len());
    for (idx, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<RawEarningsEntry>(item) {
            Ok(entry) => entries.push(entry),
            Err(err) => debug!(
                component = "finnhub",
                event = "upstream.entry_skipped",
                index = idx,
                error = %err
            ),
        }
    }

    Ok(entries)
}

fn log_fetch_error(query: &CalendarQuery, err: &FetchError) {
    let range = query.range.map(|r| r.to_string());
    warn!(
        component = "finnhub",
        event = "upstream.error",
        symbol = query.symbol.as_deref().unwrap_or("*"),
        range = range.as_deref().unwrap_or("*"),
        error = %err
    );
}

/// Serves a fixed entry set, applying the same range and symbol filters as
/// the upstream endpoint. Records every query it receives.
#[derive(Clone, Default)]
pub struct InMemoryCalendarFetcher {
    entries: Arc<Vec<RawEarningsEntry>>,
    queries: Arc<Mutex<Vec<CalendarQuery>>>,
    failure: Option<u16>,
}

impl InMemoryCalendarFetcher {
    pub fn new(entries: Vec<RawEarningsEntry>) -> Self {
        Self {
            entries: Arc::new(entries),
            ..Self::default()
        }
    }

    /// Every fetch fails with the given upstream status.
    pub fn failing(status: u16) -> Self {
        Self {
            failure: Some(status),
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<CalendarQuery> {
        self.queries
            .lock()
            .expect("query log lock should not be poisoned")
            .clone()
    }
}

impl CalendarFetcher for InMemoryCalendarFetcher {
    fn fetch_calendar(&self, query: &CalendarQuery) -> Result<Vec<RawEarningsEntry>, FetchError> {
        self.queries
            .lock()
            .expect("query log lock should not be poisoned")
            .push(query.clone());

        if let Some(status) = self.failure {
            let err = FetchError::Status { status };
            log_fetch_error(query, &err);
            return Err(err);
        }

        let entries: Vec<RawEarningsEntry> = self
            .entries
            .iter()
            .filter(|entry| match &query.symbol {
                Some(symbol) => entry.symbol.eq_ignore_ascii_case(symbol),
                None => true,
            })
            .filter(|entry| match (&query.range, parse_day(&entry.date)) {
                (Some(range), Some(day)) => range.contains(day),
                (Some(_), None) => false,
                (None, _) => true,
            })
            .cloned()
            .collect();

        let range = query.range.map(|r| r.to_string());
        info!(
            component = "finnhub",
            event = "upstream.fetch",
            source = "in_memory",
            symbol = query.symbol.as_deref().unwrap_or("*"),
            range = range.as_deref().unwrap_or("*"),
            entries = entries.len()
        );

        Ok(entries)
    }
}

/// Sample calendar anchored on `today`, used when the server runs in demo mode.
pub fn demo_entries(today: chrono::NaiveDate) -> Vec<RawEarningsEntry> {
    use serde_json::json;

    let rows: [(&str, i64, Value, Value, &str); 10] = [
        ("AAPL", -20, json!(2.40), json!(2.35), "amc"),
        ("MSFT", -12, json!("3.46"), json!("3.22"), "amc"),
        ("INTC", -5, json!(-0.02), json!(0.01), "amc"),
        ("IBM", -1, json!(1.60), json!(0), "bmo"),
        ("ORCL", 0, Value::Null, json!(1.48), "amc"),
        ("NVDA", 0, Value::Null, json!(0.85), "amc"),
        ("ADBE", 1, Value::Null, json!(4.97), "amc"),
        ("CRM", 9, Value::Null, json!("2.44"), "amc"),
        ("GOOGL", 18, Value::Null, json!(2.01), "amc"),
        ("AMZN", 27, Value::Null, json!(""), "amc"),
    ];

    rows.into_iter()
        .map(|(symbol, offset, actual, estimate, hour)| {
            let day = today + chrono::Duration::days(offset);
            let mut entry = RawEarningsEntry::new(symbol, format_day(day))
                .with_eps(Some(actual), Some(estimate));
            entry.hour = Some(hour.to_string());
            entry
        })
        .collect()
}
