//! JSON routes over the earnings calendar, tickers and watchlist.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dashboard::get_dashboard;
use crate::date_range::{
    format_day, parse_day, parse_quarter, parse_year, resolve_range, today_in, DateRange,
    RangeError, RangeMode,
};
use crate::finnhub::{CalendarFetcher, CalendarQuery, FetchError};
use crate::normalize::{
    normalize_batch, retain_known_symbols, NormalizedEarnings, RawEarningsEntry,
};
use crate::observability::{log_http_request, parse_bool};
use crate::sorting::{apply_sort_state, SortDirection, SortField, SortState};
use crate::tickers::{TickerDirectory, TickerMeta};
use crate::watchlist::{Watchlist, WatchlistError, WatchlistStore};

pub const WINDOW_DAYS: u32 = 30;

/// Where "today" comes from for relative windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateAnchor {
    Zone(Tz),
    Fixed(NaiveDate),
}

impl DateAnchor {
    pub fn today(self) -> NaiveDate {
        match self {
            Self::Zone(tz) => today_in(tz),
            Self::Fixed(day) => day,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub anchor: DateAnchor,
    pub tracked_symbols: Vec<String>,
    pub upcoming_window_days: u32,
}

#[derive(Clone)]
pub struct ApiState {
    pub fetcher: Arc<dyn CalendarFetcher>,
    pub tickers: Arc<TickerDirectory>,
    pub watchlist: Arc<WatchlistStore>,
    pub settings: Arc<ApiSettings>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Upstream(#[from] FetchError),
    #[error(transparent)]
    Watchlist(#[from] WatchlistError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RangeError> for ApiError {
    fn from(err: RangeError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Watchlist(WatchlistError::InvalidSymbol(_)) => StatusCode::BAD_REQUEST,
            Self::Watchlist(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message; upstream and storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::BadRequest(message) => message.clone(),
            Self::Upstream(_) => "Failed to fetch from Finnhub".to_string(),
            Self::Watchlist(WatchlistError::InvalidSymbol(symbol)) => {
                format!("invalid symbol: {symbol:?}")
            }
            Self::Watchlist(_) | Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Query parameters shared by every list route. Blank values count as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub year: Option<String>,
    pub quarter: Option<String>,
    pub symbol: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub watchlist: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListOptions {
    pub sort: SortState,
    pub watchlist_only: bool,
}

impl ListParams {
    fn get(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// `dir` without `sort` is ignored; `sort` without `dir` sorts ascending.
    pub fn options(&self) -> Result<ListOptions, ApiError> {
        let mut options = ListOptions::default();

        if let Some(raw) = Self::get(&self.sort) {
            let field = SortField::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown sort field: {raw:?}")))?;
            let direction = match Self::get(&self.dir) {
                Some(raw) => SortDirection::parse(raw).ok_or_else(|| {
                    ApiError::BadRequest(format!("unknown sort direction: {raw:?}"))
                })?,
                None => SortDirection::Asc,
            };
            options.sort = SortState::by(field, direction);
        }

        if let Some(raw) = Self::get(&self.watchlist) {
            options.watchlist_only = parse_bool(raw).ok_or_else(|| {
                ApiError::BadRequest(format!("invalid watchlist flag: {raw:?}"))
            })?;
        }

        Ok(options)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsResponse {
    pub earnings: Vec<NormalizedEarnings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayResponse {
    pub earnings: Vec<NormalizedEarnings>,
    pub date: String,
    pub total_found: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowResponse {
    pub earnings: Vec<NormalizedEarnings>,
    pub date_range: DateRange,
    pub total_found: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpcomingEarning {
    pub symbol: String,
    pub date: Option<String>,
    pub hour: Option<String>,
    pub quarter: Option<u32>,
    pub year: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingResponse {
    pub upcoming_earnings: Vec<UpcomingEarning>,
    pub date_range: DateRange,
    pub total_found: usize,
}

#[derive(Debug, Serialize)]
pub struct TickersResponse {
    pub tickers: Vec<TickerMeta>,
}

#[derive(Debug, Serialize)]
pub struct WatchlistResponse {
    pub symbols: Vec<String>,
}

trait ResultCount {
    fn result_count(&self) -> usize;
}

impl ResultCount for EarningsResponse {
    fn result_count(&self) -> usize {
        self.earnings.len()
    }
}

impl ResultCount for DayResponse {
    fn result_count(&self) -> usize {
        self.total_found
    }
}

impl ResultCount for WindowResponse {
    fn result_count(&self) -> usize {
        self.total_found
    }
}

impl ResultCount for UpcomingResponse {
    fn result_count(&self) -> usize {
        self.upcoming_earnings.len()
    }
}

impl ResultCount for TickersResponse {
    fn result_count(&self) -> usize {
        self.tickers.len()
    }
}

impl ResultCount for WatchlistResponse {
    fn result_count(&self) -> usize {
        self.symbols.len()
    }
}

pub fn api_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/earnings-calendar", get(get_earnings_calendar))
        .route("/api/earnings", get(get_earnings))
        .route("/api/earnings-today", get(get_earnings_today))
        .route("/api/earnings-tomorrow", get(get_earnings_tomorrow))
        .route("/api/earnings-next-30-days", get(get_earnings_next_30_days))
        .route(
            "/api/earnings-previous-30-days",
            get(get_earnings_previous_30_days),
        )
        .route("/api/upcoming-earnings", get(get_upcoming_earnings))
        .route("/api/tickers", get(get_tickers))
        .route("/api/watchlist", get(get_watchlist))
        .route(
            "/api/watchlist/{symbol}",
            put(put_watchlist_symbol).delete(delete_watchlist_symbol),
        )
        .route("/dashboard", get(get_dashboard))
        .with_state(state)
}

fn respond<T: Serialize + ResultCount>(
    route: &'static str,
    result: Result<T, ApiError>,
) -> Result<Json<T>, ApiError> {
    match result {
        Ok(body) => {
            log_http_request(route, StatusCode::OK.as_u16(), Some(body.result_count()));
            Ok(Json(body))
        }
        Err(err) => {
            log_http_request(route, err.status().as_u16(), None);
            Err(err)
        }
    }
}

pub(crate) async fn fetch_entries(
    state: &ApiState,
    query: CalendarQuery,
) -> Result<Vec<RawEarningsEntry>, ApiError> {
    let fetcher = Arc::clone(&state.fetcher);
    let entries = tokio::task::spawn_blocking(move || fetcher.fetch_calendar(&query))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))??;
    Ok(entries)
}

/// Fetches a relative window, keeps directory symbols only and normalizes.
pub(crate) async fn load_window(
    state: &ApiState,
    mode: RangeMode,
) -> Result<(DateRange, Vec<NormalizedEarnings>), ApiError> {
    let range = resolve_range(mode, state.settings.anchor.today());
    let raws = fetch_entries(state, CalendarQuery::for_range(range)).await?;
    let known = retain_known_symbols(raws, state.tickers.as_ref());
    Ok((range, normalize_batch(&known, Some(state.tickers.as_ref()))))
}

/// Watchlist filter first, then the requested sort.
pub(crate) fn finish_listing(
    state: &ApiState,
    records: Vec<NormalizedEarnings>,
    options: ListOptions,
) -> Vec<NormalizedEarnings> {
    let records = if options.watchlist_only {
        state.watchlist.snapshot().filter_watched(records)
    } else {
        records
    };
    apply_sort_state(records, options.sort)
}

async fn get_earnings_calendar(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<EarningsResponse>, ApiError> {
    respond("/api/earnings-calendar", earnings_calendar(&state, &params).await)
}

async fn earnings_calendar(
    state: &ApiState,
    params: &ListParams,
) -> Result<EarningsResponse, ApiError> {
    let raw_year = ListParams::get(&params.year)
        .ok_or_else(|| ApiError::BadRequest("Missing year parameter".to_string()))?;
    let options = params.options()?;
    let year = parse_year(raw_year)?;
    let quarter = ListParams::get(&params.quarter).and_then(parse_quarter);

    let range = resolve_range(
        RangeMode::for_year(year, quarter),
        state.settings.anchor.today(),
    );
    let raws = fetch_entries(state, CalendarQuery::for_range(range)).await?;
    let records = normalize_batch(&raws, Some(state.tickers.as_ref()));

    Ok(EarningsResponse {
        earnings: finish_listing(state, records, options),
        date_range: Some(range),
    })
}

async fn get_earnings(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<EarningsResponse>, ApiError> {
    respond("/api/earnings", symbol_earnings(&state, &params).await)
}

async fn symbol_earnings(
    state: &ApiState,
    params: &ListParams,
) -> Result<EarningsResponse, ApiError> {
    let symbol = ListParams::get(&params.symbol)
        .ok_or_else(|| ApiError::BadRequest("Missing symbol parameter".to_string()))?;
    let options = params.options()?;

    let range = match ListParams::get(&params.year) {
        Some(raw_year) => {
            let year = parse_year(raw_year)?;
            let quarter = ListParams::get(&params.quarter).and_then(parse_quarter);
            Some(resolve_range(
                RangeMode::for_year(year, quarter),
                state.settings.anchor.today(),
            ))
        }
        None => None,
    };

    let raws = fetch_entries(state, CalendarQuery::for_symbol(symbol, range)).await?;
    let records = normalize_batch(&raws, Some(state.tickers.as_ref()));

    Ok(EarningsResponse {
        earnings: finish_listing(state, records, options),
        date_range: range,
    })
}

async fn get_earnings_today(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<DayResponse>, ApiError> {
    respond(
        "/api/earnings-today",
        day_listing(&state, &params, RangeMode::Today).await,
    )
}

async fn get_earnings_tomorrow(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<DayResponse>, ApiError> {
    respond(
        "/api/earnings-tomorrow",
        day_listing(&state, &params, RangeMode::Tomorrow).await,
    )
}

/// Single-day listings default to symbol order when no sort is requested.
async fn day_listing(
    state: &ApiState,
    params: &ListParams,
    mode: RangeMode,
) -> Result<DayResponse, ApiError> {
    let mut options = params.options()?;
    if options.sort.active().is_none() {
        options.sort = SortState::by(SortField::Symbol, SortDirection::Asc);
    }

    let (range, records) = load_window(state, mode).await?;
    let earnings = finish_listing(state, records, options);

    Ok(DayResponse {
        total_found: earnings.len(),
        date: range.from_text(),
        earnings,
    })
}

async fn get_earnings_next_30_days(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<WindowResponse>, ApiError> {
    respond(
        "/api/earnings-next-30-days",
        window_listing(&state, &params, RangeMode::NextNDays(WINDOW_DAYS)).await,
    )
}

async fn get_earnings_previous_30_days(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<WindowResponse>, ApiError> {
    respond(
        "/api/earnings-previous-30-days",
        window_listing(&state, &params, RangeMode::PreviousNDays(WINDOW_DAYS)).await,
    )
}

async fn window_listing(
    state: &ApiState,
    params: &ListParams,
    mode: RangeMode,
) -> Result<WindowResponse, ApiError> {
    let options = params.options()?;
    let (range, records) = load_window(state, mode).await?;
    let earnings = finish_listing(state, records, options);

    Ok(WindowResponse {
        total_found: earnings.len(),
        date_range: range,
        earnings,
    })
}

async fn get_upcoming_earnings(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<UpcomingResponse>, ApiError> {
    respond(
        "/api/upcoming-earnings",
        upcoming_earnings(&state, &params).await,
    )
}

async fn upcoming_earnings(
    state: &ApiState,
    params: &ListParams,
) -> Result<UpcomingResponse, ApiError> {
    let options = params.options()?;
    let range = resolve_range(
        RangeMode::NextNDays(state.settings.upcoming_window_days),
        state.settings.anchor.today(),
    );
    let raws = fetch_entries(state, CalendarQuery::for_range(range)).await?;

    let watchlist = state.watchlist.snapshot();
    let symbols = state
        .settings
        .tracked_symbols
        .iter()
        .filter(|symbol| !options.watchlist_only || watchlist.contains(symbol));
    let upcoming_earnings: Vec<UpcomingEarning> = symbols
        .map(|symbol| earliest_entry(symbol, &raws))
        .collect();

    Ok(UpcomingResponse {
        total_found: upcoming_earnings.iter().filter(|e| e.date.is_some()).count(),
        upcoming_earnings,
        date_range: range,
    })
}

/// Earliest dated entry for `symbol`; all fields null when there is none.
pub fn earliest_entry(symbol: &str, raws: &[RawEarningsEntry]) -> UpcomingEarning {
    let earliest = raws
        .iter()
        .filter(|raw| raw.symbol == symbol)
        .filter_map(|raw| parse_day(&raw.date).map(|day| (day, raw)))
        .min_by_key(|(day, _)| *day)
        .map(|(_, raw)| raw);

    match earliest {
        Some(raw) => UpcomingEarning {
            symbol: symbol.to_string(),
            date: parse_day(&raw.date).map(format_day),
            hour: raw.hour.clone().filter(|hour| !hour.trim().is_empty()),
            quarter: raw.quarter,
            year: raw.year,
        },
        None => UpcomingEarning {
            symbol: symbol.to_string(),
            date: None,
            hour: None,
            quarter: None,
            year: None,
        },
    }
}

async fn get_tickers(State(state): State<ApiState>) -> Result<Json<TickersResponse>, ApiError> {
    respond(
        "/api/tickers",
        Ok(TickersResponse {
            tickers: state.tickers.all().to_vec(),
        }),
    )
}

async fn get_watchlist(State(state): State<ApiState>) -> Result<Json<WatchlistResponse>, ApiError> {
    let symbols = state.watchlist.snapshot().all().iter().cloned().collect();
    respond("/api/watchlist", Ok(WatchlistResponse { symbols }))
}

async fn put_watchlist_symbol(
    State(state): State<ApiState>,
    Path(symbol): Path<String>,
) -> Result<Json<WatchlistResponse>, ApiError> {
    let result = update_watchlist(&state, move |store| store.add(&symbol)).await;
    respond("/api/watchlist/{symbol}", result)
}

async fn delete_watchlist_symbol(
    State(state): State<ApiState>,
    Path(symbol): Path<String>,
) -> Result<Json<WatchlistResponse>, ApiError> {
    let result = update_watchlist(&state, move |store| store.remove(&symbol)).await;
    respond("/api/watchlist/{symbol}", result)
}

/// Store writes touch the filesystem, so they run off the async workers.
async fn update_watchlist(
    state: &ApiState,
    f: impl FnOnce(&WatchlistStore) -> Result<Watchlist, WatchlistError>
        + Send
        + 'static,
) -> Result<WatchlistResponse, ApiError> {
    let store = Arc::clone(&state.watchlist);
    let watchlist = tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))??;

    Ok(WatchlistResponse {
        symbols: watchlist.all().iter().cloned().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        let mut out = ListParams::default();
        for (key, value) in pairs {
            let value = Some((*value).to_string());
            match *key {
                "sort" => out.sort = value,
                "dir" => out.dir = value,
                "watchlist" => out.watchlist = value,
                other => panic!("unexpected key {other}"),
            }
        }
        out
    }

    #[test]
    fn options_default_to_unsorted_and_unfiltered() {
        assert_eq!(params(&[]).options().unwrap(), ListOptions::default());
        assert_eq!(
            params(&[("dir", "desc")]).options().unwrap(),
            ListOptions::default()
        );
        assert_eq!(
            params(&[("sort", " "), ("watchlist", "")]).options().unwrap(),
            ListOptions::default()
        );
    }

    #[test]
    fn options_parse_sort_direction_and_watchlist() {
        let options = params(&[
            ("sort", "surprisePercent"),
            ("dir", "DESC"),
            ("watchlist", "true"),
        ])
        .options()
        .unwrap();
        assert_eq!(
            options.sort,
            SortState::by(SortField::SurprisePercent, SortDirection::Desc)
        );
        assert!(options.watchlist_only);

        let options = params(&[("sort", "date")]).options().unwrap();
        assert_eq!(options.sort, SortState::by(SortField::Date, SortDirection::Asc));
    }

    #[test]
    fn bad_options_are_client_errors() {
        for bad in [
            params(&[("sort", "revenue")]),
            params(&[("sort", "date"), ("dir", "sideways")]),
            params(&[("watchlist", "perhaps")]),
        ] {
            let err = bad.options().unwrap_err();
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn error_statuses_and_messages() {
        let upstream = ApiError::from(FetchError::Status { status: 429 });
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(upstream.public_message(), "Failed to fetch from Finnhub");

        let invalid = ApiError::from(WatchlistError::InvalidSymbol("a b".to_string()));
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let io = ApiError::from(WatchlistError::Io {
            path: "/tmp/w.json".into(),
            source: std::io::Error::other("disk full"),
        });
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!io.public_message().contains("disk full"));

        let year = ApiError::from(parse_year("25").unwrap_err());
        assert_eq!(year.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn earliest_entry_picks_first_date_for_symbol() {
        let raws: Vec<RawEarningsEntry> = serde_json::from_value(json!([
            {"symbol": "AAPL", "date": "2025-10-30", "hour": "amc", "quarter": 4, "year": 2025},
            {"symbol": "MSFT", "date": "2025-07-20"},
            {"symbol": "AAPL", "date": "2025-07-31", "hour": "amc", "quarter": 3, "year": 2025},
            {"symbol": "AAPL", "date": "not a date"}
        ]))
        .unwrap();

        let out = earliest_entry("AAPL", &raws);
        assert_eq!(out.date.as_deref(), Some("2025-07-31"));
        assert_eq!(out.quarter, Some(3));
        assert_eq!(out.hour.as_deref(), Some("amc"));

        let missing = earliest_entry("TSLA", &raws);
        assert_eq!(missing.symbol, "TSLA");
        assert_eq!(missing.date, None);
        assert_eq!(missing.year, None);
        let json = serde_json::to_value(&missing).unwrap();
        assert!(json["date"].is_null());
        assert!(json["hour"].is_null());
    }

    #[test]
    fn fixed_anchor_ignores_clock() {
        let day = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
        assert_eq!(DateAnchor::Fixed(day).today(), day);
    }
}
