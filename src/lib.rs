//! Earnings calendar dashboard core crate.
//!
//! Current implemented scope:
//! - calendar date ranges (year, quarter, relative windows)
//! - normalization of upstream EPS entries with surprise metrics
//! - tri-state column sorting
//! - Finnhub calendar client, ticker directory and persisted watchlist
//! - JSON API routes and the server-rendered dashboard page

mod api;
mod config;
mod dashboard;
mod date_range;
mod finnhub;
mod normalize;
mod observability;
mod sorting;
mod tickers;
mod watchlist;

pub use api::{
    api_router, earliest_entry, ApiError, ApiSettings, ApiState, DateAnchor, ListOptions,
    ListParams, UpcomingEarning, WINDOW_DAYS,
};
pub use config::{AppConfig, ConfigError, DEFAULT_TRACKED_SYMBOLS};
pub use dashboard::{
    format_money, format_percent, format_surprise, render_dashboard_html, render_error_html,
    DashboardPage, DashboardQuery, DashboardView, Period, DASHBOARD_HEADERS,
};
pub use date_range::{
    current_period, format_day, parse_day, parse_quarter, parse_year, resolve_range, today_in,
    CalendarYear, DateRange, Quarter, RangeError, RangeMode,
};
pub use finnhub::{
    demo_entries, parse_calendar_payload, CalendarFetcher, CalendarQuery, FetchError,
    FinnhubClient, FinnhubConfig, InMemoryCalendarFetcher, DEFAULT_FINNHUB_BASE_URL,
};
pub use normalize::{
    normalize, normalize_batch, parse_eps, retain_known_symbols, surprise_metrics,
    NormalizedEarnings, RawEarningsEntry,
};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_fetcher_selected, log_http_request,
    logging_config_from_env, logging_config_from_lookup, LogFormat, LoggingConfig,
    LoggingInitError,
};
pub use sorting::{
    apply_sort_state, compare_records, next_sort_state, sort_by, sort_in_place, SortDirection,
    SortField, SortState,
};
pub use tickers::{TickerDirectory, TickerLoadError, TickerLookup, TickerMeta};
pub use watchlist::{Watchlist, WatchlistError, WatchlistStore};
