use std::io;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::NaiveDate;
use earnings_dash::{
    api_router, log_app_bind, log_app_start, log_fetcher_selected, ApiSettings, ApiState,
    CalendarFetcher, CalendarQuery, DateAnchor, FetchError, InMemoryCalendarFetcher,
    LoggingConfig, TickerDirectory, Watchlist, WatchlistStore,
};
use tower::util::ServiceExt;
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

fn state(fetcher: InMemoryCalendarFetcher) -> ApiState {
    ApiState {
        fetcher: Arc::new(fetcher),
        tickers: Arc::new(TickerDirectory::default()),
        watchlist: Arc::new(WatchlistStore::in_memory(Watchlist::new())),
        settings: Arc::new(ApiSettings {
            anchor: DateAnchor::Fixed(NaiveDate::from_ymd_opt(2025, 7, 15).unwrap()),
            tracked_symbols: vec!["AAPL".to_string()],
            upcoming_window_days: 180,
        }),
    }
}

fn run_request(state: ApiState, uri: &str) -> StatusCode {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("single-thread runtime should build");

    rt.block_on(async {
        api_router(state)
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should be served")
            .status()
    })
}

#[test]
fn server_lifecycle_helpers_emit_baseline_events() {
    let logs = capture_logs(Level::INFO, || {
        let cfg = LoggingConfig::default();
        log_app_start(&cfg);
        log_fetcher_selected("demo", Some("EDASH_USE_DEMO"));
        log_app_bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080));
    });

    assert!(logs.contains("\"event\":\"app.start\""));
    assert!(logs.contains("\"event\":\"fetcher.selected\""));
    assert!(logs.contains("\"reason\":\"EDASH_USE_DEMO\""));
    assert!(logs.contains("\"event\":\"app.bind\""));
}

#[test]
fn fetcher_logs_upstream_fetch_and_error() {
    let logs = capture_logs(Level::INFO, || {
        let ok = InMemoryCalendarFetcher::default();
        ok.fetch_calendar(&CalendarQuery::for_symbol("AAPL", None))
            .expect("in-memory fetch should succeed");

        let err = InMemoryCalendarFetcher::failing(503)
            .fetch_calendar(&CalendarQuery::default())
            .expect_err("failing fetcher should error");
        assert!(matches!(err, FetchError::Status { status: 503 }));
    });

    assert!(logs.contains("\"event\":\"upstream.fetch\""));
    assert!(logs.contains("\"symbol\":\"AAPL\""));
    assert!(logs.contains("\"event\":\"upstream.error\""));
    assert!(logs.contains("HTTP status 503"));
}

#[test]
fn watchlist_updates_are_logged() {
    let logs = capture_logs(Level::INFO, || {
        let store = WatchlistStore::in_memory(Watchlist::new());
        store.add("nvda").expect("valid symbol should be added");
        store.remove("NVDA").expect("valid symbol should be removed");
    });

    assert!(logs.contains("\"event\":\"watchlist.update\""));
    assert!(logs.contains("\"action\":\"add\""));
    assert!(logs.contains("\"action\":\"remove\""));
}

#[test]
fn routes_emit_http_request_events_with_status() {
    let logs = capture_logs(Level::INFO, || {
        let status = run_request(state(InMemoryCalendarFetcher::default()), "/api/earnings-today");
        assert_eq!(status, StatusCode::OK);

        let status = run_request(
            state(InMemoryCalendarFetcher::failing(500)),
            "/api/earnings-next-30-days",
        );
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let status = run_request(state(InMemoryCalendarFetcher::default()), "/api/earnings");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    });

    assert!(logs.contains("\"event\":\"http.request\""));
    assert!(logs.contains("\"route\":\"/api/earnings-today\""));
    assert!(logs.contains("\"status\":502"));
    assert!(logs.contains("\"status\":400"));
}
