use std::sync::Arc;

use earnings_dash::{
    api_router, demo_entries, init_logging, log_app_bind, log_app_start, log_fetcher_selected,
    logging_config_from_env, today_in, ApiSettings, ApiState, AppConfig, CalendarFetcher,
    DateAnchor, FinnhubClient, InMemoryCalendarFetcher, TickerDirectory, WatchlistStore,
};

// The Finnhub client is blocking, so it is built before the runtime starts.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let cfg = AppConfig::from_env()?;
    let fetcher = fetcher_from_config(&cfg)?;
    let tickers = TickerDirectory::from_json_path(&cfg.tickers_path)?;
    let watchlist = WatchlistStore::open(&cfg.watchlist_path)?;

    let state = ApiState {
        fetcher,
        tickers: Arc::new(tickers),
        watchlist: Arc::new(watchlist),
        settings: Arc::new(ApiSettings {
            anchor: DateAnchor::Zone(cfg.timezone),
            tracked_symbols: cfg.tracked_symbols.clone(),
            upcoming_window_days: cfg.upcoming_window_days,
        }),
    };

    // Keeps the last handle to the blocking client outside the runtime.
    let fetcher_handle = Arc::clone(&state.fetcher);
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(serve(cfg, state));
    drop(fetcher_handle);

    result
}

async fn serve(cfg: AppConfig, state: ApiState) -> Result<(), Box<dyn std::error::Error>> {
    let app = api_router(state);
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn fetcher_from_config(
    cfg: &AppConfig,
) -> Result<Arc<dyn CalendarFetcher>, Box<dyn std::error::Error>> {
    match cfg.finnhub() {
        Some(finnhub) if !cfg.use_demo => {
            log_fetcher_selected("finnhub", None);
            Ok(Arc::new(FinnhubClient::new(finnhub)?))
        }
        _ => {
            log_fetcher_selected("demo", Some("EDASH_USE_DEMO"));
            let entries = demo_entries(today_in(cfg.timezone));
            Ok(Arc::new(InMemoryCalendarFetcher::new(entries)))
        }
    }
}
