//! Server configuration from environment variables.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono_tz::Tz;
use thiserror::Error;

use crate::finnhub::{FinnhubConfig, DEFAULT_FINNHUB_BASE_URL};
use crate::observability::parse_bool;

pub const DEFAULT_TRACKED_SYMBOLS: [&str; 8] =
    ["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA", "META", "NVDA", "NFLX"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub api_key: Option<String>,
    pub use_demo: bool,
    pub finnhub_base_url: String,
    pub http_timeout_ms: u64,
    pub tickers_path: PathBuf,
    pub watchlist_path: PathBuf,
    pub timezone: Tz,
    pub tracked_symbols: Vec<String>,
    pub upcoming_window_days: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            api_key: None,
            use_demo: false,
            finnhub_base_url: DEFAULT_FINNHUB_BASE_URL.to_string(),
            http_timeout_ms: 15_000,
            tickers_path: PathBuf::from("data/tech_tickers.json"),
            watchlist_path: PathBuf::from("data/watchlist.json"),
            timezone: Tz::UTC,
            tracked_symbols: DEFAULT_TRACKED_SYMBOLS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            upcoming_window_days: 180,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("FINNHUB_API_KEY is required unless EDASH_USE_DEMO is set")]
    MissingApiKey,
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key/value source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };
        let mut cfg = Self::default();

        if let Some(raw) = get("EDASH_USE_DEMO") {
            cfg.use_demo = parse_bool(&raw).ok_or_else(|| invalid("EDASH_USE_DEMO", &raw))?;
        }
        cfg.api_key = get("FINNHUB_API_KEY");
        if cfg.api_key.is_none() && !cfg.use_demo {
            return Err(ConfigError::MissingApiKey);
        }

        if let Some(raw) = get("EDASH_ADDR") {
            cfg.bind_addr = raw.parse().map_err(|_| invalid("EDASH_ADDR", &raw))?;
        }
        if let Some(raw) = get("EDASH_FINNHUB_BASE_URL") {
            cfg.finnhub_base_url = raw;
        }
        if let Some(raw) = get("EDASH_HTTP_TIMEOUT_MS") {
            cfg.http_timeout_ms = raw
                .parse()
                .map_err(|_| invalid("EDASH_HTTP_TIMEOUT_MS", &raw))?;
        }
        if let Some(raw) = get("EDASH_TICKERS_PATH") {
            cfg.tickers_path = PathBuf::from(raw);
        }
        if let Some(raw) = get("EDASH_WATCHLIST_PATH") {
            cfg.watchlist_path = PathBuf::from(raw);
        }
        if let Some(raw) = get("EDASH_TIMEZONE") {
            cfg.timezone = raw.parse().map_err(|_| invalid("EDASH_TIMEZONE", &raw))?;
        }
        if let Some(raw) = get("EDASH_TRACKED_SYMBOLS") {
            let symbols: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_ascii_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if symbols.is_empty() {
                return Err(invalid("EDASH_TRACKED_SYMBOLS", &raw));
            }
            cfg.tracked_symbols = symbols;
        }
        if let Some(raw) = get("EDASH_UPCOMING_WINDOW_DAYS") {
            cfg.upcoming_window_days = raw
                .parse()
                .map_err(|_| invalid("EDASH_UPCOMING_WINDOW_DAYS", &raw))?;
        }

        Ok(cfg)
    }

    /// `None` in demo mode without a key.
    pub fn finnhub(&self) -> Option<FinnhubConfig> {
        let api_key = self.api_key.clone()?;
        Some(FinnhubConfig {
            base_url: self.finnhub_base_url.clone(),
            api_key,
            timeout_ms: self.http_timeout_ms,
        })
    }
}

fn invalid(var: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    }
}
