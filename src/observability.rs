//! Shared logging configuration and initialization.

use std::env;
use std::net::SocketAddr;

use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn logging_config_from_env() -> LoggingConfig {
    logging_config_from_lookup(|key| env::var(key).ok())
}

/// Unset, blank or unparseable values keep their defaults; logging config
/// never fails startup.
pub fn logging_config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LoggingConfig {
    let get = |key: &str| {
        lookup(key)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
    };
    let defaults = LoggingConfig::default();

    LoggingConfig {
        level: get("EDASH_LOG_LEVEL").unwrap_or(defaults.level),
        format: get("EDASH_LOG_FORMAT")
            .as_deref()
            .and_then(parse_log_format)
            .unwrap_or(defaults.format),
        include_target: get("EDASH_LOG_TARGET")
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(defaults.include_target),
    }
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(config: &LoggingConfig) {
    info!(
        component = "earnings_server",
        event = "app.start",
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_app_bind(bound_addr: SocketAddr) {
    info!(
        component = "earnings_server",
        event = "app.bind",
        bind_addr = %bound_addr,
        routes = "/api/*,/dashboard"
    );
}

pub fn log_fetcher_selected(fetcher: &str, reason: Option<&str>) {
    match reason {
        Some(reason) => info!(
            component = "earnings_server",
            event = "fetcher.selected",
            fetcher,
            reason
        ),
        None => info!(
            component = "earnings_server",
            event = "fetcher.selected",
            fetcher
        ),
    }
}

pub fn log_http_request(route: &'static str, status: u16, results: Option<usize>) {
    match results {
        Some(results) => info!(
            component = "api",
            event = "http.request",
            route,
            status,
            results
        ),
        None if status >= 500 => warn!(
            component = "api",
            event = "http.request",
            route,
            status
        ),
        None => info!(
            component = "api",
            event = "http.request",
            route,
            status
        ),
    }
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> LoggingConfig {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        logging_config_from_lookup(|key| map.get(key).map(|v| (*v).to_string()))
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(load(&[]), LoggingConfig::default());
    }

    #[test]
    fn reads_level_format_and_target() {
        let cfg = load(&[
            ("EDASH_LOG_LEVEL", " earnings_dash=debug,axum=warn "),
            ("EDASH_LOG_FORMAT", "JSON"),
            ("EDASH_LOG_TARGET", "off"),
        ]);

        assert_eq!(cfg.level, "earnings_dash=debug,axum=warn");
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(!cfg.include_target);
    }

    #[test]
    fn bad_values_keep_defaults() {
        let cfg = load(&[
            ("EDASH_LOG_LEVEL", "  "),
            ("EDASH_LOG_FORMAT", "yaml"),
            ("EDASH_LOG_TARGET", "maybe"),
        ]);

        assert_eq!(cfg, LoggingConfig::default());
    }

    #[test]
    fn bool_flags_accept_common_spellings() {
        for raw in ["1", "true", " YES ", "on"] {
            assert_eq!(parse_bool(raw), Some(true), "{raw}");
        }
        for raw in ["0", "False", "no", "OFF"] {
            assert_eq!(parse_bool(raw), Some(false), "{raw}");
        }
        assert_eq!(parse_bool("watched"), None);
    }
}
