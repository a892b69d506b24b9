//! Static ticker reference data (symbol -> exchange/description).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerMeta {
    pub symbol: String,
    #[serde(default)]
    pub exchange: String,
    #[serde(default)]
    pub description: String,
}

/// Read-only symbol lookup used to enrich normalized records.
pub trait TickerLookup: Send + Sync {
    fn lookup(&self, symbol: &str) -> Option<&TickerMeta>;

    fn contains(&self, symbol: &str) -> bool {
        self.lookup(symbol).is_some()
    }
}

#[derive(Debug, Error)]
pub enum TickerLoadError {
    #[error("failed to read tickers file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid tickers JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickerDirectory {
    entries: Vec<TickerMeta>,
    by_symbol: HashMap<String, usize>,
}

impl TickerDirectory {
    /// Keeps the first entry for duplicated symbols and preserves file order.
    pub fn from_entries(entries: impl IntoIterator<Item = TickerMeta>) -> Self {
        let mut out = Self::default();
        for entry in entries {
            if out.by_symbol.contains_key(&entry.symbol) {
                warn!(
                    component = "tickers",
                    event = "tickers.duplicate",
                    symbol = %entry.symbol
                );
                continue;
            }
            out.by_symbol.insert(entry.symbol.clone(), out.entries.len());
            out.entries.push(entry);
        }
        out
    }

    pub fn from_json_str(raw: &str) -> Result<Self, TickerLoadError> {
        let entries: Vec<TickerMeta> = serde_json::from_str(raw)?;
        Ok(Self::from_entries(entries))
    }

    pub fn from_json_path(path: &Path) -> Result<Self, TickerLoadError> {
        let raw = fs::read_to_string(path).map_err(|source| TickerLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let directory = Self::from_json_str(&raw)?;
        info!(
            component = "tickers",
            event = "tickers.loaded",
            path = %path.display(),
            count = directory.len()
        );
        Ok(directory)
    }

    pub fn all(&self) -> &[TickerMeta] {
        &self.entries
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.symbol.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TickerLookup for TickerDirectory {
    fn lookup(&self, symbol: &str) -> Option<&TickerMeta> {
        self.by_symbol.get(symbol).map(|idx| &self.entries[*idx])
    }
}
