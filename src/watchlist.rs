//! Watched symbols, persisted as a JSON array.

use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use thiserror::Error;
use tracing::info;

use crate::normalize::NormalizedEarnings;

const MAX_SYMBOL_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum WatchlistError {
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),
    #[error("watchlist I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid watchlist JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watchlist {
    symbols: BTreeSet<String>,
}

impl Watchlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the symbol was not yet watched.
    pub fn add(&mut self, symbol: &str) -> Result<bool, WatchlistError> {
        Ok(self.symbols.insert(canonical_symbol(symbol)?))
    }

    /// Returns `true` when the symbol was watched.
    pub fn remove(&mut self, symbol: &str) -> Result<bool, WatchlistError> {
        Ok(self.symbols.remove(&canonical_symbol(symbol)?))
    }

    /// Flips membership and returns whether the symbol is watched afterwards.
    pub fn toggle(&mut self, symbol: &str) -> Result<bool, WatchlistError> {
        let symbol = canonical_symbol(symbol)?;
        if self.symbols.remove(&symbol) {
            Ok(false)
        } else {
            self.symbols.insert(symbol);
            Ok(true)
        }
    }

    pub fn contains(&self, symbol: &str) -> bool {
        canonical_symbol(symbol)
            .map(|symbol| self.symbols.contains(&symbol))
            .unwrap_or(false)
    }

    pub fn all(&self) -> &BTreeSet<String> {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn filter_watched(&self, records: Vec<NormalizedEarnings>) -> Vec<NormalizedEarnings> {
        records
            .into_iter()
            .filter(|record| self.contains(&record.symbol))
            .collect()
    }
}

/// File-backed watchlist shared between request handlers.
#[derive(Debug)]
pub struct WatchlistStore {
    path: Option<PathBuf>,
    inner: RwLock<Watchlist>,
}

impl WatchlistStore {
    /// Not persisted anywhere; used for tests and demo mode.
    pub fn in_memory(initial: Watchlist) -> Self {
        Self {
            path: None,
            inner: RwLock::new(initial),
        }
    }

    /// A missing file loads as an empty watchlist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WatchlistError> {
        let path = path.into();
        let watchlist = match fs::read_to_string(&path) {
            Ok(raw) => parse_watchlist(&raw)?,
            Err(err) if err.kind() == ErrorKind::NotFound => Watchlist::new(),
            Err(source) => return Err(WatchlistError::Io { path, source }),
        };

        info!(
            component = "watchlist",
            event = "watchlist.loaded",
            path = %path.display(),
            count = watchlist.len()
        );

        Ok(Self {
            path: Some(path),
            inner: RwLock::new(watchlist),
        })
    }

    pub fn snapshot(&self) -> Watchlist {
        self.inner
            .read()
            .expect("watchlist lock should not be poisoned")
            .clone()
    }

    pub fn add(&self, symbol: &str) -> Result<Watchlist, WatchlistError> {
        self.update("add", symbol, |watchlist| watchlist.add(symbol))
    }

    pub fn remove(&self, symbol: &str) -> Result<Watchlist, WatchlistError> {
        self.update("remove", symbol, |watchlist| watchlist.remove(symbol))
    }

    fn update(
        &self,
        action: &'static str,
        symbol: &str,
        f: impl FnOnce(&mut Watchlist) -> Result<bool, WatchlistError>,
    ) -> Result<Watchlist, WatchlistError> {
        let mut guard = self
            .inner
            .write()
            .expect("watchlist lock should not be poisoned");

        let mut next = guard.clone();
        let changed = f(&mut next)?;
        if changed {
            if let Some(path) = &self.path {
                write_atomic(path, &serialize_watchlist(&next)?)?;
            }
            *guard = next;
        }

        info!(
            component = "watchlist",
            event = "watchlist.update",
            action,
            symbol,
            changed,
            count = guard.len()
        );

        Ok(guard.clone())
    }
}

fn canonical_symbol(raw: &str) -> Result<String, WatchlistError> {
    let symbol = raw.trim().to_ascii_uppercase();
    let valid = !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'));
    if valid {
        Ok(symbol)
    } else {
        Err(WatchlistError::InvalidSymbol(raw.to_string()))
    }
}

fn parse_watchlist(raw: &str) -> Result<Watchlist, WatchlistError> {
    let symbols: Vec<String> = serde_json::from_str(raw)?;
    let mut watchlist = Watchlist::new();
    for symbol in symbols {
        watchlist.add(&symbol)?;
    }
    Ok(watchlist)
}

fn serialize_watchlist(watchlist: &Watchlist) -> Result<Vec<u8>, WatchlistError> {
    Ok(serde_json::to_vec_pretty(&watchlist.symbols)?)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), WatchlistError> {
    let io_err = |source: std::io::Error| WatchlistError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| io_err(std::io::Error::new(ErrorKind::InvalidInput, "no file name")))?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    {
        let mut file = fs::File::create(&tmp_path).map_err(io_err)?;
        file.write_all(bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
    }

    fs::rename(&tmp_path, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rec(symbol: &str) -> NormalizedEarnings {
        NormalizedEarnings {
            symbol: symbol.to_string(),
            date: "2025-01-01".to_string(),
            actual: None,
            estimate: None,
            surprise: None,
            surprise_percent: None,
            hour: None,
            quarter: None,
            year: None,
            exchange: None,
            description: None,
        }
    }

    #[test]
    fn add_remove_contains_are_case_insensitive() {
        let mut watchlist = Watchlist::new();
        assert!(watchlist.add("aapl").unwrap());
        assert!(!watchlist.add(" AAPL ").unwrap());
        assert!(watchlist.contains("Aapl"));
        assert_eq!(watchlist.len(), 1);

        assert!(watchlist.remove("AAPL").unwrap());
        assert!(!watchlist.remove("AAPL").unwrap());
        assert!(watchlist.is_empty());
    }

    #[test]
    fn toggle_flips_membership() {
        let mut watchlist = Watchlist::new();
        assert!(watchlist.toggle("NVDA").unwrap());
        assert!(watchlist.contains("NVDA"));
        assert!(!watchlist.toggle("nvda").unwrap());
        assert!(!watchlist.contains("NVDA"));
    }

    #[test]
    fn rejects_malformed_symbols() {
        let mut watchlist = Watchlist::new();
        for raw in ["", "   ", "AA PL", "<script>", "ABCDEFGHIJKLMNOPQ"] {
            assert!(matches!(
                watchlist.add(raw),
                Err(WatchlistError::InvalidSymbol(_))
            ));
        }
        assert!(watchlist.add("BRK.B").unwrap());
        assert!(!watchlist.contains(""));
    }

    #[test]
    fn filter_keeps_watched_rows_in_order() {
        let mut watchlist = Watchlist::new();
        watchlist.add("MSFT").unwrap();
        watchlist.add("AAPL").unwrap();

        let out = watchlist.filter_watched(vec![rec("MSFT"), rec("TSLA"), rec("AAPL"), rec("MSFT")]);
        let symbols: Vec<_> = out.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["MSFT", "AAPL", "MSFT"]);
    }

    #[test]
    fn store_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("watchlist.json");

        let store = WatchlistStore::open(&path).unwrap();
        assert!(store.snapshot().is_empty());

        store.add("googl").unwrap();
        store.add("AMZN").unwrap();
        let after_remove = store.remove("GOOGL").unwrap();
        assert_eq!(after_remove.len(), 1);

        let reopened = WatchlistStore::open(&path).unwrap();
        let symbols: Vec<_> = reopened.snapshot().all().iter().cloned().collect();
        assert_eq!(symbols, vec!["AMZN".to_string()]);
        assert!(!path.with_file_name("watchlist.json.tmp").exists());
    }

    #[test]
    fn store_rejects_corrupt_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("watchlist.json");
        fs::write(&path, "{not json").unwrap();

        let err = WatchlistStore::open(&path).unwrap_err();
        assert!(matches!(err, WatchlistError::Json(_)));
    }

    #[test]
    fn invalid_symbol_leaves_store_untouched() {
        let store = WatchlistStore::in_memory(Watchlist::new());
        store.add("META").unwrap();
        assert!(store.add("bad symbol").is_err());
        assert_eq!(store.snapshot().len(), 1);
    }
}
