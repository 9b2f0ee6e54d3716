//! Candle retrieval seam and exchange kline payload parsing.
//!
//! The scanner never talks HTTP itself. A [`CandleSource`] returns raw
//! candles, newest last, including the still-forming one; [`fetch_window`]
//! turns that into a validated [`CandleWindow`] of closed candles.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{Candle, CandleWindow, Interval, Symbol};

/// Per-symbol retrieval failure. Recovered inside the scan task.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("no candles returned")]
    Empty,

    #[error("request timed out")]
    Timeout,
}

/// Source of OHLCV candles for one symbol and interval.
///
/// Implementations own their timeouts: a hung request should come back as
/// [`FetchError::Timeout`] rather than block a worker indefinitely. The
/// scanner stops waiting at its cycle deadline but cannot reclaim the
/// worker, so a fetch that never returns holds one pool thread for good.
pub trait CandleSource: Send + Sync + 'static {
    /// Up to `limit` most recent candles, oldest first, forming candle last.
    fn fetch(&self, symbol: &Symbol, interval: Interval, limit: usize)
        -> Result<Vec<Candle>, FetchError>;
}

/// Fetch and validate a window of closed candles.
pub fn fetch_window<S: CandleSource + ?Sized>(
    source: &S,
    symbol: &Symbol,
    interval: Interval,
    limit: usize,
) -> Result<CandleWindow, FetchError> {
    let raw = source.fetch(symbol, interval, limit)?;
    CandleWindow::from_raw(symbol.clone(), interval, raw)
}

// ============================================================
// KLINE PAYLOAD
// ============================================================

/// Parse an exchange kline response.
///
/// A well-formed response is a non-empty array of rows
/// `[open_time_ms, "open", "high", "low", "close", "volume", ...]`. An object
/// is an error envelope from the provider and is reported with its `msg`.
pub fn parse_klines(payload: &Value) -> Result<Vec<Candle>, FetchError> {
    let rows = match payload {
        Value::Array(rows) => rows,
        Value::Object(map) => {
            let msg = map
                .get("msg")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| payload.to_string());
            return Err(FetchError::Provider(msg));
        }
        other => {
            return Err(FetchError::Malformed(format!(
                "expected array of klines, got {other}"
            )))
        }
    };
    if rows.is_empty() {
        return Err(FetchError::Empty);
    }
    rows.iter()
        .enumerate()
        .map(|(i, row)| parse_row(row).map_err(|e| FetchError::Malformed(format!("row {i}: {e}"))))
        .collect()
}

/// Parse a kline response body.
pub fn parse_klines_str(body: &str) -> Result<Vec<Candle>, FetchError> {
    let payload: Value =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;
    parse_klines(&payload)
}

fn parse_row(row: &Value) -> Result<Candle, String> {
    let items = row.as_array().ok_or("row is not an array")?;
    if items.len() < 6 {
        return Err(format!("expected at least 6 fields, got {}", items.len()));
    }

    let open_ms = items[0].as_i64().ok_or("open_time is not an integer")?;
    let open_time: DateTime<Utc> =
        DateTime::from_timestamp_millis(open_ms).ok_or("open_time out of range")?;

    let field = |idx: usize, name: &str| -> Result<f64, String> {
        number(&items[idx]).ok_or_else(|| format!("{name} is not a number"))
    };

    Ok(Candle::new(
        open_time,
        field(1, "open")?,
        field(2, "high")?,
        field(3, "low")?,
        field(4, "close")?,
        field(5, "volume")?,
    ))
}

/// Exchange prices arrive as decimal strings; bare numbers are accepted too.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

// ============================================================
// IN-MEMORY SOURCE
// ============================================================

/// Candle source backed by preloaded series. Used in tests and replays.
#[derive(Debug, Default)]
pub struct MemorySource {
    series: RwLock<HashMap<(Symbol, Interval), Vec<Candle>>>,
    failures: RwLock<HashMap<Symbol, FetchError>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the series for `symbol`/`interval`.
    pub fn insert(&self, symbol: Symbol, interval: Interval, candles: Vec<Candle>) {
        if let Ok(mut series) = self.series.write() {
            series.insert((symbol, interval), candles);
        }
    }

    /// Make every fetch for `symbol` fail with `error`.
    pub fn fail(&self, symbol: Symbol, error: FetchError) {
        if let Ok(mut failures) = self.failures.write() {
            failures.insert(symbol, error);
        }
    }

    pub fn with(self, symbol: Symbol, interval: Interval, candles: Vec<Candle>) -> Self {
        self.insert(symbol, interval, candles);
        self
    }
}

impl CandleSource for MemorySource {
    fn fetch(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>, FetchError> {
        let failures = self
            .failures
            .read()
            .map_err(|_| FetchError::Transport("source lock poisoned".to_string()))?;
        if let Some(err) = failures.get(symbol) {
            return Err(err.clone());
        }
        drop(failures);

        let series = self
            .series
            .read()
            .map_err(|_| FetchError::Transport("source lock poisoned".to_string()))?;
        let candles = series
            .get(&(symbol.clone(), interval))
            .ok_or_else(|| FetchError::Provider(format!("unknown symbol {symbol}")))?;
        if candles.is_empty() {
            return Err(FetchError::Empty);
        }
        let start = candles.len().saturating_sub(limit);
        Ok(candles[start..].to_vec())
    }
}
