//! Building the symbol universe from a ticker list.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::feed::FetchError;
use crate::Symbol;

/// Ticker names to `BASEQUOTE` symbols: uppercased, suffixed with `quote`,
/// deduplicated keeping first occurrence. Blank tickers are skipped.
pub fn symbols_from_tickers<I, T>(tickers: I, quote: &str) -> Vec<Symbol>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let mut seen = HashSet::new();
    tickers
        .into_iter()
        .filter_map(|t| {
            let base = t.as_ref().trim();
            (!base.is_empty()).then(|| format!("{}{}", base.to_uppercase(), quote.to_uppercase()))
        })
        .filter(|s| seen.insert(s.clone()))
        .map(Symbol::new)
        .collect()
}

/// Keep only symbols present in `tradable`, preserving order.
pub fn retain_tradable(symbols: Vec<Symbol>, tradable: &HashSet<Symbol>) -> Vec<Symbol> {
    let before = symbols.len();
    let kept: Vec<Symbol> = symbols.into_iter().filter(|s| tradable.contains(s)).collect();
    info!(requested = before, tradable = kept.len(), "resolved symbol universe");
    kept
}

#[derive(Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    symbol: String,
    quote_asset: String,
    status: String,
}

/// Symbols of an exchange-info payload that trade against `quote`.
pub fn tradable_from_exchange_info(
    payload: &Value,
    quote: &str,
) -> Result<HashSet<Symbol>, FetchError> {
    let info = ExchangeInfo::deserialize(payload)
        .map_err(|e| FetchError::Malformed(format!("exchange info: {e}")))?;
    Ok(info
        .symbols
        .into_iter()
        .filter(|s| s.quote_asset == quote && s.status == "TRADING")
        .map(|s| Symbol::new(s.symbol))
        .collect())
}
