//! Indicator engines
//!
//! Wilder RSI and the ATR/Supertrend state machine. Both come in two styles
//! that produce identical numbers: a from-scratch function over a prefix of
//! the series, and an incremental state rolled forward one bar at a time.

pub mod rsi;
pub mod supertrend;

pub use rsi::{rsi, RsiState};
pub use supertrend::{
    supertrend_at, supertrend_series, true_range, SupertrendParams, SupertrendPoint,
    SupertrendState, TrendDirection,
};

/// Round to `decimals` decimal places
#[inline]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Percentage change from `from` to `to`. None if `from` is zero.
#[inline]
pub fn pct_change(from: f64, to: f64) -> Option<f64> {
    (from != 0.0).then(|| (to - from) / from * 100.0)
}
