//! Common helpers shared by the detector modules

use crate::indicators::TrendDirection;
use crate::IndicatorContext;

// ============================================================
// DEFAULTS
// ============================================================

/// How far back "candles since last event" searches
pub const EVENT_LOOKBACK: usize = 250;
/// Minimum close-to-close move for a pump, percent
pub const PUMP_THRESHOLD_PCT: f64 = 3.0;
/// Bars needed before a breakout is reported (RSI period + 1)
pub const BREAKOUT_MIN_BARS: usize = 15;
/// Inclusive support band, percent above the lower band
pub const SUPPORT_BAND_PCT: (f64, f64) = (0.0, 3.0);
/// Hourly candles that must stay flat for accumulation
pub const STABLE_CANDLES: usize = 6;
/// Largest hourly body, percent of open, still considered flat
pub const STABLE_BODY_PCT: f64 = 1.0;
/// 15-minute candles that must all exceed the volume baseline
pub const SPIKE_CANDLES: usize = 4;
/// 15-minute candles averaged for the volume baseline
pub const BASELINE_CANDLES: usize = 8;
/// Required multiple of the baseline volume
pub const VOLUME_SPIKE_FACTOR: f64 = 1.5;

// ============================================================
// HELPER FUNCTIONS
// ============================================================

/// Distance back from `index` to the most recent earlier index satisfying
/// `is_event`, searching at most `lookback` candles. Returns `lookback`
/// when no earlier event exists in range.
pub fn candles_since(index: usize, lookback: usize, is_event: impl Fn(usize) -> bool) -> usize {
    (1..=lookback.min(index))
        .find(|&k| is_event(index - k))
        .unwrap_or(lookback)
}

/// True when the Supertrend goes from down at `index - 1` to up at `index`
pub fn is_bullish_flip(ctx: &IndicatorContext, index: usize) -> bool {
    if index == 0 {
        return false;
    }
    matches!(
        (ctx.supertrend_at(index - 1), ctx.supertrend_at(index)),
        (Some(prev), Some(cur))
            if prev.direction == TrendDirection::Down && cur.direction == TrendDirection::Up
    )
}

/// Percentage distance of `price` above `line`. None if `line` is not positive.
#[inline]
pub fn distance_pct(price: f64, line: f64) -> Option<f64> {
    (line > 0.0).then(|| (price - line) / line * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candles_since_finds_nearest() {
        let events = [2usize, 7];
        assert_eq!(candles_since(10, 250, |i| events.contains(&i)), 3);
        assert_eq!(candles_since(7, 250, |i| events.contains(&i)), 5);
    }

    #[test]
    fn test_candles_since_defaults_to_lookback() {
        assert_eq!(candles_since(10, 250, |_| false), 250);
        assert_eq!(candles_since(0, 250, |_| true), 250);
    }

    #[test]
    fn test_candles_since_respects_lookback() {
        assert_eq!(candles_since(300, 250, |i| i == 10), 250);
        assert_eq!(candles_since(300, 250, |i| i == 50), 250);
        assert_eq!(candles_since(300, 250, |i| i == 51), 249);
    }

    #[test]
    fn test_bullish_flip_needs_down_then_up() {
        use crate::indicators::SupertrendPoint;

        let point = |direction| {
            Some(SupertrendPoint {
                value: 100.0,
                direction,
                upper_band: 101.0,
                lower_band: 99.0,
                atr: 1.0,
            })
        };
        let ctx = IndicatorContext {
            supertrend: vec![
                None,
                point(TrendDirection::Down),
                point(TrendDirection::Up),
                point(TrendDirection::Up),
            ],
            ..Default::default()
        };
        assert!(!is_bullish_flip(&ctx, 0));
        assert!(!is_bullish_flip(&ctx, 1));
        assert!(is_bullish_flip(&ctx, 2));
        assert!(!is_bullish_flip(&ctx, 3));
    }

    #[test]
    fn test_distance_pct() {
        assert!((distance_pct(103.0, 100.0).unwrap() - 3.0).abs() < 1e-12);
        assert_eq!(distance_pct(1.0, 0.0), None);
    }
}
