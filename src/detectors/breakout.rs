//! Trend-reversal breakout: the Supertrend flips from downtrend to uptrend.
//!
//! Reports the last downtrend line (the previous candle's upper band, the
//! "red line" price broke above) and the first uptrend line (this candle's
//! lower band, the new "green" support), with the close's distance from each.

use super::helpers::{self, candles_since, distance_pct, is_bullish_flip};
use crate::{
    BreakoutSignal, Detection, IndicatorContext, PatternDetector, PatternKind, Result, ScoutError,
    SymbolData,
};

#[derive(Debug, Clone, Copy)]
pub struct BreakoutDetector {
    pub min_bars: usize,
    /// Search depth for `candles_since_last_breakout`
    pub lookback: usize,
}

impl Default for BreakoutDetector {
    fn default() -> Self {
        Self {
            min_bars: helpers::BREAKOUT_MIN_BARS,
            lookback: helpers::EVENT_LOOKBACK,
        }
    }
}

impl PatternDetector for BreakoutDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::Breakout
    }

    fn min_bars(&self) -> usize {
        self.min_bars
    }

    fn detect(&self, data: &SymbolData, index: usize, ctx: &IndicatorContext) -> Option<Detection> {
        if !is_bullish_flip(ctx, index) {
            return None;
        }
        let prev = ctx.supertrend_at(index - 1)?;
        let cur = ctx.supertrend_at(index)?;

        let window = &data.hourly;
        let candle = window.candles().get(index)?;
        let metrics = ctx.metrics_at(window.candles(), index)?;

        let old_red_line = prev.value;
        let new_green_line = cur.value;

        Some(Detection::Breakout(BreakoutSignal {
            symbol: window.symbol().clone(),
            bucket: window.interval().bucket(candle.open_time),
            open_time: candle.open_time,
            metrics,
            old_red_line,
            red_distance: distance_pct(candle.close, old_red_line)?,
            new_green_line,
            green_distance: distance_pct(candle.close, new_green_line)?,
            candles_since_last_breakout: candles_since(index, self.lookback, |j| {
                is_bullish_flip(ctx, j)
            }),
        }))
    }

    fn validate_config(&self) -> Result<()> {
        if self.min_bars < 2 {
            return Err(ScoutError::InvalidConfig(
                "breakout needs at least 2 bars".to_string(),
            ));
        }
        if self.lookback == 0 {
            return Err(ScoutError::InvalidValue("lookback must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::TrendDirection;
    use crate::{Candle, CandleWindow, ContextProvider, DefaultContextProvider, Interval, Symbol};
    use chrono::{Duration, TimeZone, Utc};

    fn data(closes: &[f64]) -> SymbolData {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                Candle::new(start + Duration::hours(i as i64), c, c * 1.002, c * 0.998, c, 5.0)
            })
            .collect();
        SymbolData::hourly_only(CandleWindow::from_closed(
            Symbol::new("ABCUSDT"),
            Interval::H1,
            candles,
        ))
    }

    fn v_shape() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64).collect();
        closes.extend((1..20).map(|i| 81.0 + i as f64 * 1.5));
        closes
    }

    #[test]
    fn test_fires_only_on_flip() {
        let data = data(&v_shape());
        let ctx = DefaultContextProvider::default().compute_all(data.hourly.candles());
        let detector = BreakoutDetector::default();

        let mut hits = Vec::new();
        for i in 0..data.hourly.len() {
            if i + 1 < detector.min_bars() {
                continue;
            }
            if let Some(Detection::Breakout(b)) = detector.detect(&data, i, &ctx) {
                hits.push((i, b));
            }
        }

        assert_eq!(hits.len(), 1);
        let (i, signal) = &hits[0];
        let prev = ctx.supertrend_at(i - 1).unwrap();
        let cur = ctx.supertrend_at(*i).unwrap();
        assert_eq!(prev.direction, TrendDirection::Down);
        assert_eq!(cur.direction, TrendDirection::Up);
        assert_eq!(signal.old_red_line, prev.upper_band);
        assert_eq!(signal.new_green_line, cur.lower_band);
        assert!(signal.red_distance > 0.0);
        assert!(signal.green_distance > 0.0);
        assert_eq!(signal.candles_since_last_breakout, 250);
    }

    #[test]
    fn test_silent_without_direction_change() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 - i as f64 * 0.5).collect();
        let data = data(&closes);
        let ctx = DefaultContextProvider::default().compute_all(data.hourly.candles());
        let detector = BreakoutDetector::default();
        assert!((14..40).all(|i| detector.detect(&data, i, &ctx).is_none()));
    }
}
