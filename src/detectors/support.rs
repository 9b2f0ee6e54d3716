//! Support-band touch: in a downtrend, the close sits within a small band
//! above the Supertrend lower band.

use super::helpers::{self, distance_pct};
use crate::{
    Detection, IndicatorContext, PatternDetector, PatternKind, Result, ScoutError,
    SupportTouchSignal, SymbolData,
};

#[derive(Debug, Clone, Copy)]
pub struct SupportTouchDetector {
    /// Inclusive lower bound of `distance_to_support`, percent
    pub min_distance_pct: f64,
    /// Inclusive upper bound of `distance_to_support`, percent
    pub max_distance_pct: f64,
}

impl Default for SupportTouchDetector {
    fn default() -> Self {
        Self {
            min_distance_pct: helpers::SUPPORT_BAND_PCT.0,
            max_distance_pct: helpers::SUPPORT_BAND_PCT.1,
        }
    }
}

impl PatternDetector for SupportTouchDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::SupportTouch
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect(&self, data: &SymbolData, index: usize, ctx: &IndicatorContext) -> Option<Detection> {
        let st = ctx.supertrend_at(index)?;
        if !st.direction.is_down() {
            return None;
        }

        let window = &data.hourly;
        let candle = window.candles().get(index)?;
        if candle.close <= 0.0 {
            return None;
        }
        let distance_to_support = distance_pct(candle.close, st.lower_band)?;
        if !(self.min_distance_pct..=self.max_distance_pct).contains(&distance_to_support) {
            return None;
        }

        Some(Detection::SupportTouch(SupportTouchSignal {
            symbol: window.symbol().clone(),
            bucket: window.interval().bucket(candle.open_time),
            open_time: candle.open_time,
            metrics: ctx.metrics_at(window.candles(), index)?,
            support: st.lower_band,
            resistance: st.upper_band,
            distance_to_support,
            distance_to_resistance: (st.upper_band - candle.close) / candle.close * 100.0,
        }))
    }

    fn validate_config(&self) -> Result<()> {
        let (min, max) = (self.min_distance_pct, self.max_distance_pct);
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(ScoutError::InvalidConfig(format!(
                "support band [{min}, {max}] is not a valid range"
            )));
        }
        Ok(())
    }
}
