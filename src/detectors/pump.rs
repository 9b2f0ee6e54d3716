//! Momentum pump: the close jumped at least `threshold_pct` over the previous close.

use super::helpers::{self, candles_since};
use crate::{
    Detection, IndicatorContext, PatternDetector, PatternKind, PumpSignal, Result, ScoutError,
    SymbolData,
};

#[derive(Debug, Clone, Copy)]
pub struct PumpDetector {
    pub threshold_pct: f64,
    /// Search depth for `candles_since_last_pump`
    pub lookback: usize,
}

impl Default for PumpDetector {
    fn default() -> Self {
        Self {
            threshold_pct: helpers::PUMP_THRESHOLD_PCT,
            lookback: helpers::EVENT_LOOKBACK,
        }
    }
}

impl PumpDetector {
    #[inline]
    fn is_pump(&self, ctx: &IndicatorContext, index: usize) -> bool {
        ctx.pct_at(index).is_some_and(|pct| pct >= self.threshold_pct)
    }
}

impl PatternDetector for PumpDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::Pump
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn detect(&self, data: &SymbolData, index: usize, ctx: &IndicatorContext) -> Option<Detection> {
        if !self.is_pump(ctx, index) {
            return None;
        }
        let window = &data.hourly;
        let candle = window.candles().get(index)?;
        let metrics = ctx.metrics_at(window.candles(), index)?;

        Some(Detection::Pump(PumpSignal {
            symbol: window.symbol().clone(),
            bucket: window.interval().bucket(candle.open_time),
            open_time: candle.open_time,
            metrics,
            candles_since_last_pump: candles_since(index, self.lookback, |j| {
                self.is_pump(ctx, j)
            }),
        }))
    }

    fn validate_config(&self) -> Result<()> {
        if !self.threshold_pct.is_finite() || self.threshold_pct <= 0.0 {
            return Err(ScoutError::OutOfRange {
                field: "threshold_pct",
                value: self.threshold_pct,
                min: 0.0,
                max: f64::MAX,
            });
        }
        if self.lookback == 0 {
            return Err(ScoutError::InvalidValue("lookback must be > 0"));
        }
        Ok(())
    }
}
