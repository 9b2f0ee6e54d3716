//! Low-volatility accumulation.
//!
//! Fires when the last `stable_candles` hourly bodies are all within
//! `max_body_pct` of their open, and the newest `spike_candles` 15-minute
//! volumes each reach `volume_factor` times the mean volume of the
//! `baseline_candles` before them. A single outlier bar is not enough.
//!
//! Only the newest closed hourly candle is evaluated: the 15-minute window
//! describes the present, not a historical index.

use super::helpers;
use crate::{
    AccumulationSignal, Candle, Detection, IndicatorContext, OHLCVExt, PatternDetector,
    PatternKind, Result, ScoutError, SymbolData, OHLCV,
};

#[derive(Debug, Clone, Copy)]
pub struct AccumulationDetector {
    pub stable_candles: usize,
    pub max_body_pct: f64,
    pub spike_candles: usize,
    pub baseline_candles: usize,
    pub volume_factor: f64,
}

impl Default for AccumulationDetector {
    fn default() -> Self {
        Self {
            stable_candles: helpers::STABLE_CANDLES,
            max_body_pct: helpers::STABLE_BODY_PCT,
            spike_candles: helpers::SPIKE_CANDLES,
            baseline_candles: helpers::BASELINE_CANDLES,
            volume_factor: helpers::VOLUME_SPIKE_FACTOR,
        }
    }
}

/// Outcome of the 15-minute volume test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeSpike {
    pub baseline: f64,
    pub last_ratio: f64,
    pub min_ratio: f64,
}

impl AccumulationDetector {
    /// Largest body percentage over the trailing stable window ending at
    /// `index`, or None if any candle in it is too volatile.
    pub fn stable_body<T: OHLCV>(&self, bars: &[T], index: usize) -> Option<f64> {
        let start = (index + 1).checked_sub(self.stable_candles)?;
        let mut max_body = 0.0_f64;
        for bar in bars.get(start..=index)? {
            let body = bar.body_pct()?;
            if body > self.max_body_pct {
                return None;
            }
            max_body = max_body.max(body);
        }
        Some(max_body)
    }

    /// Sustained volume spike at the end of `bars`
    pub fn volume_spike<T: OHLCV>(&self, bars: &[T]) -> Option<VolumeSpike> {
        let needed = self.spike_candles + self.baseline_candles;
        let start = bars.len().checked_sub(needed)?;
        let (base, spike) = bars[start..].split_at(self.baseline_candles);

        let baseline = base.iter().map(|b| b.volume()).sum::<f64>() / base.len() as f64;
        if baseline <= 0.0 {
            return None;
        }

        let mut min_ratio = f64::INFINITY;
        for bar in spike {
            let ratio = bar.volume() / baseline;
            if ratio < self.volume_factor {
                return None;
            }
            min_ratio = min_ratio.min(ratio);
        }

        let last = spike.last()?;
        Some(VolumeSpike {
            baseline,
            last_ratio: last.volume() / baseline,
            min_ratio,
        })
    }
}

impl PatternDetector for AccumulationDetector {
    fn kind(&self) -> PatternKind {
        PatternKind::Accumulation
    }

    fn min_bars(&self) -> usize {
        self.stable_candles
    }

    fn needs_quarter_window(&self) -> bool {
        true
    }

    fn detect(&self, data: &SymbolData, index: usize, _ctx: &IndicatorContext) -> Option<Detection> {
        if data.hourly.last_closed_index() != Some(index) {
            return None;
        }
        let max_body_pct = self.stable_body(data.hourly.candles(), index)?;

        let quarter = data.quarter.as_ref()?;
        let spike = self.volume_spike(quarter.candles())?;
        let last: &Candle = quarter.candles().last()?;

        Some(Detection::Accumulation(AccumulationSignal {
            symbol: data.symbol().clone(),
            bucket: quarter.interval().bucket(last.open_time),
            open_time: last.open_time,
            price: last.close,
            volume_ratio: spike.last_ratio,
            min_volume_ratio: spike.min_ratio,
            max_body_pct,
        }))
    }

    fn validate_config(&self) -> Result<()> {
        if self.stable_candles == 0 || self.spike_candles == 0 || self.baseline_candles == 0 {
            return Err(ScoutError::InvalidValue(
                "accumulation candle counts must be > 0",
            ));
        }
        if !self.max_body_pct.is_finite() || self.max_body_pct < 0.0 {
            return Err(ScoutError::OutOfRange {
                field: "max_body_pct",
                value: self.max_body_pct,
                min: 0.0,
                max: f64::MAX,
            });
        }
        if !self.volume_factor.is_finite() || self.volume_factor <= 0.0 {
            return Err(ScoutError::OutOfRange {
                field: "volume_factor",
                value: self.volume_factor,
                min: 0.0,
                max: f64::MAX,
            });
        }
        Ok(())
    }
}
