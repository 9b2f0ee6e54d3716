//! ATR (Wilder RMA) and the Supertrend band/direction state machine.
//!
//! Conventions:
//! - TR at index 0 is `high - low`; later indices also consider the previous close.
//! - ATR is seeded at index `atr_period` with the mean of TR[1..=atr_period],
//!   then smoothed with `atr = (atr * (p - 1) + tr) / p`.
//! - Bands ratchet towards price while the trend persists and reset to the
//!   basic band once the previous close has crossed them.
//! - Direction flips compare the close against the *previous* candle's band.

use serde::{Deserialize, Serialize};

use crate::{OHLCVExt, Period, Result, ScoutError, OHLCV};

/// Trend state of the Supertrend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendDirection {
    Up,
    Down,
}

impl TrendDirection {
    /// +1 for up, -1 for down
    #[inline]
    pub fn as_i8(self) -> i8 {
        match self {
            TrendDirection::Up => 1,
            TrendDirection::Down => -1,
        }
    }

    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, TrendDirection::Up)
    }

    #[inline]
    pub fn is_down(self) -> bool {
        matches!(self, TrendDirection::Down)
    }
}

/// Supertrend output at one index
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SupertrendPoint {
    /// Active line: lower band in an uptrend, upper band in a downtrend
    pub value: f64,
    pub direction: TrendDirection,
    pub upper_band: f64,
    pub lower_band: f64,
    pub atr: f64,
}

/// Supertrend parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupertrendParams {
    pub atr_period: Period,
    pub multiplier: f64,
}

impl Default for SupertrendParams {
    fn default() -> Self {
        Self {
            atr_period: Period::new_const(10),
            multiplier: 3.0,
        }
    }
}

impl SupertrendParams {
    pub fn new(atr_period: usize, multiplier: f64) -> Result<Self> {
        let params = Self {
            atr_period: Period::new(atr_period)?,
            multiplier,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            return Err(ScoutError::OutOfRange {
                field: "multiplier",
                value: self.multiplier,
                min: f64::MIN_POSITIVE,
                max: f64::MAX,
            });
        }
        Ok(())
    }
}

/// True range of `bars[index]`
#[inline]
pub fn true_range<T: OHLCV>(bars: &[T], index: usize) -> f64 {
    let bar = &bars[index];
    let hl = bar.range();
    if index == 0 {
        return hl;
    }
    let prev_close = bars[index - 1].close();
    hl.max((bar.high() - prev_close).abs())
        .max((bar.low() - prev_close).abs())
}

#[inline]
fn ratchet_upper(basic: f64, prev_upper: f64, prev_close: f64) -> f64 {
    if prev_close <= prev_upper {
        basic.min(prev_upper)
    } else {
        basic
    }
}

#[inline]
fn ratchet_lower(basic: f64, prev_lower: f64, prev_close: f64) -> f64 {
    if prev_close >= prev_lower {
        basic.max(prev_lower)
    } else {
        basic
    }
}

#[inline]
fn next_direction(
    prev: TrendDirection,
    close: f64,
    prev_upper: f64,
    prev_lower: f64,
) -> TrendDirection {
    match prev {
        TrendDirection::Down if close > prev_upper => TrendDirection::Up,
        TrendDirection::Up if close < prev_lower => TrendDirection::Down,
        unchanged => unchanged,
    }
}

#[inline]
fn initial_direction(close: f64, upper: f64) -> TrendDirection {
    if close > upper {
        TrendDirection::Up
    } else {
        TrendDirection::Down
    }
}

#[inline]
fn point(direction: TrendDirection, upper: f64, lower: f64, atr: f64) -> SupertrendPoint {
    SupertrendPoint {
        value: if direction.is_up() { lower } else { upper },
        direction,
        upper_band: upper,
        lower_band: lower,
        atr,
    }
}

/// Supertrend at `index`, recomputed from scratch over `bars[..=index]`.
///
/// Returns `None` when `index < atr_period` or `index` is out of bounds.
pub fn supertrend_at<T: OHLCV>(
    bars: &[T],
    index: usize,
    params: SupertrendParams,
) -> Option<SupertrendPoint> {
    let p = params.atr_period.get();
    if index < p || index >= bars.len() {
        return None;
    }
    let bars = &bars[..=index];
    let n = bars.len();
    let pf = p as f64;

    let tr: Vec<f64> = (0..n).map(|i| true_range(bars, i)).collect();

    let mut atr = vec![0.0; n];
    atr[p] = tr[1..=p].iter().sum::<f64>() / pf;
    for i in p + 1..n {
        atr[i] = (atr[i - 1] * (pf - 1.0) + tr[i]) / pf;
    }

    let mut upper = vec![0.0; n];
    let mut lower = vec![0.0; n];
    let mut direction = vec![TrendDirection::Down; n];

    let src = bars[p].hl2();
    upper[p] = src + params.multiplier * atr[p];
    lower[p] = src - params.multiplier * atr[p];
    direction[p] = initial_direction(bars[p].close(), upper[p]);

    for i in p + 1..n {
        let src = bars[i].hl2();
        let prev_close = bars[i - 1].close();
        upper[i] = ratchet_upper(src + params.multiplier * atr[i], upper[i - 1], prev_close);
        lower[i] = ratchet_lower(src - params.multiplier * atr[i], lower[i - 1], prev_close);
        direction[i] = next_direction(direction[i - 1], bars[i].close(), upper[i - 1], lower[i - 1]);
    }

    Some(point(direction[index], upper[index], lower[index], atr[index]))
}

/// Incremental Supertrend: push bars oldest first.
#[derive(Debug, Clone)]
pub struct SupertrendState {
    params: SupertrendParams,
    pushed: usize,
    prev_close: Option<f64>,
    tr_seed_sum: f64,
    atr: f64,
    last: Option<SupertrendPoint>,
}

impl SupertrendState {
    pub fn new(params: SupertrendParams) -> Self {
        Self {
            params,
            pushed: 0,
            prev_close: None,
            tr_seed_sum: 0.0,
            atr: 0.0,
            last: None,
        }
    }

    /// Push the next bar and return the Supertrend at it
    pub fn push<T: OHLCV>(&mut self, bar: &T) -> Option<SupertrendPoint> {
        let p = self.params.atr_period.get();
        let pf = p as f64;
        let index = self.pushed;
        self.pushed += 1;

        let hl = bar.high() - bar.low();
        let tr = match self.prev_close {
            Some(pc) => hl.max((bar.high() - pc).abs()).max((bar.low() - pc).abs()),
            None => hl,
        };
        let prev_close = self.prev_close.replace(bar.close());

        if index < p {
            if index >= 1 {
                self.tr_seed_sum += tr;
            }
            return None;
        }

        let src = bar.hl2();
        let m = self.params.multiplier;

        let next = match (self.last, prev_close) {
            (Some(prev), Some(prev_close)) => {
                self.atr = (self.atr * (pf - 1.0) + tr) / pf;
                let upper = ratchet_upper(src + m * self.atr, prev.upper_band, prev_close);
                let lower = ratchet_lower(src - m * self.atr, prev.lower_band, prev_close);
                let direction =
                    next_direction(prev.direction, bar.close(), prev.upper_band, prev.lower_band);
                point(direction, upper, lower, self.atr)
            }
            _ => {
                // First evaluable index: TR[1..=p] complete
                self.tr_seed_sum += tr;
                self.atr = self.tr_seed_sum / pf;
                let upper = src + m * self.atr;
                let lower = src - m * self.atr;
                point(initial_direction(bar.close(), upper), upper, lower, self.atr)
            }
        };

        self.last = Some(next);
        Some(next)
    }

    /// Last computed point
    pub fn last(&self) -> Option<SupertrendPoint> {
        self.last
    }

    /// Number of bars pushed so far
    pub fn len(&self) -> usize {
        self.pushed
    }

    pub fn is_empty(&self) -> bool {
        self.pushed == 0
    }

    /// Forget all history, e.g. after a gap in the candle stream
    pub fn reset(&mut self) {
        *self = Self::new(self.params);
    }
}

/// Supertrend for every index of `bars`, rolled forward incrementally
pub fn supertrend_series<T: OHLCV>(
    bars: &[T],
    params: SupertrendParams,
) -> Vec<Option<SupertrendPoint>> {
    let mut state = SupertrendState::new(params);
    bars.iter().map(|bar| state.push(bar)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy)]
    struct Bar {
        h: f64,
        l: f64,
        c: f64,
    }

    impl OHLCV for Bar {
        fn open(&self) -> f64 {
            self.c
        }

        fn high(&self) -> f64 {
            self.h
        }

        fn low(&self) -> f64 {
            self.l
        }

        fn close(&self) -> f64 {
            self.c
        }

        fn volume(&self) -> f64 {
            1.0
        }
    }

    fn bar(c: f64, spread: f64) -> Bar {
        Bar {
            h: c + spread,
            l: c - spread,
            c,
        }
    }

    /// Down leg, up leg, down leg: forces both flip directions
    fn zigzag() -> Vec<Bar> {
        let mut bars = Vec::new();
        for i in 0..25 {
            bars.push(bar(100.0 - i as f64 * 1.5, 1.0));
        }
        for i in 0..25 {
            bars.push(bar(64.0 + i as f64 * 2.0, 1.2));
        }
        for i in 0..25 {
            bars.push(bar(112.0 - i as f64 * 2.5, 0.8));
        }
        bars
    }

    #[test]
    fn test_true_range() {
        let bars = vec![bar(10.0, 1.0), bar(14.0, 0.5)];
        assert_eq!(true_range(&bars, 0), 2.0);
        // |14.5 - 10| dominates
        assert_eq!(true_range(&bars, 1), 4.5);
    }

    #[test]
    fn test_insufficient_history() {
        let bars: Vec<Bar> = (0..10).map(|i| bar(10.0 + i as f64, 1.0)).collect();
        let params = SupertrendParams::default();
        assert!(supertrend_at(&bars, 9, params).is_none());
        assert!(supertrend_series(&bars, params).iter().all(Option::is_none));
    }

    #[test]
    fn test_atr_seed_excludes_first_bar() {
        let mut bars: Vec<Bar> = (0..11).map(|_| bar(10.0, 1.0)).collect();
        bars[0] = bar(10.0, 50.0);
        let st = supertrend_at(&bars, 10, SupertrendParams::default()).unwrap();
        assert!((st.atr - 2.0).abs() < 1e-12);
        assert!((st.upper_band - 16.0).abs() < 1e-12);
        assert!((st.lower_band - 4.0).abs() < 1e-12);
        assert_eq!(st.direction, TrendDirection::Down);
        assert_eq!(st.value, st.upper_band);
    }

    #[test]
    fn test_both_flips_occur() {
        let series = supertrend_series(&zigzag(), SupertrendParams::default());
        let dirs: Vec<TrendDirection> = series.iter().flatten().map(|p| p.direction).collect();
        let ups = dirs
            .windows(2)
            .filter(|w| w[0].is_down() && w[1].is_up())
            .count();
        let downs = dirs
            .windows(2)
            .filter(|w| w[0].is_up() && w[1].is_down())
            .count();
        assert!(ups >= 1);
        assert!(downs >= 1);
    }

    #[test]
    fn test_active_value_follows_direction() {
        for p in supertrend_series(&zigzag(), SupertrendParams::default())
            .into_iter()
            .flatten()
        {
            match p.direction {
                TrendDirection::Up => assert_eq!(p.value, p.lower_band),
                TrendDirection::Down => assert_eq!(p.value, p.upper_band),
            }
        }
    }

    #[test]
    fn test_recompute_matches_incremental() {
        let bars = zigzag();
        let params = SupertrendParams::default();
        let series = supertrend_series(&bars, params);
        for (i, inc) in series.iter().enumerate() {
            let scratch = supertrend_at(&bars, i, params);
            match (scratch, inc) {
                (None, None) => {}
                (Some(a), Some(b)) => {
                    assert_eq!(a.direction, b.direction, "index {i}");
                    assert!((a.value - b.value).abs() < 1e-9, "index {i}");
                    assert!((a.upper_band - b.upper_band).abs() < 1e-9, "index {i}");
                    assert!((a.lower_band - b.lower_band).abs() < 1e-9, "index {i}");
                }
                _ => panic!("availability differs at index {i}"),
            }
        }
    }

    #[test]
    fn test_close_equal_to_band_does_not_flip() {
        let params = SupertrendParams::new(2, 1.0).unwrap();
        let mut bars = vec![bar(10.0, 1.0), bar(10.0, 1.0), bar(10.0, 1.0)];
        let seed = supertrend_at(&bars, 2, params).unwrap();
        assert_eq!(seed.direction, TrendDirection::Down);

        // Close exactly on the previous upper band: no flip
        bars.push(Bar {
            h: seed.upper_band,
            l: seed.upper_band - 2.0,
            c: seed.upper_band,
        });
        let st = supertrend_at(&bars, 3, params).unwrap();
        assert_eq!(st.direction, TrendDirection::Down);
    }

    #[test]
    fn test_upper_band_ratchets_down_in_downtrend() {
        let bars: Vec<Bar> = (0..40).map(|i| bar(200.0 - i as f64 * 2.0, 1.0)).collect();
        let series = supertrend_series(&bars, SupertrendParams::default());
        let uppers: Vec<f64> = series.iter().flatten().map(|p| p.upper_band).collect();
        assert!(uppers.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_reset() {
        let bars = zigzag();
        let mut state = SupertrendState::new(SupertrendParams::default());
        for b in &bars[..20] {
            state.push(b);
        }
        assert!(state.last().is_some());
        state.reset();
        assert!(state.is_empty());
        assert!(state.last().is_none());
    }

    #[test]
    fn test_invalid_multiplier() {
        assert!(SupertrendParams::new(10, 0.0).is_err());
        assert!(SupertrendParams::new(10, f64::NAN).is_err());
        assert!(SupertrendParams::new(0, 3.0).is_err());
    }
}
