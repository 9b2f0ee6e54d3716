//! Relative Strength Index with Wilder's smoothing.
//!
//! The first `period` gains/losses seed the averages with a simple mean; every
//! later sample is smoothed with `avg = (avg * (period - 1) + x) / period`.
//! A final average loss of exactly zero yields 100.0.

use crate::Period;

use super::round_to;

/// RSI of the full close sequence, rounded to 2 decimals.
///
/// Returns `None` when fewer than `period + 1` closes are available.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let (gains, losses): (Vec<f64>, Vec<f64>) = closes
        .windows(2)
        .map(|w| {
            let change = w[1] - w[0];
            (change.max(0.0), (-change).max(0.0))
        })
        .unzip();

    let p = period as f64;
    let mut avg_gain = gains[..period].iter().sum::<f64>() / p;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / p;

    for (gain, loss) in gains[period..].iter().zip(&losses[period..]) {
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
    }

    Some(finish(avg_gain, avg_loss))
}

#[inline]
fn finish(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    round_to(100.0 - 100.0 / (1.0 + rs), 2)
}

/// Incremental RSI: feed closes one at a time.
///
/// After `n` pushes the returned value equals `rsi(&closes[..n], period)`.
#[derive(Debug, Clone)]
pub struct RsiState {
    period: usize,
    prev_close: Option<f64>,
    samples: usize,
    gain_sum: f64,
    loss_sum: f64,
    averages: Option<(f64, f64)>,
}

impl RsiState {
    pub fn new(period: Period) -> Self {
        Self {
            period: period.get(),
            prev_close: None,
            samples: 0,
            gain_sum: 0.0,
            loss_sum: 0.0,
            averages: None,
        }
    }

    /// Push the next close and return the RSI including it
    pub fn push(&mut self, close: f64) -> Option<f64> {
        let prev = self.prev_close.replace(close)?;

        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let p = self.period as f64;

        match self.averages {
            Some((avg_gain, avg_loss)) => {
                self.averages = Some((
                    (avg_gain * (p - 1.0) + gain) / p,
                    (avg_loss * (p - 1.0) + loss) / p,
                ));
            }
            None => {
                self.gain_sum += gain;
                self.loss_sum += loss;
                self.samples += 1;
                if self.samples < self.period {
                    return None;
                }
                self.averages = Some((self.gain_sum / p, self.loss_sum / p));
            }
        }

        self.value()
    }

    /// Current RSI, None while still seeding
    pub fn value(&self) -> Option<f64> {
        self.averages.map(|(g, l)| finish(g, l))
    }

    /// Forget all history
    pub fn reset(&mut self) {
        *self = Self::new(Period::new_const(self.period));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_history() {
        assert_eq!(rsi(&[1.0; 14], 14), None);
        assert_eq!(rsi(&[], 14), None);
        assert_eq!(rsi(&[1.0, 2.0], 0), None);
    }

    #[test]
    fn test_strictly_increasing_is_100() {
        let closes: Vec<f64> = (0..50).map(|i| 10.0 + i as f64 * 0.37).collect();
        assert_eq!(rsi(&closes, 14), Some(100.0));
    }

    #[test]
    fn test_strictly_decreasing_is_0() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        assert_eq!(rsi(&closes, 14), Some(0.0));
    }

    #[test]
    fn test_known_value_seed_only() {
        // 15 closes alternating +2 / -1: 7 gains of 2, 7 losses of 1
        let mut closes = vec![100.0];
        for i in 0..14 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last + 2.0 } else { last - 1.0 });
        }
        // avg_gain = 14/14 = 1, avg_loss = 7/14 = 0.5, rs = 2 -> 66.67
        assert_eq!(rsi(&closes, 14), Some(66.67));
    }

    #[test]
    fn test_wilder_smoothing_step() {
        let mut closes = vec![100.0];
        for i in 0..14 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last + 2.0 } else { last - 1.0 });
        }
        let last = *closes.last().unwrap();
        closes.push(last - 3.0);
        // avg_gain = 13/14, avg_loss = (6.5 + 3)/14 -> rs = 13/9.5
        let expected = round_to(100.0 - 100.0 / (1.0 + 13.0 / 9.5), 2);
        assert_eq!(rsi(&closes, 14), Some(expected));
    }

    #[test]
    fn test_incremental_matches_from_scratch() {
        let closes: Vec<f64> = (0..80)
            .map(|i| 50.0 + ((i * 37 % 23) as f64 - 11.0) * 0.4 + i as f64 * 0.05)
            .collect();
        let mut state = RsiState::new(Period::new_const(14));
        for n in 1..=closes.len() {
            assert_eq!(state.push(closes[n - 1]), rsi(&closes[..n], 14), "n = {n}");
        }
    }

    #[test]
    fn test_reset() {
        let mut state = RsiState::new(Period::new_const(2));
        state.push(1.0);
        state.push(2.0);
        assert_eq!(state.push(3.0), Some(100.0));
        state.reset();
        assert_eq!(state.value(), None);
        assert_eq!(state.push(3.0), None);
    }
}
