//! Cycle timing. The caller owns the clock and the sleeping.

use crate::Interval;

/// Slack after a boundary so the exchange has closed the candle
pub const BOUNDARY_SLACK_SECS: i64 = 1;

/// Seconds from `now_secs` (Unix time) to the next `interval` boundary,
/// plus one second of slack. Exactly on a boundary waits a full interval.
pub fn seconds_until_next_boundary(now_secs: i64, interval: Interval) -> i64 {
    let step = interval.seconds();
    let next = (now_secs.div_euclid(step) + 1) * step;
    next - now_secs + BOUNDARY_SLACK_SECS
}
