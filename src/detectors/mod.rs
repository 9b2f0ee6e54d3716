//! Pattern detectors
//!
//! Each detector evaluates one closed hourly index of a [`SymbolData`](crate::SymbolData)
//! against the precomputed [`IndicatorContext`](crate::IndicatorContext).
//!
//! # Detectors
//!
//! - **Pump**: close-to-close move at or above a percentage threshold.
//! - **Breakout**: Supertrend flips from downtrend to uptrend.
//! - **Support touch**: downtrend with the close just above the lower band.
//! - **Accumulation**: flat hourly bodies plus a sustained 15-minute volume spike.

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod accumulation;
pub mod breakout;
pub mod pump;
pub mod support;

impl_with_defaults!(
    PumpDetector,
    BreakoutDetector,
    SupportTouchDetector,
    AccumulationDetector,
);

// Re-export all detectors for convenience
pub use accumulation::*;
pub use breakout::*;
pub use helpers::*;
pub use pump::*;
pub use support::*;
