//! # Candle Scout
//!
//! Concurrent indicator scanner for a fixed universe of trading symbols.
//! Computes Wilder RSI, RMA ATR and Supertrend over per-symbol candle windows
//! and raises deduplicated alerts for momentum pumps, downtrend-to-uptrend
//! breakouts, support-band touches and low-volatility accumulation.
//!
//! It never places orders. Candle retrieval and message delivery are supplied
//! by the caller through [`feed::CandleSource`] and [`delivery::AlertSink`].
//!
//! ## Quick Start
//!
//! ```rust
//! use candle_scout::prelude::*;
//!
//! let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
//!
//! let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
//! assert_eq!(rsi(&closes, 14), Some(100.0));
//!
//! let window = CandleWindow::from_closed(Symbol::new("BTCUSDT"), Interval::H1, Vec::new());
//! let data = SymbolData::hourly_only(window);
//! assert!(engine.scan(&data, None).is_empty());
//! ```

pub mod config;
pub mod dedup;
pub mod delivery;
pub mod detectors;
pub mod feed;
pub mod indicators;
pub mod report;
pub mod scanner;
pub mod schedule;
pub mod signal_log;
pub mod universe;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod prelude {
    pub use crate::{
        // Configuration
        config::{RetryPolicy, ScanScope, ScannerConfig},
        // Dedup
        dedup::ReportedSet,
        // Delivery
        delivery::{deliver_with_retry, AlertSink, DeliveryError},
        // Detectors
        detectors::*,
        // Feed
        feed::{fetch_window, parse_klines, CandleSource, FetchError, MemorySource},
        // Indicators
        indicators::{
            rsi, supertrend_at, supertrend_series, RsiState, SupertrendParams, SupertrendPoint,
            SupertrendState, TrendDirection,
        },
        // Reports
        report::{build_reports, format_volume},
        // Scanner
        scanner::{CycleOutcome, ScanFailure, ScanOutput, Scanner, TaskError},
        // Scheduling & universe
        schedule::seconds_until_next_boundary,
        signal_log::SignalLog,
        universe::{retain_tradable, symbols_from_tickers},
        // Engine
        AccumulationSignal,
        AlertKey,
        BarMetrics,
        BreakoutSignal,
        BuiltinDetector,
        Candle,
        CandleWindow,
        ContextProvider,
        DefaultContextProvider,
        Detection,
        DetectionEngine,
        EngineBuilder,
        IndicatorContext,
        Interval,
        OHLCVExt,
        PatternDetector,
        PatternKind,
        Period,
        PumpSignal,
        Result,
        ScoutError,
        SupportTouchSignal,
        Symbol,
        SymbolData,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, ScoutError>;

/// Errors raised while configuring or constructing scanner components.
///
/// Nothing inside a running scan cycle produces a `ScoutError`: per-symbol
/// problems are [`feed::FetchError`]s and are absorbed by the scanner.
#[derive(Debug, thiserror::Error)]
pub enum ScoutError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Symbol universe is empty")]
    EmptyUniverse,

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Signal log error: {0}")]
    SignalLog(#[from] std::io::Error),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(ScoutError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    /// Supertrend source price, (high + low) / 2
    #[inline]
    fn hl2(&self) -> f64 {
        (self.high() + self.low()) / 2.0
    }

    /// Body size as a percentage of the open. None if open <= 0
    #[inline]
    fn body_pct(&self) -> Option<f64> {
        let open = self.open();
        (open > 0.0).then(|| self.body() / open * 100.0)
    }

    /// Volume in quote currency, approximated as open * base volume
    #[inline]
    fn quote_volume(&self) -> f64 {
        self.open() * self.volume()
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> std::result::Result<(), &'static str> {
        let values = [
            self.open(),
            self.high(),
            self.low(),
            self.close(),
            self.volume(),
        ];
        if values.iter().any(|v| v.is_nan()) {
            return Err("NaN in OHLCV");
        }
        if values.iter().any(|v| v.is_infinite()) {
            return Err("Infinite value in OHLCV");
        }
        if self.high() < self.low() {
            return Err("high < low");
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// CANDLES & WINDOWS
// ============================================================

/// One OHLCV bar. Immutable once its interval has closed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        open_time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

/// Trading pair identifier, e.g. `BTCUSDT`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Symbol with the quote asset suffix removed (`BTCUSDT` -> `BTC`)
    pub fn base<'a>(&'a self, quote: &str) -> &'a str {
        self.0.strip_suffix(quote).unwrap_or(&self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Candle interval understood by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "15m")]
    M15,
}

impl Interval {
    /// Exchange interval code
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::H1 => "1h",
            Interval::M15 => "15m",
        }
    }

    pub fn seconds(self) -> i64 {
        match self {
            Interval::H1 => 3_600,
            Interval::M15 => 900,
        }
    }

    /// Time-bucket key of a candle opened at `open_time`
    pub fn bucket(self, open_time: DateTime<Utc>) -> String {
        match self {
            Interval::H1 => open_time.format("%Y-%m-%d %H:00").to_string(),
            Interval::M15 => open_time.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed candles of one symbol and interval, oldest first.
#[derive(Debug, Clone)]
pub struct CandleWindow {
    symbol: Symbol,
    interval: Interval,
    candles: Vec<Candle>,
}

impl CandleWindow {
    /// Wrap candles that are already known to be closed.
    pub fn from_closed(symbol: Symbol, interval: Interval, candles: Vec<Candle>) -> Self {
        Self {
            symbol,
            interval,
            candles,
        }
    }

    /// Build a window from a provider response. The last element is the
    /// still-forming candle and is dropped; ordering and values are validated.
    pub fn from_raw(
        symbol: Symbol,
        interval: Interval,
        mut candles: Vec<Candle>,
    ) -> std::result::Result<Self, feed::FetchError> {
        if candles.is_empty() {
            return Err(feed::FetchError::Empty);
        }
        for (i, candle) in candles.iter().enumerate() {
            candle
                .validate()
                .map_err(|reason| feed::FetchError::Malformed(format!("row {i}: {reason}")))?;
        }
        if candles.windows(2).any(|w| w[0].open_time >= w[1].open_time) {
            return Err(feed::FetchError::Malformed(
                "candles not in ascending open-time order".to_string(),
            ));
        }
        candles.pop();
        Ok(Self::from_closed(symbol, interval, candles))
    }

    #[inline]
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    #[inline]
    pub fn interval(&self) -> Interval {
        self.interval
    }

    #[inline]
    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Index of the newest closed candle
    #[inline]
    pub fn last_closed_index(&self) -> Option<usize> {
        self.candles.len().checked_sub(1)
    }

    /// Time-bucket key of the candle at `index`
    pub fn bucket_at(&self, index: usize) -> Option<String> {
        self.candles
            .get(index)
            .map(|c| self.interval.bucket(c.open_time))
    }
}

/// Everything a detector may read for one symbol in one cycle.
#[derive(Debug, Clone)]
pub struct SymbolData {
    pub hourly: CandleWindow,
    /// Finer series used by the accumulation detector
    pub quarter: Option<CandleWindow>,
}

impl SymbolData {
    pub fn new(hourly: CandleWindow, quarter: Option<CandleWindow>) -> Self {
        Self { hourly, quarter }
    }

    pub fn hourly_only(hourly: CandleWindow) -> Self {
        Self {
            hourly,
            quarter: None,
        }
    }

    #[inline]
    pub fn symbol(&self) -> &Symbol {
        self.hourly.symbol()
    }
}

// ============================================================
// DETECTIONS
// ============================================================

/// Kind of alert a detector raises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PatternKind {
    Pump,
    Breakout,
    SupportTouch,
    Accumulation,
}

impl PatternKind {
    pub const ALL: [PatternKind; 4] = [
        PatternKind::Pump,
        PatternKind::Breakout,
        PatternKind::SupportTouch,
        PatternKind::Accumulation,
    ];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::Pump => "PUMP",
            PatternKind::Breakout => "BREAKOUT",
            PatternKind::SupportTouch => "SUPPORT_TOUCH",
            PatternKind::Accumulation => "ACCUMULATION",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price/volume figures shared by all hourly detections
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BarMetrics {
    pub close: f64,
    /// Close-to-close change in percent
    pub pct: f64,
    pub rsi: Option<f64>,
    pub quote_volume: f64,
    /// Quote volume relative to its trailing mean
    pub volume_multiple: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PumpSignal {
    pub symbol: Symbol,
    pub bucket: String,
    pub open_time: DateTime<Utc>,
    pub metrics: BarMetrics,
    /// Candles back to the previous pump, 250 when there was none
    pub candles_since_last_pump: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakoutSignal {
    pub symbol: Symbol,
    pub bucket: String,
    pub open_time: DateTime<Utc>,
    pub metrics: BarMetrics,
    /// Last downtrend line (upper band of the previous candle)
    pub old_red_line: f64,
    pub red_distance: f64,
    /// First uptrend line (lower band of this candle)
    pub new_green_line: f64,
    pub green_distance: f64,
    pub candles_since_last_breakout: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupportTouchSignal {
    pub symbol: Symbol,
    pub bucket: String,
    pub open_time: DateTime<Utc>,
    pub metrics: BarMetrics,
    pub support: f64,
    pub resistance: f64,
    pub distance_to_support: f64,
    pub distance_to_resistance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccumulationSignal {
    pub symbol: Symbol,
    /// 15-minute bucket of the newest spike candle
    pub bucket: String,
    pub open_time: DateTime<Utc>,
    pub price: f64,
    /// Newest 15m volume over the baseline mean
    pub volume_ratio: f64,
    /// Smallest ratio across the spike block
    pub min_volume_ratio: f64,
    /// Largest hourly body over the stability window, percent
    pub max_body_pct: f64,
}

/// Result of one detector at one candle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum Detection {
    Pump(PumpSignal),
    Breakout(BreakoutSignal),
    SupportTouch(SupportTouchSignal),
    Accumulation(AccumulationSignal),
}

impl Detection {
    pub fn kind(&self) -> PatternKind {
        match self {
            Detection::Pump(_) => PatternKind::Pump,
            Detection::Breakout(_) => PatternKind::Breakout,
            Detection::SupportTouch(_) => PatternKind::SupportTouch,
            Detection::Accumulation(_) => PatternKind::Accumulation,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        match self {
            Detection::Pump(s) => &s.symbol,
            Detection::Breakout(s) => &s.symbol,
            Detection::SupportTouch(s) => &s.symbol,
            Detection::Accumulation(s) => &s.symbol,
        }
    }

    pub fn bucket(&self) -> &str {
        match self {
            Detection::Pump(s) => &s.bucket,
            Detection::Breakout(s) => &s.bucket,
            Detection::SupportTouch(s) => &s.bucket,
            Detection::Accumulation(s) => &s.bucket,
        }
    }

    pub fn open_time(&self) -> DateTime<Utc> {
        match self {
            Detection::Pump(s) => s.open_time,
            Detection::Breakout(s) => s.open_time,
            Detection::SupportTouch(s) => s.open_time,
            Detection::Accumulation(s) => s.open_time,
        }
    }

    /// Dedup identity. Accumulation is keyed by price rounded to
    /// `price_decimals`, everything else by time bucket. A price too large
    /// to scale is keyed by its exact value instead.
    pub fn alert_key(&self, price_decimals: u32) -> AlertKey {
        match self {
            Detection::Accumulation(s) => match scale_price(s.price, price_decimals) {
                Some(scaled_price) => AlertKey::Price {
                    symbol: s.symbol.clone(),
                    scaled_price,
                },
                None => AlertKey::ExactPrice {
                    symbol: s.symbol.clone(),
                    bits: s.price.to_bits(),
                },
            },
            other => AlertKey::Bucket {
                kind: other.kind(),
                symbol: other.symbol().clone(),
                bucket: other.bucket().to_string(),
            },
        }
    }
}

/// Identity used to alert at most once per logical event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlertKey {
    Bucket {
        kind: PatternKind,
        symbol: Symbol,
        bucket: String,
    },
    Price {
        symbol: Symbol,
        scaled_price: i64,
    },
    ExactPrice {
        symbol: Symbol,
        bits: u64,
    },
}

/// Price as an integer count of `10^-decimals` units. None if the scaled
/// value is not finite or does not fit in an i64.
#[inline]
pub fn scale_price(price: f64, decimals: u32) -> Option<i64> {
    let scaled = (price * 10f64.powi(decimals as i32)).round();
    // i64::MAX as f64 rounds up to 2^63, which itself does not fit
    (scaled.is_finite() && scaled.abs() < i64::MAX as f64).then_some(scaled as i64)
}

// ============================================================
// INDICATOR CONTEXT
// ============================================================

/// Per-index indicator values for one window, computed once and shared by
/// all detectors.
#[derive(Debug, Clone, Default)]
pub struct IndicatorContext {
    pub rsi: Vec<Option<f64>>,
    pub supertrend: Vec<Option<indicators::SupertrendPoint>>,
    pub pct_change: Vec<Option<f64>>,
    pub volume_multiple: Vec<f64>,
}

impl IndicatorContext {
    #[inline]
    pub fn len(&self) -> usize {
        self.supertrend.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.supertrend.is_empty()
    }

    #[inline]
    pub fn supertrend_at(&self, index: usize) -> Option<indicators::SupertrendPoint> {
        self.supertrend.get(index).copied().flatten()
    }

    #[inline]
    pub fn pct_at(&self, index: usize) -> Option<f64> {
        self.pct_change.get(index).copied().flatten()
    }

    /// Bar metrics at `index`; None before the first close-to-close change
    pub fn metrics_at<T: OHLCV>(&self, bars: &[T], index: usize) -> Option<BarMetrics> {
        let bar = bars.get(index)?;
        Some(BarMetrics {
            close: bar.close(),
            pct: self.pct_at(index)?,
            rsi: self.rsi.get(index).copied().flatten(),
            quote_volume: bar.quote_volume(),
            volume_multiple: self.volume_multiple.get(index).copied().unwrap_or(1.0),
        })
    }
}

/// Provider of indicator context - precomputes values for all bars
pub trait ContextProvider: Send + Sync {
    fn compute_all<T: OHLCV>(&self, bars: &[T]) -> IndicatorContext;

    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Wilder RSI, Supertrend and trailing quote-volume mean, rolled forward
/// incrementally over the window.
#[derive(Debug, Clone)]
pub struct DefaultContextProvider {
    pub rsi_period: Period,
    pub supertrend: indicators::SupertrendParams,
    pub volume_period: Period,
}

impl Default for DefaultContextProvider {
    fn default() -> Self {
        Self {
            rsi_period: Period::new_const(14),
            supertrend: indicators::SupertrendParams::default(),
            volume_period: Period::new_const(20),
        }
    }
}

impl ContextProvider for DefaultContextProvider {
    fn compute_all<T: OHLCV>(&self, bars: &[T]) -> IndicatorContext {
        let len = bars.len();
        let mut ctx = IndicatorContext {
            rsi: Vec::with_capacity(len),
            supertrend: Vec::with_capacity(len),
            pct_change: Vec::with_capacity(len),
            volume_multiple: Vec::with_capacity(len),
        };

        let mut rsi = indicators::RsiState::new(self.rsi_period);
        let mut supertrend = indicators::SupertrendState::new(self.supertrend);
        let volume_period = self.volume_period.get();

        for (i, bar) in bars.iter().enumerate() {
            ctx.rsi.push(rsi.push(bar.close()));
            ctx.supertrend.push(supertrend.push(bar));
            ctx.pct_change.push(if i == 0 {
                None
            } else {
                indicators::pct_change(bars[i - 1].close(), bar.close())
            });

            // Trailing mean includes the current bar
            let start = (i + 1).saturating_sub(volume_period);
            let slice = &bars[start..=i];
            let mean = slice.iter().map(|b| b.quote_volume()).sum::<f64>() / slice.len() as f64;
            ctx.volume_multiple.push(if mean > 0.0 {
                bar.quote_volume() / mean
            } else {
                1.0
            });
        }

        ctx
    }

    fn validate(&self) -> Result<()> {
        self.supertrend.validate()
    }
}

// ============================================================
// PATTERN DETECTOR TRAIT
// ============================================================

/// Pattern detector capability, evaluated uniformly by the engine
pub trait PatternDetector: Send + Sync {
    fn kind(&self) -> PatternKind;

    /// Minimum number of hourly bars up to and including the evaluated index
    fn min_bars(&self) -> usize;

    fn detect(
        &self,
        data: &SymbolData,
        index: usize,
        ctx: &IndicatorContext,
    ) -> Option<Detection>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }

    /// Whether the detector reads the 15-minute window
    fn needs_quarter_window(&self) -> bool {
        false
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect(
                &self,
                data: &SymbolData,
                index: usize,
                ctx: &IndicatorContext,
            ) -> Option<Detection> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, data, index, ctx)),*
                }
            }

            #[inline]
            pub fn kind(&self) -> PatternKind {
                match self {
                    $(Self::$variant(d) => PatternDetector::kind(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            #[inline]
            pub fn needs_quarter_window(&self) -> bool {
                match self {
                    $(Self::$variant(d) => PatternDetector::needs_quarter_window(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    Pump(PumpDetector),
    Breakout(BreakoutDetector),
    SupportTouch(SupportTouchDetector),
    Accumulation(AccumulationDetector),
}

// ============================================================
// DETECTION ENGINE
// ============================================================

/// Runs the configured detectors over a symbol's windows
pub struct DetectionEngine<C: ContextProvider = DefaultContextProvider> {
    detectors: Vec<BuiltinDetector>,
    context_provider: C,
}

impl<C: ContextProvider> DetectionEngine<C> {
    /// Precompute indicator context for all bars.
    #[inline]
    pub fn compute_context<T: OHLCV>(&self, bars: &[T]) -> IndicatorContext {
        self.context_provider.compute_all(bars)
    }

    /// Detect patterns at a single hourly index.
    pub fn scan_at(
        &self,
        data: &SymbolData,
        index: usize,
        ctx: &IndicatorContext,
    ) -> Vec<Detection> {
        self.detectors
            .iter()
            .filter(|d| index + 1 >= d.min_bars())
            .filter_map(|d| d.detect(data, index, ctx))
            .collect()
    }

    /// Scan the closed hourly candles of `data`.
    ///
    /// With `since = None` only the newest closed candle is evaluated,
    /// otherwise every candle opened at or after `since`.
    pub fn scan(&self, data: &SymbolData, since: Option<DateTime<Utc>>) -> Vec<Detection> {
        let Some(last) = data.hourly.last_closed_index() else {
            return Vec::new();
        };

        let ctx = self.compute_context(data.hourly.candles());
        let first = match since {
            None => last,
            Some(cutoff) => data
                .hourly
                .candles()
                .iter()
                .position(|c| c.open_time >= cutoff)
                .unwrap_or(last + 1),
        };

        (first..=last)
            .flat_map(|i| self.scan_at(data, i, &ctx))
            .collect()
    }

    /// Whether any detector needs the 15-minute window fetched
    pub fn needs_quarter_window(&self) -> bool {
        self.detectors.iter().any(|d| d.needs_quarter_window())
    }

    pub fn detectors(&self) -> &[BuiltinDetector] {
        &self.detectors
    }

    fn validate(&self) -> Result<()> {
        if self.detectors.is_empty() {
            return Err(ScoutError::InvalidConfig(
                "engine has no detectors".to_string(),
            ));
        }
        for d in &self.detectors {
            d.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating DetectionEngine instances
pub struct EngineBuilder<C: ContextProvider = DefaultContextProvider> {
    context_provider: C,
    detectors: Vec<BuiltinDetector>,
}

impl Default for EngineBuilder<DefaultContextProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<DefaultContextProvider> {
    pub fn new() -> Self {
        Self {
            context_provider: DefaultContextProvider::default(),
            detectors: Vec::new(),
        }
    }
}

impl<C: ContextProvider> EngineBuilder<C> {
    /// Change context provider
    pub fn context_provider<C2: ContextProvider>(self, provider: C2) -> EngineBuilder<C2> {
        EngineBuilder {
            context_provider: provider,
            detectors: self.detectors,
        }
    }

    /// Add all four detectors with default configurations
    pub fn with_all_defaults(mut self) -> Self {
        self.detectors.extend([
            BuiltinDetector::Pump(PumpDetector::with_defaults()),
            BuiltinDetector::Breakout(BreakoutDetector::with_defaults()),
            BuiltinDetector::SupportTouch(SupportTouchDetector::with_defaults()),
            BuiltinDetector::Accumulation(AccumulationDetector::with_defaults()),
        ]);
        self
    }

    /// Add a builtin detector
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, detector: BuiltinDetector) -> Result<Self> {
        detector.validate_config()?;
        self.detectors.push(detector);
        Ok(self)
    }

    /// Build the engine, validating detectors and indicator parameters
    pub fn build(self) -> Result<DetectionEngine<C>> {
        self.context_provider.validate()?;
        let engine = DetectionEngine {
            detectors: self.detectors,
            context_provider: self.context_provider,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_hour(h: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 - 1_700_000_000 % 3_600 + h * 3_600, 0)
            .unwrap()
    }

    fn flat_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle::new(at_hour(i as i64), 100.0, 100.5, 99.5, 100.0, 10.0))
            .collect()
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(100).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_period_deserialize_rejects_zero() {
        assert!(serde_json::from_str::<Period>("0").is_err());
        assert_eq!(serde_json::from_str::<Period>("14").unwrap().get(), 14);
    }

    #[test]
    fn test_ohlcv_ext() {
        let bar = Candle::new(at_hour(0), 100.0, 110.0, 90.0, 101.0, 2.0);
        assert_eq!(bar.body(), 1.0);
        assert_eq!(bar.range(), 20.0);
        assert_eq!(bar.hl2(), 100.0);
        assert!((bar.body_pct().unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(bar.quote_volume(), 200.0);
        assert!(bar.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let bar = Candle::new(at_hour(0), 100.0, 90.0, 110.0, 100.0, 1.0);
        assert_eq!(bar.validate(), Err("high < low"));
    }

    #[test]
    fn test_interval_buckets() {
        let t = Utc.with_ymd_and_hms(2024, 3, 5, 14, 45, 0).unwrap();
        assert_eq!(Interval::H1.bucket(t), "2024-03-05 14:00");
        assert_eq!(Interval::M15.bucket(t), "2024-03-05 14:45");
    }

    #[test]
    fn test_symbol_base() {
        let s = Symbol::new("BTCUSDT");
        assert_eq!(s.base("USDT"), "BTC");
        assert_eq!(s.base("BUSD"), "BTCUSDT");
    }

    #[test]
    fn test_from_raw_drops_forming_candle() {
        let window =
            CandleWindow::from_raw(Symbol::new("XUSDT"), Interval::H1, flat_candles(5)).unwrap();
        assert_eq!(window.len(), 4);
        assert_eq!(window.last_closed_index(), Some(3));
    }

    #[test]
    fn test_from_raw_rejects_unordered() {
        let mut candles = flat_candles(3);
        candles.swap(0, 2);
        let err = CandleWindow::from_raw(Symbol::new("XUSDT"), Interval::H1, candles);
        assert!(matches!(err, Err(feed::FetchError::Malformed(_))));
    }

    #[test]
    fn test_from_raw_rejects_empty() {
        let err = CandleWindow::from_raw(Symbol::new("XUSDT"), Interval::H1, Vec::new());
        assert!(matches!(err, Err(feed::FetchError::Empty)));
    }

    #[test]
    fn test_engine_builder() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        assert_eq!(engine.detectors().len(), 4);
        assert!(engine.needs_quarter_window());
    }

    #[test]
    fn test_engine_without_detectors_is_rejected() {
        assert!(EngineBuilder::new().build().is_err());
    }

    #[test]
    fn test_add_checked_rejects_bad_config() {
        let bad = PumpDetector {
            threshold_pct: -1.0,
            ..PumpDetector::default()
        };
        assert!(EngineBuilder::new()
            .add_checked(BuiltinDetector::Pump(bad))
            .is_err());
    }

    #[test]
    fn test_empty_scan() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let window = CandleWindow::from_closed(Symbol::new("XUSDT"), Interval::H1, Vec::new());
        assert!(engine.scan(&SymbolData::hourly_only(window), None).is_empty());
    }

    #[test]
    fn test_flat_series_is_silent() {
        let engine = EngineBuilder::new()
            .add(BuiltinDetector::Pump(PumpDetector::default()))
            .add(BuiltinDetector::Breakout(BreakoutDetector::default()))
            .build()
            .unwrap();
        let window =
            CandleWindow::from_closed(Symbol::new("XUSDT"), Interval::H1, flat_candles(40));
        let data = SymbolData::hourly_only(window);
        assert!(engine.scan(&data, Some(at_hour(0))).is_empty());
    }

    #[test]
    fn test_compute_context_lengths() {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        let bars = flat_candles(30);
        let ctx = engine.compute_context(&bars);
        assert_eq!(ctx.len(), bars.len());
        assert_eq!(ctx.rsi.len(), bars.len());
        assert!(ctx.supertrend_at(9).is_none());
        assert!(ctx.supertrend_at(10).is_some());
        assert_eq!(ctx.rsi[13], None);
        assert_eq!(ctx.rsi[14], Some(100.0));
    }

    #[test]
    fn test_volume_multiple_trailing_mean() {
        let mut bars = flat_candles(5);
        bars[4].volume = 30.0;
        let ctx = DefaultContextProvider::default().compute_all(&bars);
        // quote volumes: 1000 x4, 3000 -> mean 1400
        assert!((ctx.volume_multiple[4] - 3000.0 / 1400.0).abs() < 1e-12);
        assert_eq!(ctx.volume_multiple[0], 1.0);
    }

    #[test]
    fn test_alert_keys() {
        let signal = AccumulationSignal {
            symbol: Symbol::new("XUSDT"),
            bucket: "2024-01-01 00:15".to_string(),
            open_time: at_hour(0),
            price: 1.234_56,
            volume_ratio: 2.0,
            min_volume_ratio: 1.6,
            max_body_pct: 0.4,
        };
        let a = Detection::Accumulation(signal.clone());
        let b = Detection::Accumulation(AccumulationSignal {
            price: 1.234_74,
            ..signal
        });
        assert_eq!(a.alert_key(3), b.alert_key(3));
        assert_ne!(a.alert_key(4), b.alert_key(4));
    }

    #[test]
    fn test_scale_price_rejects_overflow() {
        assert_eq!(scale_price(1.234_56, 4), Some(12_346));
        assert_eq!(scale_price(1e12, 8), None);
        assert_eq!(scale_price(f64::NAN, 4), None);
    }

    #[test]
    fn test_huge_prices_keep_distinct_keys() {
        let signal = AccumulationSignal {
            symbol: Symbol::new("XUSDT"),
            bucket: "2024-01-01 00:15".to_string(),
            open_time: at_hour(0),
            price: 1e12,
            volume_ratio: 2.0,
            min_volume_ratio: 1.6,
            max_body_pct: 0.4,
        };
        let a = Detection::Accumulation(signal.clone());
        let b = Detection::Accumulation(AccumulationSignal {
            price: 2e12,
            ..signal
        });
        assert!(matches!(a.alert_key(8), AlertKey::ExactPrice { .. }));
        assert_ne!(a.alert_key(8), b.alert_key(8));
        assert_eq!(a.alert_key(8), a.clone().alert_key(8));
    }
}
