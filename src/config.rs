//! Scanner configuration.
//!
//! Everything here is plain data with serde support; [`ScannerConfig::validate`]
//! runs before a [`Scanner`](crate::scanner::Scanner) is built so that a bad
//! value fails at startup rather than mid-cycle.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, ScoutError};

pub const DEFAULT_WORKERS: usize = 60;
pub const MAX_WORKERS: usize = 256;
/// Payload limit of the messaging API, in characters
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 4096;
/// Prices up to ~9e10 still scale into an i64 at this precision
pub const MAX_PRICE_DECIMALS: u32 = 8;

/// Which closed hourly candles a cycle evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanScope {
    /// Only the newest closed candle
    #[default]
    LastClosed,
    /// Every closed candle since the most recent UTC midnight
    Today,
    /// Every closed candle opened at or after the instant
    Since(DateTime<Utc>),
}

impl ScanScope {
    /// Cutoff passed to the engine; None means newest closed candle only.
    pub fn resolve(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ScanScope::LastClosed => None,
            ScanScope::Today => Some(
                now.date_naive()
                    .and_hms_opt(0, 0, 0)
                    .map(|midnight| midnight.and_utc())
                    .unwrap_or(now),
            ),
            ScanScope::Since(cutoff) => Some(cutoff),
        }
    }
}

/// Bounded fixed-backoff retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting
    pub const fn once() -> Self {
        Self {
            attempts: 1,
            backoff_ms: 0,
        }
    }

    #[inline]
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Size of the worker pool, one in-flight fetch per worker
    pub workers: usize,
    /// Hourly candles requested per symbol, forming candle included
    pub hourly_limit: usize,
    /// 15-minute candles requested per symbol, forming candle included
    pub quarter_limit: usize,
    /// Upper bound on how long a cycle waits for its tasks
    pub cycle_deadline_secs: u64,
    pub scope: ScanScope,
    /// Chat or channel the reports go to
    pub destination: String,
    pub max_message_chars: usize,
    pub delivery: RetryPolicy,
    /// Forget reported alerts after this long; None keeps them for the process
    pub dedup_retention_secs: Option<u64>,
    /// Decimals kept when keying accumulation alerts by price
    pub price_decimals: u32,
    /// Quote asset stripped from symbols in reports
    pub quote: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            hourly_limit: 100,
            quarter_limit: 20,
            cycle_deadline_secs: 300,
            scope: ScanScope::default(),
            destination: String::new(),
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            delivery: RetryPolicy::default(),
            dedup_retention_secs: None,
            price_decimals: 4,
            quote: "USDT".to_string(),
        }
    }
}

impl ScannerConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ScoutError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(ScoutError::OutOfRange {
                field: "workers",
                value: self.workers as f64,
                min: 1.0,
                max: MAX_WORKERS as f64,
            });
        }
        if self.hourly_limit < 2 {
            return Err(ScoutError::InvalidConfig(format!(
                "hourly_limit must be at least 2, got {}",
                self.hourly_limit
            )));
        }
        if self.quarter_limit < 2 {
            return Err(ScoutError::InvalidConfig(format!(
                "quarter_limit must be at least 2, got {}",
                self.quarter_limit
            )));
        }
        if self.cycle_deadline_secs == 0 {
            return Err(ScoutError::InvalidValue("cycle_deadline_secs must be > 0"));
        }
        if self.max_message_chars == 0 {
            return Err(ScoutError::InvalidValue("max_message_chars must be > 0"));
        }
        if self.delivery.attempts == 0 {
            return Err(ScoutError::InvalidValue("delivery.attempts must be > 0"));
        }
        if self.price_decimals > MAX_PRICE_DECIMALS {
            return Err(ScoutError::OutOfRange {
                field: "price_decimals",
                value: self.price_decimals as f64,
                min: 0.0,
                max: MAX_PRICE_DECIMALS as f64,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn cycle_deadline(&self) -> Duration {
        Duration::from_secs(self.cycle_deadline_secs)
    }

    pub fn dedup_retention(&self) -> Option<chrono::Duration> {
        self.dedup_retention_secs
            .and_then(|secs| chrono::Duration::try_seconds(secs as i64))
    }
}
