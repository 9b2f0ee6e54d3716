//! At-most-once alert filtering.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::{AlertKey, Detection};

/// Keys already reported, with the time they were first reported.
///
/// Owned by the scanner and mutated only between cycles. Without a retention
/// window the set grows for the life of the process and a key never fires
/// twice; with one, keys older than the window are evicted and may fire again.
#[derive(Debug, Clone)]
pub struct ReportedSet {
    seen: HashMap<AlertKey, DateTime<Utc>>,
    retention: Option<Duration>,
    price_decimals: u32,
}

impl Default for ReportedSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportedSet {
    /// Unbounded set, accumulation prices keyed to 4 decimals
    pub fn new() -> Self {
        Self {
            seen: HashMap::new(),
            retention: None,
            price_decimals: 4,
        }
    }

    pub fn with_retention(mut self, retention: Option<Duration>) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_price_decimals(mut self, decimals: u32) -> Self {
        self.price_decimals = decimals;
        self
    }

    /// Drop results whose key was already reported and record the rest.
    ///
    /// Duplicates within `results` collapse to their first occurrence. Input
    /// order is preserved.
    pub fn filter_fresh(&mut self, results: Vec<Detection>, now: DateTime<Utc>) -> Vec<Detection> {
        self.evict_expired(now);

        let total = results.len();
        let fresh: Vec<Detection> = results
            .into_iter()
            .filter(|d| {
                let key = d.alert_key(self.price_decimals);
                if self.seen.contains_key(&key) {
                    return false;
                }
                self.seen.insert(key, now);
                true
            })
            .collect();

        debug!(
            total,
            fresh = fresh.len(),
            tracked = self.seen.len(),
            "dedup filtered results"
        );
        fresh
    }

    /// Remove keys reported longer ago than the retention window.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let Some(retention) = self.retention else {
            return 0;
        };
        let before = self.seen.len();
        self.seen.retain(|_, reported| now - *reported < retention);
        let evicted = before - self.seen.len();
        if evicted > 0 {
            debug!(evicted, "evicted expired alert keys");
        }
        evicted
    }

    pub fn contains(&self, detection: &Detection) -> bool {
        self.seen
            .contains_key(&detection.alert_key(self.price_decimals))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
