//! Concurrent scan cycle over the symbol universe.
//!
//! One task per symbol runs on a bounded rayon pool: fetch the windows, build
//! the indicator context, run the detectors. Results come back over a
//! channel until every task has reported or the cycle deadline passes. Only
//! then does the coordinator touch the reported set, so dedup needs no lock.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::ScannerConfig;
use crate::dedup::ReportedSet;
use crate::delivery::{deliver_with_retry, AlertSink};
use crate::feed::{fetch_window, CandleSource, FetchError};
use crate::report::build_reports;
use crate::signal_log::SignalLog;
use crate::{
    ContextProvider, DefaultContextProvider, Detection, DetectionEngine, Interval, PatternKind,
    Result, ScoutError, Symbol, SymbolData,
};

/// Why a symbol produced no result this cycle
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("task panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanFailure {
    pub symbol: Symbol,
    pub error: TaskError,
}

/// Raw result of one parallel scan, before dedup
#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    /// Ordered by candle time, then symbol, then kind
    pub detections: Vec<Detection>,
    pub failures: Vec<ScanFailure>,
    /// Symbols that had not reported when the deadline passed
    pub timed_out: Vec<Symbol>,
    /// Tasks from this or earlier cycles still holding a worker or queued
    /// when collection ended
    pub still_running: usize,
    pub duration: Duration,
}

/// Everything a cycle did
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    /// Detections found before dedup
    pub found: usize,
    /// Detections not reported in an earlier cycle
    pub fresh: Vec<Detection>,
    /// Report text per kind, already truncated
    pub reports: Vec<(PatternKind, String)>,
    pub delivered: usize,
    pub undelivered: usize,
    pub failures: Vec<ScanFailure>,
    pub timed_out: Vec<Symbol>,
    pub still_running: usize,
    pub duration: Duration,
}

/// Scan context: engine, collaborators, worker pool and the reported set.
pub struct Scanner<S: CandleSource, C: ContextProvider + 'static = DefaultContextProvider> {
    engine: Arc<DetectionEngine<C>>,
    source: Arc<S>,
    universe: Vec<Symbol>,
    config: ScannerConfig,
    reported: ReportedSet,
    pool: rayon::ThreadPool,
    in_flight: Arc<AtomicUsize>,
    sink: Option<Box<dyn AlertSink>>,
    signal_log: Option<SignalLog>,
}

impl<S: CandleSource, C: ContextProvider + 'static> Scanner<S, C> {
    /// Validate the configuration and start the worker pool.
    ///
    /// Duplicate symbols in `universe` are dropped, keeping first occurrence.
    pub fn new(
        engine: DetectionEngine<C>,
        source: S,
        universe: Vec<Symbol>,
        config: ScannerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let mut seen = HashSet::new();
        let universe: Vec<Symbol> = universe
            .into_iter()
            .filter(|s| seen.insert(s.clone()))
            .collect();
        if universe.is_empty() {
            return Err(ScoutError::EmptyUniverse);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("scout-worker-{i}"))
            .build()?;

        let reported = ReportedSet::new()
            .with_retention(config.dedup_retention())
            .with_price_decimals(config.price_decimals);

        info!(
            symbols = universe.len(),
            workers = config.workers,
            detectors = engine.detectors().len(),
            "scanner ready"
        );

        Ok(Self {
            engine: Arc::new(engine),
            source: Arc::new(source),
            universe,
            config,
            reported,
            pool,
            in_flight: Arc::new(AtomicUsize::new(0)),
            sink: None,
            signal_log: None,
        })
    }

    pub fn with_sink(mut self, sink: impl AlertSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn with_signal_log(mut self, log: SignalLog) -> Self {
        self.signal_log = Some(log);
        self
    }

    pub fn universe(&self) -> &[Symbol] {
        &self.universe
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn engine(&self) -> &DetectionEngine<C> {
        &self.engine
    }

    pub fn reported(&self) -> &ReportedSet {
        &self.reported
    }

    /// Spawned tasks that have not finished, including abandoned ones
    pub fn tasks_in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Evaluate every symbol in parallel. Does not dedup or deliver.
    ///
    /// Tasks still running at the deadline are abandoned: they finish on the
    /// pool in the background and their results are discarded. An abandoned
    /// task keeps its worker until its fetch returns, so a source that hangs
    /// on `workers` symbols stalls the following cycles too.
    pub fn scan(&self, now: DateTime<Utc>) -> ScanOutput {
        let started = Instant::now();
        let deadline = started + self.config.cycle_deadline();
        let since = self.config.scope.resolve(now);
        let (hourly_limit, quarter_limit) = (self.config.hourly_limit, self.config.quarter_limit);

        let (tx, rx) = mpsc::channel();
        for symbol in &self.universe {
            let tx = tx.clone();
            let engine = Arc::clone(&self.engine);
            let source = Arc::clone(&self.source);
            let symbol = symbol.clone();
            let in_flight = Arc::clone(&self.in_flight);

            in_flight.fetch_add(1, Ordering::SeqCst);
            self.pool.spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    evaluate_symbol(&*engine, &*source, &symbol, hourly_limit, quarter_limit, since)
                }));
                let outcome = match result {
                    Ok(r) => r.map_err(TaskError::from),
                    Err(payload) => Err(TaskError::Panicked(panic_message(payload.as_ref()))),
                };
                in_flight.fetch_sub(1, Ordering::SeqCst);
                // Receiver is gone once the deadline passed
                let _ = tx.send((symbol, outcome));
            });
        }
        drop(tx);

        let mut pending: HashSet<Symbol> = self.universe.iter().cloned().collect();
        let mut output = ScanOutput::default();
        while !pending.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((symbol, outcome)) => {
                    pending.remove(&symbol);
                    match outcome {
                        Ok(mut detections) => {
                            debug!(symbol = %symbol, found = detections.len(), "symbol scanned");
                            output.detections.append(&mut detections);
                        }
                        Err(error) => {
                            warn!(symbol = %symbol, error = %error, "symbol skipped this cycle");
                            output.failures.push(ScanFailure { symbol, error });
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(pending = pending.len(), "cycle deadline reached, dropping late results");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        output.timed_out = self
            .universe
            .iter()
            .filter(|s| pending.contains(*s))
            .cloned()
            .collect();
        output.still_running = self.in_flight.load(Ordering::SeqCst);
        if output.still_running >= self.config.workers {
            warn!(
                still_running = output.still_running,
                workers = self.config.workers,
                "every worker is held by an unfinished task"
            );
        }
        output.detections.sort_by(|a, b| {
            a.open_time()
                .cmp(&b.open_time())
                .then_with(|| a.symbol().cmp(b.symbol()))
                .then_with(|| a.kind().cmp(&b.kind()))
        });
        output.duration = started.elapsed();
        output
    }

    /// Scan, dedup, build and deliver reports, log accumulation signals.
    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        let ScanOutput {
            detections,
            failures,
            timed_out,
            still_running,
            duration,
        } = self.scan(now);

        let found = detections.len();
        let fresh = self.reported.filter_fresh(detections, now);
        let reports = build_reports(
            &fresh,
            duration,
            self.config.max_message_chars,
            &self.config.quote,
        );

        let (mut delivered, mut undelivered) = (0, 0);
        if let Some(sink) = &self.sink {
            for (kind, text) in &reports {
                if deliver_with_retry(sink.as_ref(), &self.config.destination, text, &self.config.delivery)
                {
                    delivered += 1;
                } else {
                    warn!(kind = %kind, "report not delivered");
                    undelivered += 1;
                }
            }
        }

        if let Some(log) = &mut self.signal_log {
            for detection in &fresh {
                if let Detection::Accumulation(signal) = detection {
                    log.record(signal, now);
                }
            }
        }

        info!(
            scanned = self.universe.len(),
            found,
            fresh = fresh.len(),
            failed = failures.len(),
            timed_out = timed_out.len(),
            still_running,
            elapsed_ms = duration.as_millis() as u64,
            "scan cycle complete"
        );

        CycleOutcome {
            found,
            fresh,
            reports,
            delivered,
            undelivered,
            failures,
            timed_out,
            still_running,
            duration,
        }
    }
}

/// Fetch one symbol's windows and run the engine over them.
///
/// A failed 15-minute fetch only disables the detectors that need it.
pub fn evaluate_symbol<S: CandleSource + ?Sized, C: ContextProvider>(
    engine: &DetectionEngine<C>,
    source: &S,
    symbol: &Symbol,
    hourly_limit: usize,
    quarter_limit: usize,
    since: Option<DateTime<Utc>>,
) -> std::result::Result<Vec<Detection>, FetchError> {
    let hourly = fetch_window(source, symbol, Interval::H1, hourly_limit)?;

    let quarter = if engine.needs_quarter_window() {
        match fetch_window(source, symbol, Interval::M15, quarter_limit) {
            Ok(window) => Some(window),
            Err(error) => {
                warn!(symbol = %symbol, error = %error, "15m window unavailable");
                None
            }
        }
    } else {
        None
    };

    Ok(engine.scan(&SymbolData::new(hourly, quarter), since))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
