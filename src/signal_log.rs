//! Append-only JSON-lines log of accumulation signals.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::{AccumulationSignal, Result};

#[derive(Serialize)]
struct Record<'a> {
    logged_at: DateTime<Utc>,
    #[serde(flatten)]
    signal: &'a AccumulationSignal,
}

/// One JSON object per line, appended and flushed per signal.
///
/// Writes are best effort: a failed append is logged and the cycle goes on.
#[derive(Debug)]
pub struct SignalLog {
    path: PathBuf,
    file: File,
}

impl SignalLog {
    /// Open `path` for appending, creating it if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&mut self, signal: &AccumulationSignal, at: DateTime<Utc>) {
        if let Err(err) = self.try_record(signal, at) {
            warn!(
                path = %self.path.display(),
                symbol = %signal.symbol,
                error = %err,
                "failed to append signal log"
            );
        }
    }

    fn try_record(&mut self, signal: &AccumulationSignal, at: DateTime<Utc>) -> io::Result<()> {
        let mut line = serde_json::to_string(&Record {
            logged_at: at,
            signal,
        })?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.flush()
    }
}
