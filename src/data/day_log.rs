//! Day-partitioned journal and the storage lock.
//!
//! Each local calendar day has exactly one append-only resource, named after
//! its date. The live writer appends to today's log while a replay may be
//! reading the same resource, so every line-level operation goes through one
//! shared [`tokio::sync::Mutex`]: held for a single write or a single read,
//! never across decoding, channel sends or network calls.

use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::medium::{LineSource, StorageMedium};
use crate::clock::{LocalZone, Timestamp};
use crate::error::StorageError;

/// The journal for one local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayLog {
    date: NaiveDate,
}

impl DayLog {
    pub fn new(date: NaiveDate) -> Self {
        Self { date }
    }

    /// The log that a reading taken at `ts` belongs to.
    pub fn containing(ts: Timestamp, zone: LocalZone) -> Option<Self> {
        zone.date_of(ts).map(Self::new)
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Resource name on the medium, e.g. `weather-data_2024-03-01.csv`.
    pub fn resource_name(&self) -> String {
        format!(
            "weather-data_{}-{:02}-{:02}.csv",
            self.date.year(),
            self.date.month(),
            self.date.day()
        )
    }

    /// The following day's log.
    pub fn next(&self) -> Option<Self> {
        self.date.succ_opt().map(Self::new)
    }
}

impl fmt::Display for DayLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.resource_name())
    }
}

/// Access to all day logs on one medium, serialised by the storage lock.
///
/// Clones share the medium and the lock.
#[derive(Clone)]
pub struct DayLogStore {
    medium: Arc<dyn StorageMedium>,
    lock: Arc<Mutex<()>>,
}

impl DayLogStore {
    pub fn new(medium: Arc<dyn StorageMedium>) -> Self {
        Self {
            medium,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Append one newline-terminated record to `log`, creating it if needed.
    pub async fn append_line(&self, log: DayLog, line: &str) -> Result<(), StorageError> {
        let mut sink = self.medium.open_append(&log.resource_name()).await?;
        let _guard = self.lock.lock().await;
        sink.write_line(line).await
    }

    /// Open `log` for a line-by-line scan. `Ok(None)` when nothing was ever
    /// written for that day.
    pub async fn open_for_read(&self, log: DayLog) -> Result<Option<LineReader>, StorageError> {
        let source = self.medium.open_read(&log.resource_name()).await?;
        Ok(source.map(|source| LineReader {
            log,
            source,
            lock: Arc::clone(&self.lock),
        }))
    }

    #[cfg(test)]
    pub(crate) fn storage_lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.lock)
    }
}

/// Lazy scan over one day log's raw record lines.
pub struct LineReader {
    log: DayLog,
    source: Box<dyn LineSource>,
    lock: Arc<Mutex<()>>,
}

impl LineReader {
    pub fn log(&self) -> DayLog {
        self.log
    }

    /// Next non-blank line without its terminator, or `None` at the end of
    /// the log. The storage lock is held only while the line is fetched.
    pub async fn next_line(&mut self) -> Result<Option<String>, StorageError> {
        loop {
            let line = {
                let _guard = self.lock.lock().await;
                self.source.read_line().await?
            };
            let Some(line) = line else {
                return Ok(None);
            };
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }
}
