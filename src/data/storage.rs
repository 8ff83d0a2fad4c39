//! Journal writer.
//!
//! Drains the storage channel and appends each reading to the day log of its
//! local date. There is no explicit rotation: the target log is recomputed on
//! every append, so the first reading after local midnight lands in a new file.
//! A failed append is reported and the reading is dropped; a card that is full
//! or missing does not heal itself within a session.
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::day_log::{DayLog, DayLogStore};
use super::record;
use crate::clock::Clock;
use crate::error::StorageError;
use crate::reading::SensorReading;
use crate::status::{StatusBoard, StatusSource};

/// Appends readings to the current day's log.
pub struct StorageWriter {
    store: DayLogStore,
    clock: Arc<dyn Clock>,
    status: StatusBoard,
    current: Option<DayLog>,
}

impl StorageWriter {
    pub fn new(store: DayLogStore, clock: Arc<dyn Clock>, status: StatusBoard) -> Self {
        Self {
            store,
            clock,
            status,
            current: None,
        }
    }

    /// The log written by the most recent successful append.
    pub fn current_log(&self) -> Option<DayLog> {
        self.current
    }

    /// Append one reading as a record line.
    ///
    /// The day log is chosen from the reading's own timestamp in the clock's
    /// zone, not from `now()`, so a write delayed past midnight still lands in
    /// the file of the day it was sampled.
    pub async fn append(&mut self, reading: &SensorReading) -> Result<(), StorageError> {
        if !reading.valid {
            return Err(StorageError::InvalidReading);
        }

        let zone = self.clock.zone();
        let log = DayLog::containing(reading.timestamp, zone).ok_or(StorageError::InvalidReading)?;
        let line = record::encode(reading, zone).ok_or(StorageError::InvalidReading)?;

        self.store.append_line(log, &line).await?;

        if self.current != Some(log) {
            match self.current {
                Some(previous) => info!(from = %previous, to = %log, "Rotated day log"),
                None => info!(log = %log, "Opened day log"),
            }
            self.current = Some(log);
        }
        debug!(log = %log, timestamp = reading.timestamp, "Appended reading");
        Ok(())
    }

    /// Drain `rx` until every sender is gone. Per-reading failures are
    /// reported and absorbed.
    pub async fn run(mut self, mut rx: mpsc::Receiver<SensorReading>) {
        while let Some(reading) = rx.recv().await {
            match self.append(&reading).await {
                Ok(()) => self.status.info(StatusSource::Storage, "Wrote to SD"),
                Err(e) => {
                    warn!(error = %e, timestamp = reading.timestamp, "Dropping reading");
                    self.status
                        .error(StatusSource::Storage, format!("Error writing to file: {e}"));
                }
            }
        }
        info!("Storage channel closed, writer stopping");
    }
}
