//! Historical catch-up.
//!
//! Walks the day logs covering `[start, end]`, decodes every line and pushes
//! the readings that fall inside the range onto the network channel, where they
//! compete with live readings for the uploader. Sends block: a large catch-up
//! is paced by upload capacity instead of being dropped or buffered.
//!
//! ```text
//! replay(start, end)
//!   day(start) ──▶ day+1 ──▶ ... while midnight(day) <= end
//!      │
//!      ├─ no log        → next day
//!      ├─ bad line      → log, skip
//!      ├─ ts < start    → skip
//!      ├─ ts > end      → stop the whole replay
//!      └─ otherwise     → network_tx.send(reading).await
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::day_log::{DayLog, DayLogStore};
use super::record;
use crate::clock::{Clock, LocalZone, Timestamp};
use crate::error::{AppResult, StationError};
use crate::reading::SensorReading;
use crate::status::{StatusBoard, StatusSource};

/// Cooperative abort flag for in-flight replays, checked between lines.
///
/// The engine never clears it; whoever starts a replay resets it first.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What one replay did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Readings pushed onto the network channel.
    pub queued: usize,
    /// Dates whose log was looked up, present or not.
    pub days_visited: usize,
    /// Lines skipped because they did not decode.
    pub malformed: usize,
    /// The scan met a reading past `end`.
    pub reached_end: bool,
    /// Stopped early by an abort request.
    pub aborted: bool,
    /// Stopped early because the uploader is gone.
    pub channel_closed: bool,
}

/// Re-submits journaled readings for upload.
#[derive(Clone)]
pub struct ReplayEngine {
    store: DayLogStore,
    clock: Arc<dyn Clock>,
    network_tx: mpsc::Sender<SensorReading>,
    status: StatusBoard,
    abort: AbortHandle,
}

impl ReplayEngine {
    pub fn new(
        store: DayLogStore,
        clock: Arc<dyn Clock>,
        network_tx: mpsc::Sender<SensorReading>,
        status: StatusBoard,
    ) -> Self {
        Self {
            store,
            clock,
            network_tx,
            status,
            abort: AbortHandle::new(),
        }
    }

    /// Share an abort flag with the caller.
    #[must_use]
    pub fn with_abort_handle(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Queue every journaled reading with `start <= timestamp <= end`.
    /// Returns how many were queued.
    pub async fn replay(&self, start: Timestamp, end: Timestamp) -> AppResult<usize> {
        self.replay_with_report(start, end)
            .await
            .map(|report| report.queued)
    }

    /// Like [`replay`](Self::replay), with the full account of the scan.
    pub async fn replay_with_report(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> AppResult<ReplayReport> {
        if start > end {
            return Err(StationError::RangeMisuse { start, end });
        }
        let zone = self.clock.zone();
        let mut log =
            DayLog::containing(start, zone).ok_or(StationError::RangeMisuse { start, end })?;

        info!(start, end, first = %log, "Starting replay");
        self.status.info(
            StatusSource::Replay,
            format!(
                "Sending data stored between {} and {}",
                zone.format(start).unwrap_or_else(|| start.to_string()),
                zone.format(end).unwrap_or_else(|| end.to_string()),
            ),
        );

        let mut report = ReplayReport::default();
        let mut cursor = start;

        'days: while cursor <= end {
            if self.abort.is_aborted() {
                info!(queued = report.queued, "Replay aborted");
                report.aborted = true;
                break;
            }
            report.days_visited += 1;

            let reader = match self.store.open_for_read(log).await {
                Ok(reader) => reader,
                Err(e) => {
                    warn!(log = %log, error = %e, "Could not open log, skipping date");
                    self.status
                        .warn(StatusSource::Replay, format!("Could not read {log}: {e}"));
                    None
                }
            };

            if let Some(mut reader) = reader {
                debug!(log = %log, "Reading log");
                loop {
                    if self.abort.is_aborted() {
                        info!(queued = report.queued, "Replay aborted");
                        report.aborted = true;
                        break 'days;
                    }

                    let line = match reader.next_line().await {
                        Ok(Some(line)) => line,
                        Ok(None) => break,
                        Err(e) => {
                            warn!(log = %log, error = %e, "Read failed, abandoning rest of log");
                            break;
                        }
                    };

                    let reading = match record::try_decode(&line, zone) {
                        Ok(reading) => reading,
                        Err(e) => {
                            warn!(log = %log, error = %e, "Skipping malformed line");
                            report.malformed += 1;
                            continue;
                        }
                    };

                    if reading.timestamp < start {
                        continue;
                    }
                    if reading.timestamp > end {
                        report.reached_end = true;
                        break 'days;
                    }

                    if self.network_tx.send(reading).await.is_err() {
                        warn!(queued = report.queued, "Network channel closed, stopping replay");
                        report.channel_closed = true;
                        break 'days;
                    }
                    report.queued += 1;
                }
            } else {
                debug!(log = %log, "No log for date, skipping");
            }

            if !Self::advance(&mut log, &mut cursor, zone) {
                break;
            }
        }

        info!(
            queued = report.queued,
            days = report.days_visited,
            malformed = report.malformed,
            "Replay finished"
        );
        self.status.info(
            StatusSource::Replay,
            format!("Queued {} stored readings", report.queued),
        );
        Ok(report)
    }

    /// Move to the next date, with the cursor at its local midnight.
    fn advance(log: &mut DayLog, cursor: &mut Timestamp, zone: LocalZone) -> bool {
        let Some(next) = log.next() else {
            return false;
        };
        let Some(midnight) = zone.midnight(next.date()) else {
            return false;
        };
        *log = next;
        *cursor = midnight;
        true
    }
}
