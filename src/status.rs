//! Operator-visible status board.
//!
//! The writer, uploader and replay post short textual outcomes here ("Wrote to
//! SD", "Sent data successfully", "Returned 400, dropping packet"). A display
//! or console renders the most recent entries; the pipeline never waits on it.

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

const MAX_STATUS_ENTRIES: usize = 100;

/// Severity of a status entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warn,
    Error,
}

/// Which part of the pipeline posted an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSource {
    Acquisition,
    Storage,
    Upload,
    Replay,
}

/// Represents a single status entry.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub timestamp: DateTime<Local>,
    pub level: StatusLevel,
    pub source: StatusSource,
    pub message: String,
}

impl fmt::Display for StatusEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{:?}] {:?}: {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.source,
            self.message
        )
    }
}

/// A thread-safe, fixed-capacity status buffer.
#[derive(Clone, Default)]
pub struct StatusBoard(Arc<Mutex<VecDeque<StatusEntry>>>);

impl StatusBoard {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(VecDeque::with_capacity(
            MAX_STATUS_ENTRIES,
        ))))
    }

    /// Post an entry, evicting the oldest when full.
    pub fn post(&self, level: StatusLevel, source: StatusSource, message: impl Into<String>) {
        let mut entries = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.len() >= MAX_STATUS_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(StatusEntry {
            timestamp: Local::now(),
            level,
            source,
            message: message.into(),
        });
    }

    pub fn info(&self, source: StatusSource, message: impl Into<String>) {
        self.post(StatusLevel::Info, source, message);
    }

    pub fn warn(&self, source: StatusSource, message: impl Into<String>) {
        self.post(StatusLevel::Warn, source, message);
    }

    pub fn error(&self, source: StatusSource, message: impl Into<String>) {
        self.post(StatusLevel::Error, source, message);
    }

    /// Copy of the current entries, oldest first.
    pub fn snapshot(&self) -> Vec<StatusEntry> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Most recent entry.
    pub fn latest(&self) -> Option<StatusEntry> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_most_recent_entries() {
        let board = StatusBoard::new();
        for i in 0..(MAX_STATUS_ENTRIES + 5) {
            board.info(StatusSource::Storage, format!("entry {i}"));
        }
        let entries = board.snapshot();
        assert_eq!(entries.len(), MAX_STATUS_ENTRIES);
        assert_eq!(entries[0].message, "entry 5");
        assert_eq!(
            board.latest().unwrap().message,
            format!("entry {}", MAX_STATUS_ENTRIES + 4)
        );
    }

    #[test]
    fn clones_share_entries() {
        let board = StatusBoard::new();
        let other = board.clone();
        other.error(StatusSource::Upload, "Returned 400, dropping packet");
        let latest = board.latest().unwrap();
        assert_eq!(latest.level, StatusLevel::Error);
        assert_eq!(latest.source, StatusSource::Upload);
        board.clear();
        assert!(other.snapshot().is_empty());
    }
}
