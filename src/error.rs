//! Custom error types for the station.
//!
//! This module defines the error types shared by the telemetry pipeline. Using the
//! `thiserror` crate, it gives every failure class a distinct variant so that each
//! task loop can decide, per item, whether to drop, skip, or report.
//!
//! ## Error Hierarchy
//!
//! - **`StorageError`**: the persistent medium could not be opened or written
//!   (card full, card absent), or a reading that must never be journaled was
//!   offered to the writer. Storage failures are reported and the reading is
//!   dropped; nothing here retries them.
//! - **`DecodeError`**: a journal line did not match the record format. Decode
//!   failures skip the line and never abort a scan.
//! - **`StationError`**: the top-level error, wrapping the two above plus
//!   configuration problems and replay range misuse.
//!
//! Upload failures are deliberately *not* errors: the uploader classifies each
//! send as a [`SendStatus`](crate::network::transport::SendStatus) and turns it
//! into an [`UploadOutcome`](crate::network::uploader::UploadOutcome).

use crate::clock::Timestamp;
use thiserror::Error;

/// Convenience alias for results using the station error type.
pub type AppResult<T> = std::result::Result<T, StationError>;

/// Failures of the persistent medium backing the day logs.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage medium unavailable for '{resource}': {source}")]
    MediumUnavailable {
        resource: String,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing to journal a reading that failed validation")]
    InvalidReading,
}

impl StorageError {
    /// Wrap an I/O failure on the named resource.
    pub fn unavailable(resource: impl Into<String>, source: std::io::Error) -> Self {
        Self::MediumUnavailable {
            resource: resource.into(),
            source,
        }
    }
}

/// Reasons a journal line could not be decoded into a reading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("expected 7 comma-separated fields, found {0}")]
    FieldCount(usize),

    #[error("malformed timestamp '{0}'")]
    Timestamp(String),

    #[error("field '{field}' is not a number: '{value}'")]
    Number { field: &'static str, value: String },

    #[error("local time '{0}' does not exist in the station time zone")]
    NonexistentLocalTime(String),
}

#[derive(Error, Debug)]
pub enum StationError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Invalid replay range: start {start} is after end {end}")]
    RangeMisuse { start: Timestamp, end: Timestamp },

    #[error("Channel '{0}' is closed")]
    ChannelClosed(&'static str),

    #[error("Sampling interval must be greater than zero")]
    InvalidInterval,
}
