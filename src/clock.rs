//! Clock oracle and station-local time handling.
//!
//! Every part of the pipeline that needs a calendar date (day-log naming, replay
//! date walk, record timestamps) goes through a [`LocalZone`] obtained from the
//! same [`Clock`], so the whole core agrees on one UTC offset. Offset changes
//! (daylight saving, resynchronisation) are the oracle's business.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::DecodeError;

/// Seconds since the Unix epoch.
pub type Timestamp = i64;

/// Text layout of local timestamps in journal lines and operator commands.
pub const LOCAL_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Source of the current time and of the station's local time zone.
pub trait Clock: Send + Sync {
    /// Current point in time.
    fn now(&self) -> Timestamp;

    /// The station's local zone.
    fn zone(&self) -> LocalZone;

    /// Local calendar date containing `ts`.
    fn local_date(&self, ts: Timestamp) -> Option<NaiveDate> {
        self.zone().date_of(ts)
    }
}

/// A fixed UTC offset used for all local-time conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalZone(FixedOffset);

impl LocalZone {
    /// Zone at UTC.
    pub fn utc() -> Self {
        Self(Utc.fix())
    }

    /// Zone `minutes` east of UTC (negative for west). `None` if the offset
    /// is a day or more.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(Self)
    }

    /// Underlying chrono offset.
    pub fn offset(&self) -> FixedOffset {
        self.0
    }

    /// Wall-clock time of `ts` in this zone.
    pub fn to_local(&self, ts: Timestamp) -> Option<NaiveDateTime> {
        DateTime::<Utc>::from_timestamp(ts, 0).map(|utc| utc.with_timezone(&self.0).naive_local())
    }

    /// Instant of a wall-clock time in this zone.
    pub fn from_local(&self, local: &NaiveDateTime) -> Option<Timestamp> {
        self.0
            .from_local_datetime(local)
            .single()
            .map(|dt| dt.timestamp())
    }

    /// Local calendar date containing `ts`.
    pub fn date_of(&self, ts: Timestamp) -> Option<NaiveDate> {
        self.to_local(ts).map(|local| local.date())
    }

    /// First second of `date` in this zone.
    pub fn midnight(&self, date: NaiveDate) -> Option<Timestamp> {
        self.from_local(&date.and_hms_opt(0, 0, 0)?)
    }

    /// Render `ts` as `YYYY/MM/DD HH:MM:SS` local time.
    pub fn format(&self, ts: Timestamp) -> Option<String> {
        self.to_local(ts)
            .map(|local| local.format(LOCAL_TIME_FORMAT).to_string())
    }

    /// Parse a `YYYY/MM/DD HH:MM:SS` local time.
    pub fn parse(&self, text: &str) -> Result<Timestamp, DecodeError> {
        let text = text.trim();
        let local = NaiveDateTime::parse_from_str(text, LOCAL_TIME_FORMAT)
            .map_err(|_| DecodeError::Timestamp(text.to_string()))?;
        self.from_local(&local)
            .ok_or_else(|| DecodeError::NonexistentLocalTime(text.to_string()))
    }
}

impl Default for LocalZone {
    fn default() -> Self {
        Self::utc()
    }
}

/// Wall clock backed by the host's system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    zone: LocalZone,
}

impl SystemClock {
    /// System clock reporting dates in `zone`.
    pub fn new(zone: LocalZone) -> Self {
        Self { zone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().timestamp()
    }

    fn zone(&self) -> LocalZone {
        self.zone
    }
}

/// Clock that only moves when told to. Used by tests and by one-shot tools
/// that replay a fixed instant.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
    zone: LocalZone,
}

impl ManualClock {
    pub fn new(now: Timestamp, zone: LocalZone) -> Self {
        Self {
            now: AtomicI64::new(now),
            zone,
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }

    fn zone(&self) -> LocalZone {
        self.zone
    }
}
