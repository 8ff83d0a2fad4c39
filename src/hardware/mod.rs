//! Sensor acquisition.
//!
//! A [`SensorSource`] turns "sample now" into a [`SensorReading`]; the
//! [`acquisition::Acquisition`] loop drives it on a timer and fans each
//! reading out to the storage and network channels.

pub mod acquisition;
pub mod mock;

use async_trait::async_trait;

use crate::clock::Timestamp;
use crate::reading::SensorReading;

pub use acquisition::Acquisition;
pub use mock::SimulatedWeatherKit;

/// Anything that can produce a full set of weather channels.
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Read every channel and stamp the result with `timestamp`.
    ///
    /// A source that cannot read its sensors returns a reading with
    /// `valid == false`.
    async fn sample(&self, timestamp: Timestamp) -> SensorReading;
}
