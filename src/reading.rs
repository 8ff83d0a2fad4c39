//! The sample value that flows through the pipeline.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;

/// One timestamped sample from the weather meter kit and the BME280.
///
/// Readings are plain values: every channel hop copies them, nobody shares
/// them by reference, and nothing mutates one after acquisition.
/// A reading with `valid == false` came out of a failed parse and must never
/// be journaled or uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Seconds since the Unix epoch.
    pub timestamp: Timestamp,
    /// Accumulated rainfall in mm.
    pub rain_fall: f32,
    /// Wind speed in km/h.
    pub wind_speed: f32,
    /// Wind vane heading in degrees.
    pub wind_direction: f32,
    /// Air temperature in °C.
    pub temperature: f32,
    /// Relative humidity in %.
    pub humidity: f32,
    /// Barometric pressure in Pa.
    pub pressure: f32,
    /// False when the reading could not be reconstructed.
    pub valid: bool,
}

impl SensorReading {
    /// An invalid placeholder, returned by decoders on failure.
    pub const INVALID: SensorReading = SensorReading {
        timestamp: 0,
        rain_fall: 0.0,
        wind_speed: 0.0,
        wind_direction: 0.0,
        temperature: 0.0,
        humidity: 0.0,
        pressure: 0.0,
        valid: false,
    };

    /// Copy of this reading with every NaN channel replaced by zero.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        fn zero_nan(v: f32) -> f32 {
            if v.is_nan() {
                0.0
            } else {
                v
            }
        }

        Self {
            rain_fall: zero_nan(self.rain_fall),
            wind_speed: zero_nan(self.wind_speed),
            wind_direction: zero_nan(self.wind_direction),
            temperature: zero_nan(self.temperature),
            humidity: zero_nan(self.humidity),
            pressure: zero_nan(self.pressure),
            ..*self
        }
    }
}

impl Default for SensorReading {
    fn default() -> Self {
        Self::INVALID
    }
}
