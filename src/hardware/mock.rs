//! Simulated sensors for running the station without hardware.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::SensorSource;
use crate::clock::Timestamp;
use crate::reading::SensorReading;

/// Rain gauge bucket size of the weather meter kit, in mm per tip.
pub const RAIN_PER_TIP_MM: f32 = 0.2794;

/// The wind vane reports one of 16 compass points.
const VANE_STEP_DEG: f32 = 22.5;

// =============================================================================
// SimulatedWeatherKit - weather meter kit + BME280
// =============================================================================

/// Produces plausible readings around a slowly drifting baseline.
///
/// Rainfall is a running total, like the real gauge: it only ever grows by
/// whole bucket tips.
pub struct SimulatedWeatherKit {
    state: Mutex<KitState>,
}

struct KitState {
    rng: StdRng,
    rain_total: f32,
    temperature: f32,
    humidity: f32,
    pressure: f32,
}

impl SimulatedWeatherKit {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic sequence, for tests.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            state: Mutex::new(KitState {
                rng,
                rain_total: 0.0,
                temperature: 20.0,
                humidity: 55.0,
                pressure: 101_325.0,
            }),
        }
    }
}

impl Default for SimulatedWeatherKit {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SensorSource for SimulatedWeatherKit {
    async fn sample(&self, timestamp: Timestamp) -> SensorReading {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let s = &mut *guard;

        if s.rng.gen_bool(0.1) {
            s.rain_total += RAIN_PER_TIP_MM * f32::from(s.rng.gen_range(1u8..=3));
        }
        s.temperature = (s.temperature + s.rng.gen_range(-0.2..=0.2)).clamp(-30.0, 45.0);
        s.humidity = (s.humidity + s.rng.gen_range(-1.0..=1.0)).clamp(0.0, 100.0);
        s.pressure = (s.pressure + s.rng.gen_range(-15.0..=15.0)).clamp(95_000.0, 105_000.0);

        SensorReading {
            timestamp,
            rain_fall: s.rain_total,
            wind_speed: s.rng.gen_range(0.0..25.0),
            wind_direction: f32::from(s.rng.gen_range(0u8..16)) * VANE_STEP_DEG,
            temperature: s.temperature,
            humidity: s.humidity,
            pressure: s.pressure,
            valid: true,
        }
    }
}

// =============================================================================
// ScriptedSource - fixed sequence of readings
// =============================================================================

/// Replays a fixed list of readings, restamped with the requested timestamp.
/// Once the list is exhausted every sample is invalid.
#[derive(Default)]
pub struct ScriptedSource {
    readings: Mutex<VecDeque<SensorReading>>,
}

impl ScriptedSource {
    pub fn new(readings: impl IntoIterator<Item = SensorReading>) -> Self {
        Self {
            readings: Mutex::new(readings.into_iter().collect()),
        }
    }
}

#[async_trait]
impl SensorSource for ScriptedSource {
    async fn sample(&self, timestamp: Timestamp) -> SensorReading {
        self.readings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .map(|r| SensorReading { timestamp, ..r })
            .unwrap_or(SensorReading::INVALID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_readings_are_plausible() {
        let kit = SimulatedWeatherKit::seeded(7);
        let mut last_rain = 0.0;
        for ts in 0..200 {
            let r = kit.sample(ts).await;
            assert!(r.valid);
            assert_eq!(r.timestamp, ts);
            assert!(r.rain_fall >= last_rain);
            assert!((0.0..360.0).contains(&r.wind_direction));
            assert_eq!(r.wind_direction % VANE_STEP_DEG, 0.0);
            assert!((0.0..=100.0).contains(&r.humidity));
            last_rain = r.rain_fall;
        }
    }

    #[tokio::test]
    async fn same_seed_same_sequence() {
        let a = SimulatedWeatherKit::seeded(42);
        let b = SimulatedWeatherKit::seeded(42);
        for ts in 0..10 {
            assert_eq!(a.sample(ts).await, b.sample(ts).await);
        }
    }

    #[tokio::test]
    async fn scripted_source_runs_dry() {
        let base = SensorReading {
            temperature: 12.5,
            valid: true,
            ..SensorReading::INVALID
        };
        let source = ScriptedSource::new([base]);

        let first = source.sample(100).await;
        assert!(first.valid);
        assert_eq!(first.timestamp, 100);
        assert_eq!(first.temperature, 12.5);
        assert!(!source.sample(200).await.valid);
    }
}
