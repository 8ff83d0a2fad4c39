//! # Weather Station Telemetry Pipeline
//!
//! Core library of the `weather-station` binary. A battery-powered station
//! samples its sensors on a timer, journals every reading to a
//! day-partitioned append-only log and uploads it to an InfluxDB v2 server.
//! Readings that never made it upstream can be replayed from the journal.
//!
//! ## Crate Structure
//!
//! - **`reading`**: The `SensorReading` value that flows through every channel.
//! - **`clock`**: Clock oracle and the station's fixed-offset local zone.
//! - **`hardware`**: `SensorSource` trait, simulated sensors and the
//!   acquisition loop.
//! - **`data`**: Record codec, storage medium, day logs, the journal writer and
//!   the replay engine.
//! - **`network`**: Line-protocol payload, HTTP transport, session handle and
//!   the bounded-retry uploader.
//! - **`pipeline`**: Wires everything together and exposes the operator
//!   controls (replay, abort, sampling period).
//! - **`console`**: Line-oriented operator commands (`setfreq`, `recoverData`).
//! - **`status`**: Short operator-facing status messages.
//! - **`config`**: Figment-based configuration.
//! - **`logging`**: Tracing subscriber setup.
//! - **`error`**: Error types shared across the crate.

pub mod clock;
pub mod config;
pub mod console;
pub mod data;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod network;
pub mod pipeline;
pub mod reading;
pub mod status;

pub use error::{AppResult, StationError};
pub use pipeline::{Pipeline, PipelineHandle};
pub use reading::SensorReading;
