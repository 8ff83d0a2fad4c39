//! Timer-driven acquisition loop.
//!
//! Each tick samples the sensors once and pushes the reading to the storage
//! channel, then to the network channel. Both sends block while the channel
//! is full: a slow sink throttles acquisition rather than losing samples.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::SensorSource;
use crate::clock::Clock;
use crate::reading::SensorReading;
use crate::status::{StatusBoard, StatusSource};

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionExit {
    /// The interval sender was dropped (pipeline shutdown).
    Shutdown,
    /// A downstream channel closed.
    SinkClosed(&'static str),
}

/// Samples a [`SensorSource`] on a changeable period.
pub struct Acquisition {
    source: Arc<dyn SensorSource>,
    clock: Arc<dyn Clock>,
    period: watch::Receiver<Duration>,
    storage_tx: mpsc::Sender<SensorReading>,
    network_tx: mpsc::Sender<SensorReading>,
    status: StatusBoard,
}

impl Acquisition {
    pub fn new(
        source: Arc<dyn SensorSource>,
        clock: Arc<dyn Clock>,
        period: watch::Receiver<Duration>,
        storage_tx: mpsc::Sender<SensorReading>,
        network_tx: mpsc::Sender<SensorReading>,
        status: StatusBoard,
    ) -> Self {
        Self {
            source,
            clock,
            period,
            storage_tx,
            network_tx,
            status,
        }
    }

    /// Sample once and fan the reading out.
    ///
    /// Invalid readings are reported and discarded here so neither sink ever
    /// sees them.
    pub async fn tick(&self) -> Result<(), AcquisitionExit> {
        let reading = self.source.sample(self.clock.now()).await;
        if !reading.valid {
            warn!("Sensor read failed, discarding sample");
            self.status
                .warn(StatusSource::Acquisition, "Sensor read failed");
            return Ok(());
        }

        debug!(timestamp = reading.timestamp, "Sampled");
        self.storage_tx
            .send(reading)
            .await
            .map_err(|_| AcquisitionExit::SinkClosed("storage"))?;
        self.network_tx
            .send(reading)
            .await
            .map_err(|_| AcquisitionExit::SinkClosed("network"))?;
        Ok(())
    }

    /// Tick until shutdown. A period change restarts the timer, so the next
    /// sample comes one new period after the change.
    pub async fn run(mut self) -> AcquisitionExit {
        let mut ticker = Self::ticker(*self.period.borrow_and_update());

        let exit = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(exit) = self.tick().await {
                        break exit;
                    }
                }
                changed = self.period.changed() => {
                    if changed.is_err() {
                        break AcquisitionExit::Shutdown;
                    }
                    let period = *self.period.borrow_and_update();
                    info!(period_secs = period.as_secs_f64(), "Sampling period changed");
                    self.status.info(
                        StatusSource::Acquisition,
                        format!("Changing data storage frequency to {}", period.as_secs()),
                    );
                    ticker = Self::ticker(period);
                }
            }
        };

        info!(?exit, "Acquisition stopped");
        exit
    }

    fn ticker(period: Duration) -> tokio::time::Interval {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }
}
