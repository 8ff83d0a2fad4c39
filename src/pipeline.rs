//! Composition root.
//!
//! [`Pipeline`] wires the station together: one acquisition task fanning out
//! to two bounded channels, the journal writer on one, the uploader on the
//! other, and on-demand replays feeding the same network channel as live data.
//!
//! ```text
//!                        ┌──▶ storage channel ──▶ StorageWriter ──▶ DayLog
//! SensorSource ─ tick ───┤
//!                        └──▶ network channel ──▶ Uploader ──▶ Transport
//!                                   ▲
//!          ReplayEngine ────────────┘
//! ```
//!
//! Shutdown is by channel closure: dropping the period sender stops
//! acquisition, which drops the channel senders, which lets the writer and the
//! uploader drain and return.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock, Timestamp};
use crate::config::StationConfig;
use crate::data::day_log::DayLogStore;
use crate::data::medium::{FsMedium, StorageMedium};
use crate::data::replay::{AbortHandle, ReplayEngine, ReplayReport};
use crate::data::storage::StorageWriter;
use crate::error::{AppResult, StationError};
use crate::hardware::acquisition::{Acquisition, AcquisitionExit};
use crate::hardware::{SensorSource, SimulatedWeatherKit};
use crate::network::session::SessionHandle;
use crate::network::transport::{HttpTransport, Transport};
use crate::network::uploader::{UploadStats, Uploader, UploaderState};
use crate::status::StatusBoard;

/// How long [`PipelineHandle::shutdown`] waits for the sinks to drain.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for a running station.
///
/// Every collaborator defaults to the production one derived from the
/// configuration; tests swap in mocks.
pub struct Pipeline {
    config: StationConfig,
    clock: Option<Arc<dyn Clock>>,
    medium: Option<Arc<dyn StorageMedium>>,
    transport: Option<Arc<dyn Transport>>,
    source: Option<Arc<dyn SensorSource>>,
    session: SessionHandle,
    status: StatusBoard,
}

impl Pipeline {
    pub fn new(config: StationConfig) -> Self {
        Self {
            config,
            clock: None,
            medium: None,
            transport: None,
            source: None,
            session: SessionHandle::new(),
            status: StatusBoard::new(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn with_medium(mut self, medium: Arc<dyn StorageMedium>) -> Self {
        self.medium = Some(medium);
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn SensorSource>) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = session;
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: StatusBoard) -> Self {
        self.status = status;
        self
    }

    /// Spawn every task. Must be called inside a tokio runtime.
    pub fn start(self) -> AppResult<PipelineHandle> {
        self.config.validate()?;

        let clock = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock::new(self.config.zone()?)),
        };
        let medium = match self.medium {
            Some(medium) => medium,
            None => Arc::new(FsMedium::new(&self.config.storage.log_dir)),
        };
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config.upload)?),
        };
        let source = match self.source {
            Some(source) => source,
            None => Arc::new(SimulatedWeatherKit::new()),
        };

        let (storage_tx, storage_rx) = mpsc::channel(self.config.storage.channel_capacity);
        let (network_tx, network_rx) = mpsc::channel(self.config.upload.channel_capacity);
        let (period_tx, period_rx) = watch::channel(self.config.sample_interval());

        let store = DayLogStore::new(medium);
        let abort = AbortHandle::new();
        let replay = ReplayEngine::new(
            store.clone(),
            Arc::clone(&clock),
            network_tx.clone(),
            self.status.clone(),
        )
        .with_abort_handle(abort.clone());

        let writer = StorageWriter::new(store, Arc::clone(&clock), self.status.clone());
        let uploader = Uploader::new(
            transport,
            self.session.clone(),
            &self.config.upload,
            self.status.clone(),
        );
        let upload_stats = uploader.stats();
        let uploader_state = uploader.subscribe_state();

        let acquisition = Acquisition::new(
            source,
            clock,
            period_rx,
            storage_tx,
            network_tx,
            self.status.clone(),
        );

        info!(
            station = %self.config.station.name,
            period_secs = self.config.station.sample_interval_secs,
            "Starting pipeline"
        );

        Ok(PipelineHandle {
            period_tx,
            replay,
            abort,
            session: self.session,
            status: self.status,
            upload_stats,
            uploader_state,
            acquisition_task: tokio::spawn(acquisition.run()),
            writer_task: tokio::spawn(writer.run(storage_rx)),
            uploader_task: tokio::spawn(uploader.run(network_rx)),
        })
    }
}

/// Control surface of a running pipeline.
pub struct PipelineHandle {
    period_tx: watch::Sender<Duration>,
    replay: ReplayEngine,
    abort: AbortHandle,
    session: SessionHandle,
    status: StatusBoard,
    upload_stats: Arc<UploadStats>,
    uploader_state: watch::Receiver<UploaderState>,
    acquisition_task: JoinHandle<AcquisitionExit>,
    writer_task: JoinHandle<()>,
    uploader_task: JoinHandle<()>,
}

impl PipelineHandle {
    /// Re-submit journaled readings in `[start, end]` and wait for the scan
    /// to finish. Returns how many readings were queued for upload.
    pub async fn replay(&self, start: Timestamp, end: Timestamp) -> AppResult<usize> {
        self.abort.reset();
        self.replay.replay(start, end).await
    }

    /// Start a replay in the background.
    ///
    /// A range misuse is reported before anything is spawned. The abort flag
    /// is cleared here, so an [`abort_replay`](Self::abort_replay) issued
    /// right after this returns stops the new replay.
    pub fn spawn_replay(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> AppResult<JoinHandle<AppResult<ReplayReport>>> {
        if start > end {
            return Err(StationError::RangeMisuse { start, end });
        }
        self.abort.reset();
        let engine = self.replay.clone();
        Ok(tokio::spawn(async move {
            engine.replay_with_report(start, end).await
        }))
    }

    /// Ask the running replay, if any, to stop after its current line.
    pub fn abort_replay(&self) {
        self.abort.abort();
    }

    /// Change the acquisition period. The timer restarts on change.
    pub fn set_sample_interval(&self, period: Duration) -> AppResult<()> {
        if period.is_zero() {
            return Err(StationError::InvalidInterval);
        }
        self.period_tx
            .send(period)
            .map_err(|_| StationError::ChannelClosed("sample interval"))
    }

    pub fn sample_interval(&self) -> Duration {
        *self.period_tx.borrow()
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    pub fn upload_stats(&self) -> Arc<UploadStats> {
        Arc::clone(&self.upload_stats)
    }

    pub fn uploader_state(&self) -> watch::Receiver<UploaderState> {
        self.uploader_state.clone()
    }

    /// Stop acquisition and let both sinks drain.
    ///
    /// Background replays are aborted. Each task gets [`DRAIN_TIMEOUT`] to
    /// finish and is cancelled past it: acquisition parked on a full network
    /// channel, or an uploader waiting on a dead session. Readings still
    /// queued at that point are lost.
    pub async fn shutdown(self) {
        self.shutdown_within(DRAIN_TIMEOUT).await;
    }

    /// [`shutdown`](Self::shutdown) with an explicit drain timeout.
    pub async fn shutdown_within(self, drain: Duration) {
        info!("Shutting down pipeline");
        self.abort.abort();

        let Self {
            period_tx,
            replay,
            acquisition_task,
            writer_task,
            uploader_task,
            ..
        } = self;
        drop(period_tx);
        drop(replay);

        if let Some(exit) = join_within("acquisition", acquisition_task, drain).await {
            info!(?exit, "Acquisition task finished");
        }
        join_within("storage writer", writer_task, drain).await;
        join_within("uploader", uploader_task, drain).await;
        info!("Pipeline stopped");
    }
}

/// Await `task` for at most `drain`, then cancel it and wait for the
/// cancellation so everything it owned (channel senders included) is dropped.
async fn join_within<T>(name: &'static str, mut task: JoinHandle<T>, drain: Duration) -> Option<T> {
    match tokio::time::timeout(drain, &mut task).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            warn!(task = name, error = %e, "Task failed");
            None
        }
        Err(_) => {
            warn!(task = name, timeout = ?drain, "Task did not finish in time, cancelling");
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(task = name, error = %e, "Task failed");
                }
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{LocalZone, ManualClock};
    use crate::data::medium::MemoryMedium;
    use crate::hardware::mock::ScriptedSource;
    use crate::network::transport::MockTransport;
    use crate::reading::SensorReading;

    fn config() -> StationConfig {
        let mut config = StationConfig::default();
        config.upload.retry_delay_ms = 0;
        config
    }

    fn good(temperature: f32) -> SensorReading {
        SensorReading {
            temperature,
            valid: true,
            ..SensorReading::INVALID
        }
    }

    fn pipeline(
        source: ScriptedSource,
        medium: &MemoryMedium,
        transport: &MockTransport,
    ) -> Pipeline {
        Pipeline::new(config())
            .with_clock(Arc::new(ManualClock::new(
                1_709_301_600,
                LocalZone::from_offset_minutes(-240).unwrap(),
            )))
            .with_medium(Arc::new(medium.clone()))
            .with_transport(Arc::new(transport.clone()))
            .with_source(Arc::new(source))
            .with_session(SessionHandle::connected())
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let handle = pipeline(
            ScriptedSource::default(),
            &MemoryMedium::new(),
            &MockTransport::new(),
        )
        .start()
        .unwrap();

        assert!(matches!(
            handle.set_sample_interval(Duration::ZERO),
            Err(StationError::InvalidInterval)
        ));
        handle.set_sample_interval(Duration::from_secs(5)).unwrap();
        assert_eq!(handle.sample_interval(), Duration::from_secs(5));
        handle.shutdown_within(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn invalid_config_does_not_start() {
        let mut config = config();
        config.storage.channel_capacity = 0;
        assert!(Pipeline::new(config).start().is_err());
    }

    #[tokio::test]
    async fn live_readings_reach_both_sinks() {
        let medium = MemoryMedium::new();
        let transport = MockTransport::new();
        let handle = pipeline(
            ScriptedSource::new([good(1.0), good(2.0)]),
            &medium,
            &transport,
        )
        .start()
        .unwrap();

        handle
            .set_sample_interval(Duration::from_millis(10))
            .unwrap();
        let stats = handle.upload_stats();
        tokio::time::timeout(Duration::from_secs(2), async {
            while stats.delivered() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        handle.shutdown_within(Duration::from_secs(1)).await;

        let journal = medium.contents("weather-data_2024-03-01.csv").unwrap();
        assert_eq!(journal.lines().count(), 2);
        assert_eq!(transport.attempts(), 2);
    }

    #[tokio::test]
    async fn replay_range_misuse_is_rejected_before_spawning() {
        let handle = pipeline(
            ScriptedSource::default(),
            &MemoryMedium::new(),
            &MockTransport::new(),
        )
        .start()
        .unwrap();

        assert!(matches!(
            handle.spawn_replay(20, 10),
            Err(StationError::RangeMisuse { start: 20, end: 10 })
        ));
        handle.shutdown_within(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn shutdown_cancels_an_uploader_stuck_on_the_session() {
        let transport = MockTransport::new();
        let handle = pipeline(
            ScriptedSource::new([good(1.0)]),
            &MemoryMedium::new(),
            &transport,
        )
        .with_session(SessionHandle::new())
        .start()
        .unwrap();
        handle
            .set_sample_interval(Duration::from_millis(10))
            .unwrap();

        let mut state = handle.uploader_state();
        tokio::time::timeout(
            Duration::from_secs(2),
            state.wait_for(|s| *s == UploaderState::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();

        tokio::time::timeout(
            Duration::from_secs(2),
            handle.shutdown_within(Duration::from_millis(50)),
        )
        .await
        .unwrap();
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn shutdown_completes_with_acquisition_blocked_on_a_full_channel() {
        let mut config = config();
        config.upload.channel_capacity = 1;
        let handle = Pipeline::new(config)
            .with_clock(Arc::new(ManualClock::new(
                1_709_301_600,
                LocalZone::from_offset_minutes(-240).unwrap(),
            )))
            .with_medium(Arc::new(MemoryMedium::new()))
            .with_transport(Arc::new(MockTransport::new()))
            .with_source(Arc::new(ScriptedSource::new(
                (0..1_000).map(|i| good(i as f32)),
            )))
            .with_session(SessionHandle::new())
            .start()
            .unwrap();
        handle
            .set_sample_interval(Duration::from_millis(5))
            .unwrap();

        // uploader holds one reading, the channel one more, acquisition parks
        tokio::time::sleep(Duration::from_millis(300)).await;

        tokio::time::timeout(
            Duration::from_secs(3),
            handle.shutdown_within(Duration::from_millis(50)),
        )
        .await
        .expect("shutdown must not hang on a parked acquisition task");
    }

    #[tokio::test]
    async fn abort_right_after_spawning_a_replay_stops_it() {
        let zone = LocalZone::from_offset_minutes(-240).unwrap();
        let medium = MemoryMedium::new();
        let mut journal = String::new();
        for minute in 0..50 {
            let reading = SensorReading {
                timestamp: 1_709_301_600 + minute * 60,
                ..good(minute as f32)
            };
            journal.push_str(&crate::data::record::encode(&reading, zone).unwrap());
        }
        medium.insert("weather-data_2024-03-01.csv", journal);

        let handle = pipeline(ScriptedSource::default(), &medium, &MockTransport::new())
            .start()
            .unwrap();

        let task = handle
            .spawn_replay(1_709_301_600, 1_709_301_600 + 3_600)
            .unwrap();
        handle.abort_replay();
        let report = task.await.unwrap().unwrap();

        assert!(report.aborted);
        assert_eq!(report.queued, 0);
        handle.shutdown_within(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn a_new_replay_is_not_blocked_by_an_earlier_abort() {
        let handle = pipeline(
            ScriptedSource::default(),
            &MemoryMedium::new(),
            &MockTransport::new(),
        )
        .start()
        .unwrap();

        handle.abort_replay();
        let report = handle
            .spawn_replay(1_709_301_600, 1_709_301_600 + 60)
            .unwrap()
            .await
            .unwrap()
            .unwrap();
        assert!(!report.aborted);
        handle.shutdown_within(Duration::from_secs(1)).await;
    }
}
