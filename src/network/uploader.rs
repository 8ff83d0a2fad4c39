//! Bounded-retry uploader.
//!
//! Drains the network channel (live readings and replayed ones alike) and
//! delivers each reading to the time-series database.
//!
//! # State Machine
//!
//! ```text
//!            ┌──── session unusable ────┐
//!            ▼                          │
//!      Disconnected ──connected──▶ Attempting ──204──▶ Delivered
//!                                   │    ▲   └─other code──▶ Dropped
//!                         transport │    │ delay
//!                           failure ▼    │
//!                                  Retrying ──retries exhausted──▶ Dropped
//! ```
//!
//! Only a transport failure (no response at all) is retried. Any answer other
//! than the success status is a permanent rejection: resending the same body
//! would get the same answer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::protocol;
use super::session::SessionHandle;
use super::transport::{SendStatus, Transport};
use crate::config::UploadConfig;
use crate::reading::SensorReading;
use crate::status::{StatusBoard, StatusSource};

/// Final fate of one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Delivered,
    Dropped,
}

/// What the uploader is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploaderState {
    /// Waiting for the next reading.
    Idle,
    /// Holding a reading until a session becomes usable.
    Disconnected,
    /// First send of the current reading in flight.
    Attempting,
    /// Re-sending after a transport failure (1-based retry number).
    Retrying { attempt: u32 },
}

/// Fixed-delay retry policy for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Pause before each retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Check if another attempt may follow `retries_done` retries.
    #[must_use]
    pub fn should_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }
}

/// Running totals, shared with whoever wants to watch them.
#[derive(Debug, Default)]
pub struct UploadStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl UploadStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Readings that reached a final outcome.
    pub fn completed(&self) -> u64 {
        self.delivered() + self.dropped()
    }
}

/// Delivers readings through a [`Transport`].
pub struct Uploader {
    transport: Arc<dyn Transport>,
    session: SessionHandle,
    policy: RetryPolicy,
    location: String,
    success_status: u16,
    status: StatusBoard,
    state: watch::Sender<UploaderState>,
    stats: Arc<UploadStats>,
}

impl Uploader {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: SessionHandle,
        config: &UploadConfig,
        status: StatusBoard,
    ) -> Self {
        let (state, _) = watch::channel(UploaderState::Idle);
        Self {
            transport,
            session,
            policy: RetryPolicy::from_config(config),
            location: config.location.clone(),
            success_status: config.success_status,
            status,
            state,
            stats: Arc::new(UploadStats::default()),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn subscribe_state(&self) -> watch::Receiver<UploaderState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> Arc<UploadStats> {
        Arc::clone(&self.stats)
    }

    /// Deliver one reading, retrying transport failures per the policy.
    pub async fn upload(&self, reading: &SensorReading) -> UploadOutcome {
        let outcome = self.deliver(reading).await;
        match outcome {
            UploadOutcome::Delivered => self.stats.delivered.fetch_add(1, Ordering::SeqCst),
            UploadOutcome::Dropped => self.stats.dropped.fetch_add(1, Ordering::SeqCst),
        };
        self.state.send_replace(UploaderState::Idle);
        outcome
    }

    async fn deliver(&self, reading: &SensorReading) -> UploadOutcome {
        if !reading.valid {
            warn!("Refusing to upload a reading that failed validation");
            return UploadOutcome::Dropped;
        }

        let body = protocol::encode_payload(reading, &self.location);
        let mut retries = 0;

        loop {
            if !self.session.is_usable() {
                self.state.send_replace(UploaderState::Disconnected);
                debug!(timestamp = reading.timestamp, "Waiting for uplink session");
                self.session.wait_usable().await;
            }

            self.state.send_replace(if retries == 0 {
                UploaderState::Attempting
            } else {
                UploaderState::Retrying { attempt: retries }
            });

            match self.transport.send(body.clone()).await {
                SendStatus::Response(code) if code == self.success_status => {
                    debug!(timestamp = reading.timestamp, attempts = retries + 1, "Delivered");
                    self.status
                        .info(StatusSource::Upload, "Sent data successfully");
                    return UploadOutcome::Delivered;
                }
                SendStatus::Response(code) => {
                    warn!(code, timestamp = reading.timestamp, "Rejected by server, dropping");
                    self.status.warn(
                        StatusSource::Upload,
                        format!("Returned {code}, dropping packet"),
                    );
                    return UploadOutcome::Dropped;
                }
                SendStatus::TransportFailure if self.policy.should_retry(retries) => {
                    retries += 1;
                    info!(
                        retry = retries,
                        max_retries = self.policy.max_retries,
                        "Failed to send data, retrying"
                    );
                    self.status.warn(StatusSource::Upload, "Failed to send data");
                    tokio::time::sleep(self.policy.delay).await;
                }
                SendStatus::TransportFailure => {
                    error!(
                        attempts = retries + 1,
                        timestamp = reading.timestamp,
                        "No response after all retries, dropping"
                    );
                    self.status.error(
                        StatusSource::Upload,
                        format!("No response after {} attempts, dropping packet", retries + 1),
                    );
                    return UploadOutcome::Dropped;
                }
            }
        }
    }

    /// Drain `rx` until every sender is gone.
    pub async fn run(self, mut rx: mpsc::Receiver<SensorReading>) {
        while let Some(reading) = rx.recv().await {
            self.upload(&reading).await;
        }
        info!(
            delivered = self.stats.delivered(),
            dropped = self.stats.dropped(),
            "Network channel closed, uploader stopping"
        );
    }
}
