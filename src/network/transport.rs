//! Network sender used by the uploader.
//!
//! The uploader only needs to know whether a request got a response at all,
//! and if so which status code. [`SendStatus`] keeps those two apart: the
//! retry policy applies to the former only.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::UploadConfig;
use crate::error::{AppResult, StationError};

/// Outcome of one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// No usable response: connection refused, reset, timed out.
    TransportFailure,
    /// The server answered with this HTTP status.
    Response(u16),
}

/// Delivers one encoded payload.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, body: String) -> SendStatus;
}

// =============================================================================
// HttpTransport - InfluxDB v2 write endpoint
// =============================================================================

/// Posts payloads to `/api/v2/write` with token authentication.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    authorization: String,
}

impl HttpTransport {
    pub fn new(config: &UploadConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| StationError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: Self::write_url(config),
            authorization: format!("Token {}", config.token),
        })
    }

    /// Write endpoint for the configured server, org and bucket.
    pub fn write_url(config: &UploadConfig) -> String {
        format!(
            "http://{}:{}/api/v2/write?org={}&bucket={}&precision=s",
            config.host, config.port, config.org, config.bucket
        )
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, body: String) -> SendStatus {
        let result = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .header(AUTHORIZATION, &self.authorization)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let code = response.status().as_u16();
                debug!(code, "Write request answered");
                SendStatus::Response(code)
            }
            Err(e) => {
                warn!(error = %e, "Write request got no response");
                SendStatus::TransportFailure
            }
        }
    }
}

// =============================================================================
// MockTransport - scripted responses
// =============================================================================

/// Transport that answers from a script and records every body it was given.
///
/// Once the script runs out it keeps answering with the fallback status
/// (204 unless changed), which makes it usable as an offline sink.
#[derive(Debug, Clone)]
pub struct MockTransport {
    script: Arc<Mutex<VecDeque<SendStatus>>>,
    sent: Arc<Mutex<Vec<String>>>,
    fallback: SendStatus,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::answering(SendStatus::Response(204))
    }

    /// Transport that always answers `status`.
    pub fn answering(status: SendStatus) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            sent: Arc::new(Mutex::new(Vec::new())),
            fallback: status,
        }
    }

    /// Queue `status` as the answer to the next unscripted attempt.
    pub fn push(&self, status: SendStatus) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(status);
    }

    /// Bodies of every attempt so far, in order.
    pub fn sent(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn attempts(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, body: String) -> SendStatus {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(body);
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_url_targets_the_v2_api() {
        let config = UploadConfig {
            host: "192.168.4.2".to_string(),
            ..UploadConfig::default()
        };
        assert_eq!(
            HttpTransport::write_url(&config),
            "http://192.168.4.2:8086/api/v2/write?org=weather-station-group&bucket=weather-records&precision=s"
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_failure() {
        // nothing listens on port 9 of the loopback interface
        let config = UploadConfig {
            host: "127.0.0.1".to_string(),
            port: 9,
            request_timeout_ms: 500,
            ..UploadConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(
            transport.send("weather x=1 1".to_string()).await,
            SendStatus::TransportFailure
        );
    }

    #[tokio::test]
    async fn mock_follows_script_then_fallback() {
        let transport = MockTransport::new();
        transport.push(SendStatus::TransportFailure);
        transport.push(SendStatus::Response(400));

        assert_eq!(transport.send("a".into()).await, SendStatus::TransportFailure);
        assert_eq!(transport.send("b".into()).await, SendStatus::Response(400));
        assert_eq!(transport.send("c".into()).await, SendStatus::Response(204));
        assert_eq!(transport.sent(), vec!["a", "b", "c"]);
        assert_eq!(transport.attempts(), 3);
    }
}
