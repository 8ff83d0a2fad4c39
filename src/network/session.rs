//! Network session handle.
//!
//! Whatever manages the link (Wi-Fi join, database configuration) owns the
//! lifecycle and flips the state here; the uploader only asks "is a session
//! usable" and, when it is not, parks on [`SessionHandle::wait_usable`] until
//! it is told otherwise.
//!
//! ```text
//! Disconnected ──connect()──▶ Connected
//!      ▲                          │
//!      └──────disconnect()────────┘
//! ```

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::info;

/// Whether the uplink can currently carry requests.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// No session; uploads wait.
    Disconnected,

    /// Session established.
    Connected {
        /// Time when the session became usable
        since: Instant,
    },
}

impl SessionState {
    /// Returns true if requests can be sent.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    /// Returns a short status label for display.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connected { .. } => "Connected",
        }
    }
}

impl PartialEq for SessionState {
    fn eq(&self, other: &Self) -> bool {
        // Compare variants without comparing Instant fields
        matches!(
            (self, other),
            (Self::Disconnected, Self::Disconnected) | (Self::Connected { .. }, Self::Connected { .. })
        )
    }
}

/// Shared handle on the session state. Clones observe the same session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    state: Arc<watch::Sender<SessionState>>,
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandle {
    /// A handle starting out disconnected.
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            state: Arc::new(state),
        }
    }

    /// A handle that is already usable.
    pub fn connected() -> Self {
        let handle = Self::new();
        handle.connect();
        handle
    }

    /// Mark the session usable and wake every waiter.
    pub fn connect(&self) {
        let previous = self.state.send_replace(SessionState::Connected {
            since: Instant::now(),
        });
        if !previous.is_usable() {
            info!("Uplink session established");
        }
    }

    /// Mark the session unusable.
    pub fn disconnect(&self) {
        let previous = self.state.send_replace(SessionState::Disconnected);
        if previous.is_usable() {
            info!("Uplink session lost");
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_usable(&self) -> bool {
        self.state.borrow().is_usable()
    }

    /// Wait until the session is usable. Returns immediately if it already is.
    pub async fn wait_usable(&self) {
        let mut rx = self.state.subscribe();
        // the sender lives in `self`, so the channel cannot close under us
        let _ = rx.wait_for(SessionState::is_usable).await;
    }
}
