//! Per-connection stream sessions
//!
//! One [`SessionManager`] per client connection owns that connection's relay.
//! The [`SessionRegistry`] mirrors who owns what for status reporting.

pub mod manager;
pub mod registry;

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use manager::{SessionManager, SessionState, TeardownReason};
pub use registry::{SessionRegistry, SessionSnapshot};

/// Identity of one client connection
pub type ConnectionId = Uuid;

/// Diagnostic counters of one connection, monotonically increasing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCounters {
    pub frames_received: u64,
    pub packets_sent: u64,
    pub frames_dropped: u64,
    pub encode_failures: u64,
    pub send_failures: u64,
    pub relays_started: u64,
}

/// Cancellation handle of the start currently in flight, if any
///
/// Shared between the session and the connection's reader so a stop, a
/// newer start or a disconnect can abort a start that is still waiting.
#[derive(Clone, Default)]
pub struct PendingStart {
    slot: Arc<Mutex<Option<CancellationToken>>>,
}

impl PendingStart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new in-flight start
    pub fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.slot.lock().replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Clear the slot once the in-flight start has finished
    pub fn finish(&self) {
        self.slot.lock().take();
    }

    /// Abort the in-flight start, if any
    pub fn cancel(&self) -> bool {
        match self.slot.lock().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot.lock().is_some()
    }
}
