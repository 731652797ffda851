//! Readiness prober
//!
//! Polls for the relay's first playlist. Read-only: the prober never
//! creates, touches or removes the file it watches.

use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RelayConfig;

/// Result of a readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Artifact exists and is larger than the minimum; carries its size
    Ready(u64),
    TimedOut,
    Cancelled,
}

impl ProbeOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ProbeOutcome::Ready(_))
    }
}

/// Interval-based file readiness check
#[derive(Debug, Clone)]
pub struct ReadinessProber {
    poll_interval: Duration,
    max_wait: Duration,
    min_bytes: u64,
}

impl ReadinessProber {
    pub fn new(poll_interval: Duration, max_wait: Duration, min_bytes: u64) -> Self {
        Self {
            poll_interval,
            max_wait,
            min_bytes,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(
            config.readiness_poll_interval(),
            config.readiness_max_wait(),
            config.min_playlist_bytes,
        )
    }

    /// Wait until `path` exists with more than `min_bytes`, or `max_wait` elapses
    pub async fn wait_for_artifact(&self, path: &Path) -> bool {
        self.wait_for_artifact_or_cancel(path, &CancellationToken::new())
            .await
            .is_ready()
    }

    /// Same as [`wait_for_artifact`](Self::wait_for_artifact), aborting early on `cancel`
    pub async fn wait_for_artifact_or_cancel(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> ProbeOutcome {
        let deadline = Instant::now() + self.max_wait;
        let mut polls = 0u32;

        debug!("Waiting for playlist: {}", path.display());

        loop {
            if cancel.is_cancelled() {
                return ProbeOutcome::Cancelled;
            }

            polls += 1;
            if let Some(size) = self.artifact_size(path).await {
                debug!("Playlist ready ({} bytes) after {} polls", size, polls);
                return ProbeOutcome::Ready(size);
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("Playlist wait timeout after {} polls", polls);
                return ProbeOutcome::TimedOut;
            }

            let pause = self.poll_interval.min(deadline - now);
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = cancel.cancelled() => return ProbeOutcome::Cancelled,
            }
        }
    }

    async fn artifact_size(&self, path: &Path) -> Option<u64> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() && meta.len() > self.min_bytes => Some(meta.len()),
            _ => None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }
}
