//! Media relay process controller
//!
//! Owns at most one live call with a device and the HLS output it produces.
//!
//! ```text
//!            start()                probe ok
//!   Idle ───────────────▶ Starting ───────────▶ Active
//!    ▲                      │                     │
//!    │  timeout / error /   │                     │ stop()        end of call
//!    │  cancel (call torn   │                     ▼               (remote)
//!    │  down first)         │                  Stopping ──▶ Idle ◀──────── Active
//!    └──────────────────────┘
//! ```
//!
//! The controller is driven by a single owner (`&mut self` everywhere), so
//! transitions never interleave.

use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{RelayConfig, UplinkConfig};
use crate::device::{DeviceApi, DeviceInfo, LiveCall};
use crate::error::{DeviceError, RelayError};
use crate::relay::mux::{hls_mux_options, new_session_id, ArtifactPaths};
use crate::relay::probe::{ProbeOutcome, ReadinessProber};
use crate::uplink::AudioUplinkState;

/// Relay lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Starting,
    Active,
    Stopping,
}

/// What happened to one audio frame handed to [`RelayController::send_audio_data`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSendOutcome {
    Sent,
    /// No call, no activated uplink, or no samples in the buffer
    Dropped,
    /// Opus rejected the frame; the uplink stays up
    EncodeFailed,
    /// The device did not take the packet; the uplink stays up
    SendFailed,
}

/// Supervises one device call producing an HLS playlist
pub struct RelayController {
    api: Arc<dyn DeviceApi>,
    device: DeviceInfo,
    config: RelayConfig,
    uplink_config: UplinkConfig,
    url_prefix: String,
    prober: ReadinessProber,

    state: RelayState,
    call: Option<Box<dyn LiveCall>>,
    artifacts: Option<ArtifactPaths>,
    uplink: Option<AudioUplinkState>,
}

impl RelayController {
    pub fn new(
        api: Arc<dyn DeviceApi>,
        device: DeviceInfo,
        config: RelayConfig,
        uplink_config: UplinkConfig,
        url_prefix: impl Into<String>,
    ) -> Self {
        let prober = ReadinessProber::from_config(&config);
        Self {
            api,
            device,
            config,
            uplink_config,
            url_prefix: url_prefix.into(),
            prober,
            state: RelayState::Idle,
            call: None,
            artifacts: None,
            uplink: None,
        }
    }

    /// Start the relay and wait for its first playlist
    ///
    /// Returns the playlist URL. Idempotent while active. On any failure
    /// the call (if one was obtained) is stopped before the error returns.
    pub async fn start(&mut self, cancel: &CancellationToken) -> Result<String, RelayError> {
        match self.state {
            RelayState::Active => {
                if let Some(paths) = &self.artifacts {
                    debug!("Relay for {} already active", self.device.name);
                    return Ok(paths.playlist_url.clone());
                }
            }
            RelayState::Idle => {}
            // Left behind by an abandoned start or stop
            RelayState::Starting | RelayState::Stopping => self.teardown().await,
        }

        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(RelayError::OutputDir)?;

        let session_id = new_session_id();
        let paths = ArtifactPaths::new(&self.config.output_dir, &self.url_prefix, &session_id);
        let mux = hls_mux_options(&self.config, &paths);

        info!(
            device_id = %self.device.id,
            session_id = %session_id,
            "Starting relay for {}", self.device.name
        );

        self.state = RelayState::Starting;
        self.artifacts = Some(paths.clone());

        // Never raced against cancellation: a call granted after a cancel
        // must still be seen here so it can be stopped.
        let call = match self.api.request_live_call(&self.device, mux).await {
            Ok(call) => call,
            Err(e) => {
                error!(device_id = %self.device.id, "Live call request failed: {}", e);
                self.teardown().await;
                return Err(RelayError::StartFailed(e));
            }
        };
        let ended = call.end_of_call();
        self.call = Some(call);

        if cancel.is_cancelled() {
            info!(session_id = %session_id, "Start cancelled after call was granted, stopping it");
            self.teardown().await;
            return Err(RelayError::Cancelled);
        }

        let outcome = tokio::select! {
            outcome = self.prober.wait_for_artifact_or_cancel(&paths.playlist_path, cancel) => Some(outcome),
            _ = wait_until_ended(ended) => None,
        };

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => {
                warn!(session_id = %session_id, "Call ended before the playlist was ready");
                self.teardown().await;
                return Err(RelayError::StartFailed(DeviceError::CallEnded));
            }
        };

        match outcome {
            ProbeOutcome::Ready(size) => {
                self.state = RelayState::Active;
                info!(
                    session_id = %session_id,
                    playlist_bytes = size,
                    "Relay active, playlist: {}", paths.playlist_url
                );
                Ok(paths.playlist_url)
            }
            ProbeOutcome::TimedOut => {
                error!(session_id = %session_id, "Playlist was not created - transcoder may have failed");
                self.teardown().await;
                Err(RelayError::ReadinessTimeout(self.config.readiness_max_wait_ms))
            }
            ProbeOutcome::Cancelled => {
                info!(session_id = %session_id, "Start cancelled while waiting for playlist");
                self.teardown().await;
                Err(RelayError::Cancelled)
            }
        }
    }

    /// Stop the call if there is one; no-op otherwise
    pub async fn stop(&mut self) {
        if self.state == RelayState::Idle && self.call.is_none() {
            return;
        }
        info!(device_id = %self.device.id, "Stopping relay for {}", self.device.name);
        self.teardown().await;
    }

    /// Remote end-of-call: release everything without asking the device again
    pub async fn handle_call_ended(&mut self) {
        info!(device_id = %self.device.id, "Call ended for {}", self.device.name);
        self.call = None;
        self.teardown().await;
    }

    /// Single exit path for every transition back to Idle
    async fn teardown(&mut self) {
        self.state = RelayState::Stopping;
        self.uplink = None;

        if let Some(call) = self.call.take() {
            if let Err(e) = call.stop().await {
                warn!("Error stopping live call: {}", e);
            }
        }

        if let Some(paths) = self.artifacts.take() {
            if self.config.cleanup_artifacts {
                match paths.remove_all().await {
                    Ok(n) => debug!(session_id = %paths.session_id, "Removed {} artifacts", n),
                    Err(e) => warn!(session_id = %paths.session_id, "Artifact cleanup failed: {}", e),
                }
            }
        }

        self.state = RelayState::Idle;
    }

    /// Open the device speaker and arm a fresh uplink
    ///
    /// Returns `false` rather than failing when there is no call or the
    /// device refuses.
    pub async fn activate_microphone(&mut self) -> bool {
        let call = match &self.call {
            Some(call) => call,
            None => {
                info!("No active call for microphone");
                return false;
            }
        };

        if let Err(e) = call.activate_speaker().await {
            warn!(device_id = %self.device.id, "Error activating speaker: {}", e);
            return false;
        }

        match AudioUplinkState::new(self.uplink_config.clone()) {
            Ok(uplink) => {
                info!(
                    ssrc = uplink.packetizer().ssrc(),
                    "Speaker activated - Opus RTP link ready ({} Hz, {} ch, {} bps)",
                    self.uplink_config.sample_rate,
                    self.uplink_config.channels,
                    self.uplink_config.bitrate
                );
                self.uplink = Some(uplink);
                true
            }
            Err(e) => {
                error!("Opus encoder init failed: {}", e);
                false
            }
        }
    }

    pub fn deactivate_microphone(&mut self) {
        if self.uplink.take().is_some() {
            info!(device_id = %self.device.id, "Microphone deactivated");
        }
    }

    /// True while a live call exists
    pub fn can_send_audio(&self) -> bool {
        self.call.is_some()
    }

    pub fn is_microphone_active(&self) -> bool {
        self.uplink.is_some()
    }

    /// Encode and forward one PCM frame; never fails the caller
    ///
    /// Nothing is counted here; the owning session keeps the tallies.
    pub async fn send_audio_data(&mut self, data: &[u8]) -> AudioSendOutcome {
        let (call, uplink) = match (&self.call, &mut self.uplink) {
            (Some(call), Some(uplink)) => (call, uplink),
            _ => return AudioSendOutcome::Dropped,
        };

        // Fewer than two bytes hold no sample
        if data.len() < 2 {
            return AudioSendOutcome::Dropped;
        }

        let packet = match uplink.encode_frame(data) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Opus encode error: {}", e);
                return AudioSendOutcome::EncodeFailed;
            }
        };

        match call.send_audio_packet(&packet).await {
            Ok(()) => AudioSendOutcome::Sent,
            Err(e) => {
                debug!(
                    sequence = packet.header.sequence_number,
                    "Opus RTP send error: {}", e
                );
                AudioSendOutcome::SendFailed
            }
        }
    }

    /// End-of-call signal of the current call, if any
    pub fn end_of_call(&self) -> Option<watch::Receiver<bool>> {
        self.call.as_ref().map(|call| call.end_of_call())
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn playlist_url(&self) -> Option<&str> {
        match self.state {
            RelayState::Active => self.artifacts.as_ref().map(|p| p.playlist_url.as_str()),
            _ => None,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.artifacts.as_ref().map(|p| p.session_id.as_str())
    }

    pub fn uplink(&self) -> Option<&AudioUplinkState> {
        self.uplink.as_ref()
    }
}

/// Resolves once the watched call reports it has ended
pub async fn wait_until_ended(mut ended: watch::Receiver<bool>) {
    // A dropped sender means nobody can report the call alive any more
    let _ = ended.wait_for(|ended| *ended).await;
}
