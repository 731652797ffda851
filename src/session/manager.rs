//! Session manager
//!
//! Sole owner of one connection's relay. Control messages are handled one
//! at a time, in arrival order; a new start always waits for the previous
//! relay to be fully stopped.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::constants::DROP_LOG_INTERVAL;
use crate::device::DeviceApi;
use crate::protocol::{ClientMessage, ServerMessage, STREAM_MODE_HLS};
use crate::relay::controller::wait_until_ended;
use crate::relay::{AudioSendOutcome, RelayController, RelayState};
use crate::session::{ConnectionId, PendingStart, SessionCounters, SessionRegistry, SessionSnapshot};

/// Lifecycle of a connection's stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No relay associated
    Idle,
    /// Relay up and advertised to the client
    Streaming,
}

/// Why a relay is being torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    StopRequested,
    Replaced,
    RemoteEnded,
    Disconnected,
}

/// Mediates between one client connection and its relay
pub struct SessionManager {
    connection_id: ConnectionId,
    api: Arc<dyn DeviceApi>,
    config: Arc<AppConfig>,
    registry: SessionRegistry,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    pending: PendingStart,

    relay: Option<RelayController>,
    counters: SessionCounters,
}

impl SessionManager {
    pub fn new(
        connection_id: ConnectionId,
        api: Arc<dyn DeviceApi>,
        config: Arc<AppConfig>,
        registry: SessionRegistry,
        outbound: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            connection_id,
            api,
            config,
            registry,
            outbound,
            pending: PendingStart::new(),
            relay: None,
            counters: SessionCounters::default(),
        }
    }

    /// Handle for aborting an in-flight start from outside the session loop
    pub fn pending_start(&self) -> PendingStart {
        self.pending.clone()
    }

    /// Drive the session until `inbound` closes, then tear down
    pub async fn run(mut self, mut inbound: mpsc::Receiver<ClientMessage>) {
        loop {
            let ended = self.end_of_call();
            tokio::select! {
                msg = inbound.recv() => match msg {
                    Some(msg) => self.handle(msg).await,
                    None => break,
                },
                _ = wait_for_end(ended) => self.on_call_ended().await,
            }
        }
        self.disconnect().await;
    }

    /// Dispatch one control message
    pub async fn handle(&mut self, msg: ClientMessage) {
        if !matches!(msg, ClientMessage::AudioData { .. }) {
            debug!(connection_id = %self.connection_id, "Received {}", msg.kind());
        }

        match msg {
            ClientMessage::StartStream { device_id } => self.start_stream(&device_id).await,
            ClientMessage::StopStream => self.stop_stream().await,
            ClientMessage::ActivateMic => self.activate_mic().await,
            ClientMessage::DeactivateMic => self.deactivate_mic(),
            ClientMessage::AudioData { data } => self.audio_data(&data).await,
        }
    }

    async fn start_stream(&mut self, device_id: &str) {
        info!(connection_id = %self.connection_id, device_id = %device_id, "Start requested");

        // Previous relay is fully down before anything else happens
        self.teardown(TeardownReason::Replaced).await;

        let device = match self.api.find_device(device_id).await {
            Ok(device) => device,
            Err(e) => {
                warn!(connection_id = %self.connection_id, "Cannot resolve device {}: {}", device_id, e);
                self.send(ServerMessage::stream_error(e));
                return;
            }
        };

        let mut relay = RelayController::new(
            self.api.clone(),
            device.clone(),
            self.config.relay.clone(),
            self.config.uplink.clone(),
            self.config.server.streams_url_prefix.clone(),
        );

        let cancel = self.pending.begin();
        let result = relay.start(&cancel).await;
        self.pending.finish();

        match result {
            Ok(playlist_url) => {
                self.counters.relays_started += 1;
                self.registry.register(SessionSnapshot {
                    connection_id: self.connection_id,
                    device_id: device.id.clone(),
                    device_name: device.name.clone(),
                    relay_session_id: relay.session_id().unwrap_or_default().to_string(),
                    playlist_url: playlist_url.clone(),
                    microphone_active: false,
                    started_at: Utc::now(),
                    counters: self.counters.clone(),
                });
                self.relay = Some(relay);
                self.send(ServerMessage::StreamStarted {
                    device_id: device.id,
                    device_name: device.name,
                    mode: STREAM_MODE_HLS.to_string(),
                    playlist_url,
                });
            }
            Err(e) => {
                warn!(connection_id = %self.connection_id, device_id = %device_id, "Stream start failed: {}", e);
                self.send(ServerMessage::stream_error(e));
            }
        }
    }

    async fn stop_stream(&mut self) {
        self.teardown(TeardownReason::StopRequested).await;
        self.send(ServerMessage::StreamStopped);
    }

    async fn activate_mic(&mut self) {
        let relay = match self.relay.as_mut() {
            Some(relay) => relay,
            None => {
                self.send(ServerMessage::mic_error("No active stream"));
                return;
            }
        };

        if relay.activate_microphone().await {
            self.registry.update(&self.connection_id, |s| s.microphone_active = true);
            self.send(ServerMessage::MicActivated);
        } else {
            self.send(ServerMessage::mic_error("Failed to activate microphone"));
        }
    }

    fn deactivate_mic(&mut self) {
        if let Some(relay) = self.relay.as_mut() {
            relay.deactivate_microphone();
            self.registry.update(&self.connection_id, |s| s.microphone_active = false);
        }
        self.send(ServerMessage::MicDeactivated);
    }

    /// Forward one PCM frame, or drop it when no relay can take audio
    pub async fn audio_data(&mut self, data: &[u8]) {
        self.counters.frames_received += 1;

        let outcome = match self.relay.as_mut() {
            Some(relay) if relay.can_send_audio() => relay.send_audio_data(data).await,
            _ => AudioSendOutcome::Dropped,
        };

        let counters = &mut self.counters;
        match outcome {
            AudioSendOutcome::Sent => counters.packets_sent += 1,
            AudioSendOutcome::Dropped => {
                counters.frames_dropped += 1;
                if counters.frames_dropped % DROP_LOG_INTERVAL == 1 {
                    warn!(
                        connection_id = %self.connection_id,
                        "Dropped audio frame #{} - stream not ready or mic not active",
                        counters.frames_dropped
                    );
                }
            }
            AudioSendOutcome::EncodeFailed => {
                counters.encode_failures += 1;
                if counters.encode_failures % DROP_LOG_INTERVAL == 1 {
                    warn!(
                        connection_id = %self.connection_id,
                        "Opus encode failures: {}", counters.encode_failures
                    );
                }
            }
            AudioSendOutcome::SendFailed => {
                counters.send_failures += 1;
                if counters.send_failures % DROP_LOG_INTERVAL == 1 {
                    warn!(
                        connection_id = %self.connection_id,
                        "Opus RTP send failures: {}", counters.send_failures
                    );
                }
            }
        }

        let counters = self.counters.clone();
        self.registry.update(&self.connection_id, |s| s.counters = counters);
    }

    /// End-of-call signal of the associated relay
    pub fn end_of_call(&self) -> Option<watch::Receiver<bool>> {
        self.relay.as_ref().and_then(|relay| relay.end_of_call())
    }

    /// The device ended the call on its own
    pub async fn on_call_ended(&mut self) {
        if self.teardown(TeardownReason::RemoteEnded).await {
            self.send(ServerMessage::StreamEnded);
        }
    }

    /// Connection lost: abort any start, stop the relay, forget the connection
    pub async fn disconnect(mut self) {
        info!(connection_id = %self.connection_id, "Client disconnected");
        self.pending.cancel();
        self.teardown(TeardownReason::Disconnected).await;
        self.registry.remove(&self.connection_id);
    }

    /// The one place a relay leaves this session; returns whether there was one
    async fn teardown(&mut self, reason: TeardownReason) -> bool {
        let mut relay = match self.relay.take() {
            Some(relay) => relay,
            None => return false,
        };

        info!(
            connection_id = %self.connection_id,
            device_id = %relay.device().id,
            reason = ?reason,
            "Tearing down relay"
        );

        match reason {
            TeardownReason::RemoteEnded => relay.handle_call_ended().await,
            _ => relay.stop().await,
        }
        self.registry.remove(&self.connection_id);
        true
    }

    fn send(&self, msg: ServerMessage) {
        if self.outbound.send(msg).is_err() {
            debug!(connection_id = %self.connection_id, "Client gone, message discarded");
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    pub fn state(&self) -> SessionState {
        match &self.relay {
            Some(relay) if relay.state() == RelayState::Active => SessionState::Streaming,
            _ => SessionState::Idle,
        }
    }

    pub fn relay(&self) -> Option<&RelayController> {
        self.relay.as_ref()
    }

    pub fn counters(&self) -> &SessionCounters {
        &self.counters
    }
}

async fn wait_for_end(ended: Option<watch::Receiver<bool>>) {
    match ended {
        Some(ended) => wait_until_ended(ended).await,
        None => std::future::pending().await,
    }
}
