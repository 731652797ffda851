//! Scripted device API for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rtp::packet::Packet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use cam_relay::config::{AppConfig, RelayConfig, UplinkConfig};
use cam_relay::device::{DeviceApi, DeviceInfo, LiveCall, MuxOptions};
use cam_relay::error::DeviceError;

pub const PLAYLIST_BYTES: usize = 120;
pub const POLL_MS: u64 = 50;
pub const MAX_WAIT_MS: u64 = 400;

/// How the scripted device reacts
#[derive(Debug, Clone)]
pub struct Behavior {
    /// Delay before the playlist shows up; `None` means never
    pub ready_after: Option<Duration>,
    pub refuse_call: bool,
    pub speaker_ok: bool,
    /// 1-based index of the audio send attempt the device rejects
    pub fail_send_at: Option<usize>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            ready_after: Some(Duration::from_millis(5)),
            refuse_call: false,
            speaker_ok: true,
            fail_send_at: None,
        }
    }
}

/// Everything the tests want to observe
#[derive(Default)]
pub struct Recorder {
    pub calls_requested: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub active_calls: AtomicUsize,
    pub max_active_calls: AtomicUsize,
    pub send_attempts: AtomicUsize,
    pub packets: Mutex<Vec<Packet>>,
    pub playlists: Mutex<Vec<PathBuf>>,
    ended: Mutex<Vec<Arc<watch::Sender<bool>>>>,
}

impl Recorder {
    pub fn calls_requested(&self) -> usize {
        self.calls_requested.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::SeqCst)
    }

    pub fn max_active_calls(&self) -> usize {
        self.max_active_calls.load(Ordering::SeqCst)
    }

    pub fn packets(&self) -> Vec<Packet> {
        self.packets.lock().clone()
    }

    /// (sequence, timestamp) of every packet seen so far
    pub fn seq_ts(&self) -> Vec<(u16, u32)> {
        self.packets
            .lock()
            .iter()
            .map(|p| (p.header.sequence_number, p.header.timestamp))
            .collect()
    }

    fn call_started(&self) {
        self.calls_requested.fetch_add(1, Ordering::SeqCst);
        let now = self.active_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_calls.fetch_max(now, Ordering::SeqCst);
    }
}

/// Flip a call's end flag once; the first flip releases the active slot
fn end_call(ended: &watch::Sender<bool>, recorder: &Recorder) {
    let flipped = ended.send_if_modified(|ended| {
        if *ended {
            false
        } else {
            *ended = true;
            true
        }
    });
    if flipped {
        recorder.active_calls.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockDeviceApi {
    devices: Vec<DeviceInfo>,
    behavior: Mutex<Behavior>,
    pub recorder: Arc<Recorder>,
}

impl MockDeviceApi {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            devices: vec![device("D1", "Front Door"), device("D2", "Garage")],
            behavior: Mutex::new(behavior),
            recorder: Arc::new(Recorder::default()),
        }
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock() = behavior;
    }

    /// Simulate the device hanging up every call
    pub fn end_all_calls(&self) {
        for ended in self.recorder.ended.lock().iter() {
            end_call(ended, &self.recorder);
        }
    }
}

#[async_trait]
impl DeviceApi for MockDeviceApi {
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        Ok(self.devices.clone())
    }

    async fn request_live_call(
        &self,
        device: &DeviceInfo,
        mux: MuxOptions,
    ) -> Result<Box<dyn LiveCall>, DeviceError> {
        let behavior = self.behavior.lock().clone();
        if behavior.refuse_call {
            return Err(DeviceError::CallFailed(format!("{} refused", device.id)));
        }

        let playlist = mux
            .output
            .last()
            .map(PathBuf::from)
            .ok_or_else(|| DeviceError::CallFailed("no output".to_string()))?;
        self.recorder.playlists.lock().push(playlist.clone());
        self.recorder.call_started();

        let writer = behavior.ready_after.map(|delay| {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tokio::fs::write(&playlist, vec![b'#'; PLAYLIST_BYTES]).await;
            })
        });

        let (ended_tx, ended_rx) = watch::channel(false);
        let ended_tx = Arc::new(ended_tx);
        self.recorder.ended.lock().push(ended_tx.clone());

        Ok(Box::new(MockCall {
            recorder: self.recorder.clone(),
            speaker_ok: behavior.speaker_ok,
            fail_send_at: behavior.fail_send_at,
            ended_tx,
            ended_rx,
            writer: Mutex::new(writer),
        }))
    }

    async fn snapshot(&self, _device: &DeviceInfo) -> Result<Bytes, DeviceError> {
        Ok(Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]))
    }
}

pub struct MockCall {
    recorder: Arc<Recorder>,
    speaker_ok: bool,
    fail_send_at: Option<usize>,
    ended_tx: Arc<watch::Sender<bool>>,
    ended_rx: watch::Receiver<bool>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl LiveCall for MockCall {
    async fn activate_speaker(&self) -> Result<(), DeviceError> {
        if *self.ended_rx.borrow() {
            return Err(DeviceError::CallEnded);
        }
        if self.speaker_ok {
            Ok(())
        } else {
            Err(DeviceError::SpeakerUnavailable("muted by test".to_string()))
        }
    }

    async fn send_audio_packet(&self, packet: &Packet) -> Result<(), DeviceError> {
        let attempt = self.recorder.send_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_send_at == Some(attempt) {
            return Err(DeviceError::SendFailed("rejected by test".to_string()));
        }
        self.recorder.packets.lock().push(packet.clone());
        Ok(())
    }

    async fn stop(&self) -> Result<(), DeviceError> {
        self.recorder.stop_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(writer) = self.writer.lock().take() {
            writer.abort();
        }
        end_call(&self.ended_tx, &self.recorder);
        Ok(())
    }

    fn end_of_call(&self) -> watch::Receiver<bool> {
        self.ended_rx.clone()
    }
}

pub fn device(id: &str, name: &str) -> DeviceInfo {
    DeviceInfo {
        id: id.to_string(),
        name: name.to_string(),
        model: "doorbell".to_string(),
        battery_level: Some(80),
    }
}

/// Relay settings with short readiness timings writing under `dir`
pub fn relay_config(dir: &Path) -> RelayConfig {
    RelayConfig {
        output_dir: dir.to_path_buf(),
        readiness_max_wait_ms: MAX_WAIT_MS,
        readiness_poll_interval_ms: POLL_MS,
        ..RelayConfig::default()
    }
}

pub fn app_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.relay = relay_config(dir);
    config
}

pub fn uplink_config() -> UplinkConfig {
    UplinkConfig::default()
}

/// One 20 ms frame of a quiet tone as little-endian PCM
pub fn pcm_frame() -> Vec<u8> {
    (0..960)
        .map(|i| ((i as f32 * 0.05).sin() * 3000.0) as i16)
        .flat_map(|s| s.to_le_bytes())
        .collect()
}
