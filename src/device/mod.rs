//! Device / account API boundary
//!
//! The relay only talks to cameras through [`DeviceApi`] and [`LiveCall`].
//! Every method is a fallible network call with no built-in retry.

pub mod ffmpeg;
pub mod udp;

use async_trait::async_trait;
use bytes::Bytes;
use rtp::packet::Packet;
use serde::Serialize;
use tokio::sync::watch;

use crate::error::DeviceError;

pub use ffmpeg::FfmpegDeviceApi;
pub use udp::ReturnAudioSink;

/// Public description of a camera
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub model: String,
    pub battery_level: Option<u8>,
}

/// Encoder/muxer directives handed to the device when a call is requested
///
/// Each group is a flat list of transcoder arguments; `output` ends with the
/// playlist path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MuxOptions {
    pub video: Vec<String>,
    pub audio: Vec<String>,
    pub output: Vec<String>,
}

impl MuxOptions {
    /// All groups in invocation order
    pub fn to_args(&self) -> Vec<String> {
        self.video
            .iter()
            .chain(self.audio.iter())
            .chain(self.output.iter())
            .cloned()
            .collect()
    }
}

/// Account-level device API
#[async_trait]
pub trait DeviceApi: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>, DeviceError>;

    async fn find_device(&self, device_id: &str) -> Result<DeviceInfo, DeviceError> {
        self.list_devices()
            .await?
            .into_iter()
            .find(|d| d.id == device_id)
            .ok_or_else(|| DeviceError::NotFound(device_id.to_string()))
    }

    /// Start a live call whose media is muxed according to `mux`
    async fn request_live_call(
        &self,
        device: &DeviceInfo,
        mux: MuxOptions,
    ) -> Result<Box<dyn LiveCall>, DeviceError>;

    /// Current still image (JPEG)
    async fn snapshot(&self, device: &DeviceInfo) -> Result<Bytes, DeviceError>;
}

/// An established live call with a device
#[async_trait]
pub trait LiveCall: Send + Sync {
    /// Open the device speaker for return audio
    async fn activate_speaker(&self) -> Result<(), DeviceError>;

    /// Forward one RTP packet to the device's inbound audio channel
    async fn send_audio_packet(&self, packet: &Packet) -> Result<(), DeviceError>;

    /// Terminate the call; resolves once the call is down
    async fn stop(&self) -> Result<(), DeviceError>;

    /// Flips to `true` once the call has ended, for whatever reason
    fn end_of_call(&self) -> watch::Receiver<bool>;
}
