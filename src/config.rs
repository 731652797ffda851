//! Application configuration
//!
//! Loaded from a TOML file. Every section has defaults, so an empty file
//! (or no file at all) yields a working configuration with no devices.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;

/// Config file name looked up in the platform config directory
pub const CONFIG_FILE_NAME: &str = "cam-relay.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub relay: RelayConfig,
    pub uplink: UplinkConfig,
    pub devices: Vec<DeviceConfig>,
}

/// HTTP / WebSocket server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub http_port: u16,
    /// Directory served as static files (the HLS output lives below it)
    pub static_dir: PathBuf,
    /// URL prefix under which `relay.output_dir` is reachable
    pub streams_url_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            static_dir: PathBuf::from("./public"),
            streams_url_prefix: "/streams".to_string(),
        }
    }
}

/// Relay (transcode + HLS output) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Where playlists and segments are written
    pub output_dir: PathBuf,
    /// ffmpeg executable
    pub ffmpeg_path: String,
    pub readiness_max_wait_ms: u64,
    pub readiness_poll_interval_ms: u64,
    pub min_playlist_bytes: u64,
    pub segment_seconds: u32,
    pub list_size: u32,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub audio_sample_rate: u32,
    /// Remove a session's playlist and segments when its relay is torn down
    pub cleanup_artifacts: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./public/streams"),
            ffmpeg_path: "ffmpeg".to_string(),
            readiness_max_wait_ms: DEFAULT_READINESS_MAX_WAIT_MS,
            readiness_poll_interval_ms: DEFAULT_READINESS_POLL_INTERVAL_MS,
            min_playlist_bytes: MIN_PLAYLIST_BYTES,
            segment_seconds: HLS_SEGMENT_SECONDS,
            list_size: HLS_LIST_SIZE,
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
            audio_sample_rate: 44_100,
            cleanup_artifacts: true,
        }
    }
}

impl RelayConfig {
    pub fn readiness_max_wait(&self) -> Duration {
        Duration::from_millis(self.readiness_max_wait_ms)
    }

    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_interval_ms)
    }
}

/// Return-audio encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UplinkConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per channel per frame
    pub frame_size: usize,
    pub bitrate: u32,
    pub payload_type: u8,
    /// Constrained VBR keeps packet sizes predictable on the device link
    pub vbr: bool,
    pub fec: bool,
    pub packet_loss_perc: u8,
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self::voice()
    }
}

impl UplinkConfig {
    /// Voice preset: 48 kHz mono, 20 ms frames, 24 kbps
    pub fn voice() -> Self {
        Self {
            sample_rate: UPLINK_SAMPLE_RATE,
            channels: UPLINK_CHANNELS,
            frame_size: UPLINK_FRAME_SIZE,
            bitrate: UPLINK_BITRATE,
            payload_type: OPUS_PAYLOAD_TYPE,
            vbr: true,
            fec: false,
            packet_loss_perc: 0,
        }
    }

    /// Calculate frame size in samples from duration in milliseconds
    pub fn frame_size_from_ms(sample_rate: u32, ms: f32) -> usize {
        (sample_rate as f32 * ms / 1000.0) as usize
    }

    /// Frame duration in milliseconds
    pub fn frame_duration_ms(&self) -> f32 {
        self.frame_size as f32 * 1000.0 / self.sample_rate as f32
    }

    /// Opus only accepts 2.5, 5, 10, 20, 40 and 60 ms frames
    pub fn is_valid_frame_size(&self) -> bool {
        [2.5f32, 5.0, 10.0, 20.0, 40.0, 60.0]
            .iter()
            .any(|ms| Self::frame_size_from_ms(self.sample_rate, *ms) == self.frame_size)
    }
}

/// A camera reachable through the ffmpeg-backed device API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub battery_level: Option<u8>,
    /// Live feed consumed by ffmpeg (rtsp://, srtp sdp file, ...)
    pub source_url: String,
    /// Where RTP return-audio packets are sent; no address means no speaker
    #[serde(default)]
    pub return_audio_addr: Option<SocketAddr>,
}

impl AppConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Load from an explicit path, else the platform config file, else defaults
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                tracing::info!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// `<config dir>/cam-relay/cam-relay.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "cam-relay")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let relay = &self.relay;
        if relay.readiness_poll_interval_ms == 0 || relay.readiness_max_wait_ms == 0 {
            return Err(ConfigError::Invalid(
                "readiness intervals must be non-zero".to_string(),
            ));
        }
        if relay.readiness_poll_interval_ms > relay.readiness_max_wait_ms {
            return Err(ConfigError::Invalid(format!(
                "poll interval {} ms exceeds max wait {} ms",
                relay.readiness_poll_interval_ms, relay.readiness_max_wait_ms
            )));
        }
        if relay.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("relay.output_dir is empty".to_string()));
        }
        if relay.segment_seconds == 0 || relay.list_size == 0 {
            return Err(ConfigError::Invalid(
                "segment duration and list size must be non-zero".to_string(),
            ));
        }
        let prefix = &self.server.streams_url_prefix;
        if !prefix.starts_with('/') || prefix.len() < 2 || prefix.ends_with('/') {
            return Err(ConfigError::Invalid(format!(
                "streams URL prefix must look like /streams, got {:?}",
                prefix
            )));
        }
        if self.uplink.channels != 1 && self.uplink.channels != 2 {
            return Err(ConfigError::Invalid(format!(
                "unsupported uplink channel count: {}",
                self.uplink.channels
            )));
        }
        if !self.uplink.is_valid_frame_size() {
            return Err(ConfigError::Invalid(format!(
                "uplink frame size {} is not a legal Opus frame at {} Hz",
                self.uplink.frame_size, self.uplink.sample_rate
            )));
        }
        Ok(())
    }
}
