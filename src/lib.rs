//! # Cam Relay
//!
//! Live camera relay with a two-way audio path.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                               BROWSER                                    │
//! │   <video> (HLS playlist)                     Microphone (PCM i16 48kHz)  │
//! └────────▲────────────────────────────────────────────────┬────────────────┘
//!          │ GET /streams/stream_<id>.m3u8                   │ WebSocket /ws
//!          │                                                 ▼
//! ┌────────┴─────────────────────────────────────────────────────────────────┐
//! │                          RELAY SERVER                                    │
//! │  ┌────────────────────────────────────────────────────────────────────┐ │
//! │  │            Session Manager (session::manager) - per connection      │ │
//! │  │   start-stream / stop-stream / activate-mic / audio-data / ...      │ │
//! │  └───────────────┬──────────────────────────────────┬─────────────────┘ │
//! │                  ▼                                  ▼                   │
//! │  ┌───────────────────────────────┐  ┌──────────────────────────────────┐ │
//! │  │ Relay Controller              │  │ Audio Uplink (uplink)            │ │
//! │  │ (relay::controller)           │  │  ┌─────────┐    ┌─────────────┐  │ │
//! │  │  Idle→Starting→Active→Stopping│  │  │  Opus   │───▶│ RTP         │  │ │
//! │  │  readiness probe (relay::probe│  │  │ Encoder │    │ Packetizer  │  │ │
//! │  └──────────────┬────────────────┘  │  └─────────┘    └──────┬──────┘  │ │
//! │                 │                   └────────────────────────┼─────────┘ │
//! │                 ▼                                            │           │
//! │  ┌──────────────────────────────────────────────────────────┼─────────┐ │
//! │  │             Device API (device) - live call               │         │ │
//! │  │   ffmpeg: -c:v copy, aac, -f hls (1s x 2, delete+append)  ▼         │ │
//! │  │                                           UDP return-audio socket  │ │
//! │  └────────────────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────────────┘
//!                                   │ RTP/Opus (PT 111)
//!                                   ▼
//!                             CAMERA / DOORBELL
//! ```

pub mod codec;
pub mod config;
pub mod device;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod session;
pub mod uplink;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Opus sample rate for the return-audio uplink
    pub const UPLINK_SAMPLE_RATE: u32 = 48_000;

    /// Uplink channel count (mono)
    pub const UPLINK_CHANNELS: u16 = 1;

    /// Samples per uplink frame (20 ms at 48 kHz)
    pub const UPLINK_FRAME_SIZE: usize = 960;

    /// Uplink Opus bitrate in bits per second
    pub const UPLINK_BITRATE: u32 = 24_000;

    /// RTP payload type announced for Opus
    pub const OPUS_PAYLOAD_TYPE: u8 = 111;

    /// RTP protocol version
    pub const RTP_VERSION: u8 = 2;

    /// Longest the relay may take to produce its first playlist
    pub const DEFAULT_READINESS_MAX_WAIT_MS: u64 = 10_000;

    /// Interval between readiness polls
    pub const DEFAULT_READINESS_POLL_INTERVAL_MS: u64 = 500;

    /// A playlist at or below this size is treated as not yet written
    pub const MIN_PLAYLIST_BYTES: u64 = 50;

    /// HLS segment duration in seconds
    pub const HLS_SEGMENT_SECONDS: u32 = 1;

    /// Segments kept in the rolling playlist window
    pub const HLS_LIST_SIZE: u32 = 2;

    /// Default HTTP/WebSocket port
    pub const DEFAULT_HTTP_PORT: u16 = 3000;

    /// Dropped-frame warnings are logged once per this many drops
    pub const DROP_LOG_INTERVAL: u64 = 100;

    /// Maximum encoded Opus frame (bytes)
    pub const MAX_OPUS_FRAME_BYTES: usize = 4000;
}
