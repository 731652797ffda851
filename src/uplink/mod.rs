//! Return-audio uplink
//!
//! Browser PCM in, RTP/Opus packets out towards the device.

pub mod packetizer;
pub mod state;

pub use packetizer::RtpPacketizer;
pub use state::{pcm_frame_from_bytes, AudioUplinkState};
