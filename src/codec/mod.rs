//! Opus codec wrapper
//!
//! Voice-tuned Opus encoding for the return-audio uplink.

pub mod encoder;

pub use encoder::{EncoderStats, OpusEncoder};
