//! Opus encoder wrapper
//!
//! Encodes fixed-size 16-bit PCM frames for the return-audio uplink.

use bytes::Bytes;
use opus::{Application, Channels, Encoder};

use crate::config::UplinkConfig;
use crate::constants::MAX_OPUS_FRAME_BYTES;
use crate::error::CodecError;

/// Opus encoder wrapper with voice settings
pub struct OpusEncoder {
    encoder: Encoder,
    config: UplinkConfig,
    /// Encoding buffer (reused to avoid allocations)
    encode_buffer: Vec<u8>,
    /// Frame counter for statistics
    frames_encoded: u64,
    /// Total bytes produced
    bytes_produced: u64,
}

impl OpusEncoder {
    /// Create a new Opus encoder with the specified configuration
    pub fn new(config: UplinkConfig) -> Result<Self, CodecError> {
        let channels = match config.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => return Err(CodecError::EncoderInit(
                format!("Unsupported channel count: {}", config.channels)
            )),
        };

        let mut encoder = Encoder::new(config.sample_rate, channels, Application::Voip)
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;

        Self::configure_encoder(&mut encoder, &config)?;

        Ok(Self {
            encoder,
            config,
            encode_buffer: vec![0u8; MAX_OPUS_FRAME_BYTES],
            frames_encoded: 0,
            bytes_produced: 0,
        })
    }

    /// Create encoder with the default voice preset (48 kHz mono, 24 kbps)
    pub fn voice() -> Result<Self, CodecError> {
        Self::new(UplinkConfig::voice())
    }

    fn configure_encoder(encoder: &mut Encoder, config: &UplinkConfig) -> Result<(), CodecError> {
        encoder.set_bitrate(opus::Bitrate::Bits(config.bitrate as i32))
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set bitrate: {}", e)))?;

        encoder.set_vbr(config.vbr)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set VBR: {}", e)))?;

        if config.vbr {
            encoder.set_vbr_constraint(true)
                .map_err(|e| CodecError::EncoderInit(format!("Failed to set CVBR: {}", e)))?;
        }

        encoder.set_inband_fec(config.fec)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set FEC: {}", e)))?;

        if config.fec {
            encoder.set_packet_loss_perc(config.packet_loss_perc as i32)
                .map_err(|e| CodecError::EncoderInit(format!("Failed to set packet loss: {}", e)))?;
        }

        Ok(())
    }

    /// Encode one frame of interleaved i16 samples
    ///
    /// Input length must be exactly `frame_size * channels`.
    pub fn encode(&mut self, samples: &[i16]) -> Result<Bytes, CodecError> {
        if samples.len() != self.samples_per_frame() {
            return Err(CodecError::InvalidFrameSize(samples.len()));
        }

        let size = self.encoder
            .encode(samples, &mut self.encode_buffer)
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

        self.frames_encoded += 1;
        self.bytes_produced += size as u64;

        Ok(Bytes::copy_from_slice(&self.encode_buffer[..size]))
    }

    /// Get current configuration
    pub fn config(&self) -> &UplinkConfig {
        &self.config
    }

    /// Get expected frame size in samples (per channel)
    pub fn frame_size(&self) -> usize {
        self.config.frame_size
    }

    /// Get expected total samples per frame (including all channels)
    pub fn samples_per_frame(&self) -> usize {
        self.config.frame_size * self.config.channels as usize
    }

    /// Get statistics
    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
            average_frame_size: if self.frames_encoded > 0 {
                self.bytes_produced as f32 / self.frames_encoded as f32
            } else {
                0.0
            },
        }
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
    pub average_frame_size: f32,
}
