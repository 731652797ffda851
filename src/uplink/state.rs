//! Per-activation uplink pipeline
//!
//! An [`AudioUplinkState`] is created when the device speaker is activated
//! and dropped on deactivation or relay teardown. Its RTP counters never
//! outlive it, so every activation starts from sequence 0 / timestamp 0
//! with a new SSRC.

use rtp::packet::Packet;

use crate::codec::OpusEncoder;
use crate::config::UplinkConfig;
use crate::error::CodecError;
use crate::uplink::RtpPacketizer;

/// Encoder + packetizer owned by one uplink activation
pub struct AudioUplinkState {
    encoder: OpusEncoder,
    packetizer: RtpPacketizer,
    speaker_active: bool,
    /// Reused conversion buffer
    pcm: Vec<i16>,
}

impl AudioUplinkState {
    /// Fresh encoder, counters at zero, random SSRC
    pub fn new(config: UplinkConfig) -> Result<Self, CodecError> {
        let samples_per_frame = config.frame_size as u32;
        let payload_type = config.payload_type;
        let encoder = OpusEncoder::new(config)?;
        let pcm = Vec::with_capacity(encoder.samples_per_frame());

        Ok(Self {
            encoder,
            packetizer: RtpPacketizer::with_random_ssrc(payload_type, samples_per_frame),
            speaker_active: true,
            pcm,
        })
    }

    /// Encode one PCM buffer (little-endian i16) into an RTP packet
    ///
    /// The packetizer only advances when encoding succeeds.
    pub fn encode_frame(&mut self, data: &[u8]) -> Result<Packet, CodecError> {
        if data.len() < 2 {
            return Err(CodecError::InvalidFrameSize(0));
        }

        pcm_frame_from_bytes(data, self.encoder.samples_per_frame(), &mut self.pcm);
        let payload = self.encoder.encode(&self.pcm)?;
        Ok(self.packetizer.packetize(payload))
    }

    pub fn speaker_active(&self) -> bool {
        self.speaker_active
    }

    pub fn packetizer(&self) -> &RtpPacketizer {
        &self.packetizer
    }

    pub fn frames_encoded(&self) -> u64 {
        self.encoder.stats().frames_encoded
    }
}

/// Decode little-endian i16 PCM into exactly `frame_len` samples
///
/// Short input is zero-padded, long input truncated; an odd trailing byte
/// is ignored.
pub fn pcm_frame_from_bytes(data: &[u8], frame_len: usize, out: &mut Vec<i16>) {
    out.clear();
    out.extend(
        data.chunks_exact(2)
            .take(frame_len)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
    );
    out.resize(frame_len, 0);
}
