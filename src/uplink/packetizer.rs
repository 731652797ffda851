//! RTP framing for encoded audio
//!
//! Each call consumes the current sequence number and timestamp, then
//! advances them by one packet and one frame respectively. Both counters
//! wrap at their RTP field width.

use bytes::Bytes;
use rtp::header::Header;
use rtp::packet::Packet;

use crate::constants::RTP_VERSION;

/// Stateful RTP packetizer for a single uplink activation
#[derive(Debug)]
pub struct RtpPacketizer {
    payload_type: u8,
    ssrc: u32,
    /// Timestamp increment per packet, in samples
    samples_per_frame: u32,
    sequence: u16,
    timestamp: u32,
    packets: u64,
}

impl RtpPacketizer {
    pub fn new(payload_type: u8, ssrc: u32, samples_per_frame: u32) -> Self {
        Self {
            payload_type,
            ssrc,
            samples_per_frame,
            sequence: 0,
            timestamp: 0,
            packets: 0,
        }
    }

    /// Packetizer with a freshly drawn synchronization source
    pub fn with_random_ssrc(payload_type: u8, samples_per_frame: u32) -> Self {
        Self::new(payload_type, rand::random::<u32>(), samples_per_frame)
    }

    /// Wrap one encoded frame
    pub fn packetize(&mut self, payload: Bytes) -> Packet {
        let header = Header {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            marker: false,
            payload_type: self.payload_type,
            sequence_number: self.sequence,
            timestamp: self.timestamp,
            ssrc: self.ssrc,
            ..Default::default()
        };

        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(self.samples_per_frame);
        self.packets += 1;

        Packet { header, payload }
    }

    /// Sequence number the next packet will carry
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Timestamp the next packet will carry
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    /// Packets produced since this packetizer was created
    pub fn packets(&self) -> u64 {
        self.packets
    }
}
