//! UDP return-audio sink
//!
//! Sends serialized RTP packets to a device's inbound audio port.

use rtp::packet::Packet;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::UdpSocket;
use webrtc_util::marshal::Marshal;

use crate::error::DeviceError;

/// Socket send buffer size
const SEND_BUFFER_SIZE: usize = 256 * 1024;

/// Create a non-blocking UDP socket connected to `target`
pub fn create_socket(target: SocketAddr) -> std::io::Result<UdpSocket> {
    let domain = if target.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_nonblocking(true)?;
    socket.set_send_buffer_size(SEND_BUFFER_SIZE)?;

    let bind_addr: SocketAddr = if target.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    };
    socket.bind(&bind_addr.into())?;
    socket.connect(&target.into())?;

    UdpSocket::from_std(socket.into())
}

/// Return-audio channel of one live call
pub struct ReturnAudioSink {
    socket: UdpSocket,
    target: SocketAddr,
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl ReturnAudioSink {
    pub fn connect(target: SocketAddr) -> Result<Self, DeviceError> {
        let socket = create_socket(target)
            .map_err(|e| DeviceError::SpeakerUnavailable(format!("{}: {}", target, e)))?;

        Ok(Self {
            socket,
            target,
            packets_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        })
    }

    pub async fn send(&self, packet: &Packet) -> Result<(), DeviceError> {
        let wire = packet
            .marshal()
            .map_err(|e| DeviceError::SendFailed(e.to_string()))?;

        let sent = self.socket
            .send(&wire)
            .await
            .map_err(|e| DeviceError::SendFailed(e.to_string()))?;

        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
        Ok(())
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}
