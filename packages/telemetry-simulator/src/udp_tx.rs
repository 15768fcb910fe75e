//! udp_tx.rs — Packet transport
//!
//! The sender task only sees [`PacketSink`]. Two implementations:
//!   - [`MulticastSender`]: one datagram per packet to the configured group
//!     (a unicast address works too, which is handy against a local listener)
//!   - [`MemorySink`]: captures packets on a channel, for tests and dry runs
//!
//! Send errors are returned, never panicked on; the sender decides what to do.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::NetworkConfig;

#[async_trait]
pub trait PacketSink: Send + 'static {
    /// Transmit one packet, returning the number of bytes sent.
    async fn send(&mut self, packet: &[u8]) -> io::Result<usize>;
}

pub struct MulticastSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl MulticastSender {
    /// Bind an ephemeral port on the configured interface (any if unset).
    pub async fn bind(cfg: &NetworkConfig) -> io::Result<Self> {
        let local = SocketAddrV4::new(cfg.interface.unwrap_or(Ipv4Addr::UNSPECIFIED), 0);
        let socket = UdpSocket::bind(local).await?;
        if cfg.group.is_multicast() {
            socket.set_multicast_ttl_v4(cfg.ttl)?;
            socket.set_multicast_loop_v4(cfg.loopback)?;
        }
        let target = SocketAddr::V4(SocketAddrV4::new(cfg.group, cfg.port));
        info!("📡 UDP sender {} → {target} (ttl={})", socket.local_addr()?, cfg.ttl);
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait]
impl PacketSink for MulticastSender {
    async fn send(&mut self, packet: &[u8]) -> io::Result<usize> {
        let sent = self.socket.send_to(packet, self.target).await?;
        debug!("UDP → {} {sent}B", self.target);
        Ok(sent)
    }
}

/// Delivers every packet to an unbounded channel.
pub struct MemorySink {
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl MemorySink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl PacketSink for MemorySink {
    async fn send(&mut self, packet: &[u8]) -> io::Result<usize> {
        self.tx
            .send(packet.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "memory sink receiver dropped"))?;
        Ok(packet.len())
    }
}
