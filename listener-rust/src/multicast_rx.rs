//! # multicast_rx
//!
//! Receive side of the telemetry stream. Binds `0.0.0.0:port` and joins the
//! multicast group on the requested interface (any when unset). A unicast
//! "group" skips the join, so the listener also works against a sender aimed
//! at a local address.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use tokio::net::UdpSocket;
use tracing::info;

/// Larger than any packet the simulator emits.
const MAX_DATAGRAM: usize = 65_536;

pub struct MulticastReceiver {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl MulticastReceiver {
    pub async fn bind(group: Ipv4Addr, port: u16, interface: Option<Ipv4Addr>) -> io::Result<Self> {
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        let socket = UdpSocket::bind(addr).await?;
        if group.is_multicast() {
            socket.join_multicast_v4(group, interface.unwrap_or(Ipv4Addr::UNSPECIFIED))?;
            info!("📡 Joined {group} on UDP {addr}");
        } else {
            info!("📡 Listening on UDP {addr}");
        }
        Ok(Self {
            socket,
            buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Next datagram and its source.
    pub async fn recv(&mut self) -> io::Result<(Vec<u8>, SocketAddr)> {
        let (len, src) = self.socket.recv_from(&mut self.buf).await?;
        Ok((self.buf[..len].to_vec(), src))
    }
}
