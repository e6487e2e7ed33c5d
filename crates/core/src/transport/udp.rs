use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::error::Result;
use crate::transport::Transport;

/// UDP transport bound to a local port and aimed at one fixed peer.
///
/// The server binds its allocated RTP/RTCP ports and aims at the client's
/// advertised ports; the client does the mirror image. This layer is
/// deliberately address-only — sessions and streams are resolved by the
/// caller before a packet gets here.
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpTransport {
    /// Bind `0.0.0.0:local_port` and fix `peer` as the send target.
    pub fn bind(local_port: u16, peer: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", local_port))?;
        Ok(UdpTransport { socket, peer })
    }

    /// Bound local port (useful when binding port 0).
    pub fn local_port(&self) -> u16 {
        self.socket.local_addr().map(|a| a.port()).unwrap_or(0)
    }

    /// Set a receive timeout so receive loops can observe stop flags.
    pub fn set_read_timeout(&self, timeout: Duration) -> Result<()> {
        self.socket.set_read_timeout(Some(timeout))?;
        Ok(())
    }
}

impl Transport for UdpTransport {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        Ok(self.socket.send_to(buf, self.peer)?)
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        let (n, _from) = self.socket.recv_from(buf)?;
        Ok(n)
    }

    fn close(&self) {
        // UDP sockets have no shutdown handshake; the descriptor is
        // released on drop.
    }
}
