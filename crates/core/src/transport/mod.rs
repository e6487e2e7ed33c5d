//! Socket transports: the TCP control channel and the UDP media path.

pub mod tcp;
pub mod udp;

pub use tcp::{RECV_BUFFER_SIZE, SocketListener, TcpTransport};
pub use udp::UdpTransport;

use crate::error::Result;

/// A bidirectional message transport bound to one peer.
///
/// The same capability set covers both variants: the TCP control channel
/// ([`TcpTransport`]) and the UDP media path ([`UdpTransport`]). Callers
/// that only move bytes — the RTP sender and receiver — take a
/// `dyn Transport` so either can be swapped in.
pub trait Transport: Send + Sync {
    /// Send one message to the peer.
    fn send(&self, buf: &[u8]) -> Result<usize>;

    /// Receive one message into `buf`, returning its length.
    ///
    /// `Ok(0)` on a stream transport means the peer shut the connection
    /// down. Datagram transports block up to their configured read timeout.
    fn recv(&self, buf: &mut [u8]) -> Result<usize>;

    /// Shut the underlying socket down. Idempotent.
    fn close(&self);
}
