use std::io::{Read, Write};
use std::net::{IpAddr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::transport::Transport;

/// Receive buffer for one RTSP request/response (requests are small; 4 KiB
/// matches the largest message either peer produces).
pub const RECV_BUFFER_SIZE: usize = 4 * 1024;

/// Non-blocking TCP listener for the RTSP control port.
///
/// The accept loop polls [`poll_accept`](Self::poll_accept) with a short
/// sleep between misses so a stop flag is observed within tens of
/// milliseconds.
pub struct SocketListener {
    inner: TcpListener,
}

impl SocketListener {
    /// Bind the control port on all interfaces. Fails fast on a busy port.
    pub fn bind(port: u16) -> Result<Self> {
        let inner = TcpListener::bind(("0.0.0.0", port))?;
        inner.set_nonblocking(true)?;
        tracing::info!(port, "RTSP listener bound");
        Ok(SocketListener { inner })
    }

    /// Accept one pending connection, or `Ok(None)` when none is waiting.
    ///
    /// The accepted stream is switched back to blocking mode — each client
    /// session owns exactly one in-flight receive at a time.
    pub fn poll_accept(&self) -> Result<Option<(TcpStream, SocketAddr)>> {
        match self.inner.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                Ok(Some((stream, peer)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }
}

/// The RTSP control channel over one accepted (or connected) TCP stream.
pub struct TcpTransport {
    stream: TcpStream,
    peer: SocketAddr,
    closed: AtomicBool,
}

impl TcpTransport {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        TcpTransport {
            stream,
            peer,
            closed: AtomicBool::new(false),
        }
    }

    /// Remote peer address (the client's control endpoint).
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Local address of this connection — the concrete server address the
    /// client dialed, used for SDP `c=` lines and the `source=` transport
    /// parameter.
    pub fn local_ip(&self) -> Option<IpAddr> {
        self.stream.local_addr().ok().map(|a| a.ip())
    }
}

impl Transport for TcpTransport {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        (&self.stream).write_all(buf)?;
        (&self.stream).flush()?;
        Ok(buf.len())
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        Ok((&self.stream).read(buf)?)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            // Unblocks a reader parked in recv(); errors here mean the
            // peer already went away.
            let _ = self.stream.shutdown(Shutdown::Both);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn poll_accept_returns_none_when_idle() {
        let listener = SocketListener::bind(0).unwrap();
        assert!(listener.poll_accept().unwrap().is_none());
    }

    #[test]
    fn send_and_recv_over_loopback() {
        let listener = SocketListener::bind(0).unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).unwrap();
        let (server_stream, peer) = loop {
            if let Some(pair) = listener.poll_accept().unwrap() {
                break pair;
            }
            std::thread::sleep(Duration::from_millis(5));
        };

        let server_side = TcpTransport::new(server_stream, peer);
        server_side.send(b"RTSP/1.0 200 OK\r\n\r\n").unwrap();

        let client_peer = client.peer_addr().unwrap();
        let client_side = TcpTransport::new(client, client_peer);
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let n = client_side.recv(&mut buf).unwrap();
        assert!(std::str::from_utf8(&buf[..n]).unwrap().starts_with("RTSP/1.0 200 OK"));
    }

    #[test]
    fn close_is_idempotent_and_unblocks_recv() {
        let listener = SocketListener::bind(0).unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).unwrap();
        let (server_stream, peer) = loop {
            if let Some(pair) = listener.poll_accept().unwrap() {
                break pair;
            }
            std::thread::sleep(Duration::from_millis(5));
        };
        let transport = TcpTransport::new(server_stream, peer);
        transport.close();
        transport.close();

        let mut buf = [0u8; 8];
        // Read after shutdown: EOF or error, never a hang.
        match transport.recv(&mut buf) {
            Ok(0) | Err(_) => {}
            Ok(n) => panic!("unexpected {n}-byte read after close"),
        }
        drop(client);
    }
}
