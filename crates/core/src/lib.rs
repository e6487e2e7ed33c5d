//! RTSP/RTP file streaming: a server that paces media files over UDP and
//! the client that reassembles them.
//!
//! The control plane is RTSP over TCP (OPTIONS, DESCRIBE, SETUP, PLAY,
//! PAUSE, TEARDOWN); the data plane is RTP over UDP carrying a
//! positioned-frame payload, so every datagram knows the file offset its
//! bytes belong to.

pub mod client;
pub mod error;
pub mod events;
pub mod media;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

pub use client::{MediaSession, RtspClient, parse_request_url};
pub use error::{Result, RtspError};
pub use events::ServerEvent;
pub use server::{RtspServer, ServerConfig};
pub use session::{SessionSnapshot, SessionState};
