//! Error types for the streaming library.

use std::fmt;

/// Errors that can occur across the streaming stack.
///
/// Variants map to specific failure modes:
///
/// - **Protocol**: [`Parse`](Self::Parse) — malformed RTSP messages, RTP
///   packets, or frame records.
/// - **Transport**: [`Io`](Self::Io) — socket/file failures.
/// - **Negotiation**: [`UnsupportedTransport`](Self::UnsupportedTransport)
///   — unusable `Transport` header parameters.
/// - **Client driver**: [`NotConnected`](Self::NotConnected),
///   [`RequestFailed`](Self::RequestFailed),
///   [`SdpAttributeMissing`](Self::SdpAttributeMissing),
///   [`InvalidUrl`](Self::InvalidUrl).
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse an RTSP message, RTP packet, or frame record.
    #[error("parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// A `Transport` header was missing or unusable.
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// A client operation was attempted before
    /// [`connect`](crate::client::RtspClient::connect).
    #[error("not connected to a server")]
    NotConnected,

    /// A request/response exchange failed: non-200 status, timeout, or a
    /// structurally broken response.
    #[error("RTSP request failed: {0}")]
    RequestFailed(String),

    /// The SDP description from DESCRIBE is missing a required attribute.
    #[error("SDP description missing attribute: {0}")]
    SdpAttributeMissing(&'static str),

    /// A stream URL did not have the `rtsp://host[:port]/name` shape.
    #[error("invalid RTSP URL: {0}")]
    InvalidUrl(String),
}

/// Specific kind of parse failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input was empty (no request line).
    EmptyRequest,
    /// Request had fewer than two lines.
    TruncatedRequest,
    /// Request line did not have at least `Method URI` tokens.
    InvalidRequestLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// An RTP packet was shorter than its declared header.
    PacketTooShort,
    /// A positioned-frame record ended before its declared lengths.
    TruncatedFrame,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRequest => write!(f, "empty request"),
            Self::TruncatedRequest => write!(f, "truncated request"),
            Self::InvalidRequestLine => write!(f, "invalid request line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::PacketTooShort => write!(f, "RTP packet too short"),
            Self::TruncatedFrame => write!(f, "truncated frame record"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
