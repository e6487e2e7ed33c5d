//! RTSP wire protocol: request parsing, response building, SDP generation.

pub mod request;
pub mod response;
pub mod sdp;

pub use request::RtspRequest;
pub use response::RtspResponse;

/// The six methods this server implements, in the order advertised
/// by the OPTIONS `Public` header.
pub const SUPPORTED_METHODS: &str = "OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN";
