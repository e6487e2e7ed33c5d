//! Media plane: frame sources, RTP packetization, and the paced sender.

pub mod frame;
pub mod rtp;
pub mod sink;
pub mod ts_file;

pub use rtp::RtpPacket;
pub use sink::RtpSink;
pub use ts_file::TsFileSource;

/// RTP payload type for MPEG-2 transport streams (RFC 2250 §2).
pub const PAYLOAD_TYPE_MP2T: u8 = 33;

/// Bytes read from the source per frame.
pub const PREFERRED_FRAME_SIZE: usize = 1024;

/// Hard ceiling on a single frame, keeping the RTP datagram under
/// a typical ethernet MTU after framing overhead.
pub const MAX_FRAME_SIZE: usize = 1360;

/// One frame pulled from a [`MediaSource`]: raw bytes plus the byte offset
/// they occupy in the backing file. The receiver writes the bytes back at
/// exactly this offset, so datagram loss or reordering never corrupts
/// neighbouring data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Byte offset of `data` within the file.
    pub position: u64,
    /// Frame payload; at most [`MAX_FRAME_SIZE`] bytes.
    pub data: Vec<u8>,
}

/// A seekable frame producer backing one client's stream.
///
/// Implementations use interior mutability: the cursor is shared between
/// the control channel (seeks during PLAY) and the sender loop (reads),
/// which run on different threads.
///
/// Today the only backend is [`TsFileSource`]; the trait is the seam where
/// other container formats would plug in.
pub trait MediaSource: Send + Sync {
    /// Reposition the cursor to the byte offset matching `npt` seconds.
    ///
    /// A no-op when the duration is unknown (there is no time-to-byte
    /// mapping to apply).
    fn seek_to_npt(&self, npt: f64);

    /// Read the next frame at the cursor, advancing it. `None` at end of
    /// file or after [`close`](Self::close).
    fn next_frame(&self) -> Option<Frame>;

    /// Release the backing file handle. Idempotent.
    fn close(&self);

    /// Playable duration in seconds; 0.0 when unknown.
    fn duration(&self) -> f64;

    /// Size of the backing file in bytes.
    fn file_size(&self) -> u64;
}
