use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::media::{MediaSource, RtpSink};
use crate::transport::UdpTransport;

/// The live binding of one client's stream: the paced sender, the shared
/// media source it pulls from, and the RTCP socket pair-half.
///
/// Created at SETUP, destroyed at TEARDOWN or session teardown. The RTCP
/// transport carries no data today; it is bound and held so the advertised
/// `server_port` pair is real.
pub struct StreamState {
    sink: RtpSink,
    source: Arc<dyn MediaSource>,
    _rtcp: Option<Arc<UdpTransport>>,
    playing: AtomicBool,
}

impl StreamState {
    pub fn new(sink: RtpSink, source: Arc<dyn MediaSource>, rtcp: Option<Arc<UdpTransport>>) -> Self {
        StreamState {
            sink,
            source,
            _rtcp: rtcp,
            playing: AtomicBool::new(false),
        }
    }

    pub fn sink(&self) -> &RtpSink {
        &self.sink
    }

    pub fn source(&self) -> &Arc<dyn MediaSource> {
        &self.source
    }

    /// Begin delivery. No-op while already playing.
    pub fn start_playing(&self) {
        if !self.playing.swap(true, Ordering::SeqCst) {
            self.sink.start_playing();
        }
    }

    /// Suspend delivery, keeping the source cursor and sockets for resume.
    pub fn pause_playing(&self) {
        self.sink.stop_playing();
        self.playing.store(false, Ordering::SeqCst);
    }

    /// Stop delivery and release the sink, source, and sockets. Idempotent.
    pub fn end_playing(&self) {
        self.playing.store(false, Ordering::SeqCst);
        self.sink.end_playing();
    }
}
