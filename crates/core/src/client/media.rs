use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::client::file_sink::FileSink;
use crate::client::source::RtpSource;
use crate::error::{Result, RtspError};
use crate::transport::UdpTransport;

/// Client-side view of one media session, resolved from the SDP body a
/// DESCRIBE response carried.
///
/// Extracts the playback range (`a=range:npt=`), the backing file size
/// (`a=size:fs=`), and the track control id (`a=control:`), then acts as
/// the factory for the client's RTP receive path.
pub struct MediaSession {
    sdp: String,
    play_start_time: f64,
    play_end_time: f64,
    file_size: u64,
    track_id: String,
    source: Option<Arc<RtpSource>>,
    _rtcp: Option<Arc<UdpTransport>>,
}

impl MediaSession {
    pub fn new(sdp: String) -> Self {
        MediaSession {
            sdp,
            play_start_time: 0.0,
            play_end_time: 0.0,
            file_size: 0,
            track_id: String::new(),
            source: None,
            _rtcp: None,
        }
    }

    pub fn play_start_time(&self) -> f64 {
        self.play_start_time
    }

    pub fn play_end_time(&self) -> f64 {
        self.play_end_time
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn track_id(&self) -> &str {
        &self.track_id
    }

    pub fn source(&self) -> Option<&Arc<RtpSource>> {
        self.source.as_ref()
    }

    /// Parse the SDP attributes this client depends on.
    ///
    /// The range may be open-ended (`npt=5-`): the missing endpoint
    /// resolves to 0.0 rather than failing. A missing attribute line is an
    /// error — the server always emits all three.
    pub fn resolve_sdp_description(&mut self) -> Result<()> {
        let range = self
            .attribute_value("a=range:npt=")
            .ok_or(RtspError::SdpAttributeMissing("a=range"))?;
        let mut ends = range.splitn(2, '-');
        let start_time = ends
            .next()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0.0);
        let end_time = ends
            .next()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0.0);
        self.play_start_time = start_time;
        self.play_end_time = end_time;

        let size = self
            .attribute_value("a=size:fs=")
            .ok_or(RtspError::SdpAttributeMissing("a=size"))?;
        self.file_size = size.trim().parse().unwrap_or(0);

        let control = self
            .attribute_value("a=control:")
            .ok_or(RtspError::SdpAttributeMissing("a=control"))?;
        self.track_id = control.trim().to_string();

        tracing::debug!(
            start = self.play_start_time,
            end = self.play_end_time,
            file_size = self.file_size,
            track = %self.track_id,
            "SDP resolved"
        );
        Ok(())
    }

    fn attribute_value(&self, prefix: &str) -> Option<&str> {
        self.sdp
            .lines()
            .find_map(|line| line.trim().strip_prefix(prefix))
    }

    /// Bind the client's RTP/RTCP ports, aim them at the server's, and
    /// build the receive path over the given output sink.
    ///
    /// Like the server's mirror image, an RTCP bind failure is tolerated.
    pub fn create_rtp_source(
        &mut self,
        sink: Arc<FileSink>,
        server_ip: IpAddr,
        server_rtp_port: u16,
        server_rtcp_port: u16,
        client_rtp_port: u16,
        client_rtcp_port: u16,
    ) -> Result<()> {
        let rtp = UdpTransport::bind(
            client_rtp_port,
            SocketAddr::new(server_ip, server_rtp_port),
        )?;
        rtp.set_read_timeout(RtpSource::recv_timeout())?;

        self._rtcp = UdpTransport::bind(
            client_rtcp_port,
            SocketAddr::new(server_ip, server_rtcp_port),
        )
        .map(Arc::new)
        .map_err(|e| tracing::warn!(client_rtcp_port, error = %e, "RTCP bind failed"))
        .ok();

        self.source = Some(Arc::new(RtpSource::new(sink, Arc::new(rtp))));
        Ok(())
    }
}
