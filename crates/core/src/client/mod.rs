//! Client side: the synchronous RTSP driver and the RTP receive path.

pub mod file_sink;
pub mod media;
pub mod source;

pub use file_sink::FileSink;
pub use media::MediaSession;
pub use source::RtpSource;

use std::io::{Read, Write};
use std::net::{IpAddr, Shutdown, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use rand::RngExt;

use crate::error::{Result, RtspError};

/// User-Agent header sent on every request.
pub const USER_AGENT: &str = "tscast-client/0.1";

/// Blocking response-read timeout; a server silent this long fails the
/// request.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

const RESPONSE_BUFFER_SIZE: usize = 4 * 1024;

/// Default RTSP port when the URL does not name one.
pub const DEFAULT_RTSP_PORT: u16 = 8554;

/// Synchronous RTSP protocol driver over one TCP control connection.
///
/// [`open_stream`](Self::open_stream) runs the whole conversation —
/// OPTIONS → DESCRIBE → SETUP → PLAY — wiring up the UDP receive path and
/// output file along the way. Every request/response is strictly
/// sequential; any step's failure unwinds by closing the stream. The CSeq
/// counter is owned by this instance and is monotonic for the lifetime of
/// the connection.
pub struct RtspClient {
    stream: Option<TcpStream>,
    cseq: AtomicU32,
    media_session: Option<MediaSession>,
    session_id: String,
    request_url: String,
    server_address: String,
    client_rtp_port: u16,
    client_rtcp_port: u16,
    server_rtp_port: u16,
    server_rtcp_port: u16,
    seek_time: f64,
    duration: f64,
}

impl RtspClient {
    pub fn new() -> Self {
        RtspClient {
            stream: None,
            cseq: AtomicU32::new(0),
            media_session: None,
            session_id: String::new(),
            request_url: String::new(),
            server_address: String::new(),
            client_rtp_port: 0,
            client_rtcp_port: 0,
            server_rtp_port: 0,
            server_rtcp_port: 0,
            seek_time: 0.0,
            duration: 0.0,
        }
    }

    /// Duration of the opened stream in seconds (end minus start of the
    /// advertised range).
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Session id the server assigned at SETUP.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Open the control connection. An existing connection is torn down
    /// first.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if self.stream.is_some() {
            self.disconnect();
        }

        let stream = TcpStream::connect((host, port))?;
        stream.set_read_timeout(Some(RESPONSE_TIMEOUT))?;
        tracing::info!(host, port, "connected to server");
        self.stream = Some(stream);
        Ok(())
    }

    /// Close the stream resources and the control connection.
    pub fn disconnect(&mut self) {
        self.close_stream();
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Run the full opening conversation and start receiving into
    /// `output`: OPTIONS → DESCRIBE → (SDP) → output file → SETUP →
    /// receive loop → PLAY. Any failure closes the stream and is returned.
    pub fn open_stream(&mut self, url: &str, output: &Path) -> Result<()> {
        let result = self.open_stream_inner(url, output);
        if let Err(e) = &result {
            tracing::error!(url, error = %e, "open failed");
            self.close_stream();
        }
        result
    }

    fn open_stream_inner(&mut self, url: &str, output: &Path) -> Result<()> {
        if self.stream.is_none() {
            return Err(RtspError::NotConnected);
        }
        self.request_url = url.to_string();
        self.seek_time = 0.0;

        self.send_options()?;

        let sdp = self.send_describe()?;
        let mut media_session = MediaSession::new(sdp);
        media_session.resolve_sdp_description()?;

        self.duration = media_session.play_end_time() - media_session.play_start_time();
        let sink = Arc::new(FileSink::create(output)?);

        self.send_setup()?;

        let server_ip: IpAddr = self
            .server_address
            .parse()
            .map_err(|_| RtspError::UnsupportedTransport(self.server_address.clone()))?;
        media_session.create_rtp_source(
            sink,
            server_ip,
            self.server_rtp_port,
            self.server_rtcp_port,
            self.client_rtp_port,
            self.client_rtcp_port,
        )?;
        if let Some(source) = media_session.source() {
            source.start_receiving();
        }
        self.media_session = Some(media_session);

        self.play_stream()
    }

    /// Issue PLAY for the current position. Used both by
    /// [`open_stream`](Self::open_stream) and by seeks.
    pub fn play_stream(&mut self) -> Result<()> {
        let Some(media_session) = &self.media_session else {
            return Err(RtspError::RequestFailed("PLAY without an open stream".into()));
        };

        if self.duration < 0.0 {
            self.duration = 0.0;
        } else if self.duration == 0.0 || self.duration > media_session.play_end_time() {
            self.duration = media_session.play_end_time() - self.seek_time;
        }

        let start = self.seek_time;
        let end = self.seek_time + self.duration;

        let range_line = if start < 0.0 {
            String::new()
        } else if end < 0.0 {
            format!("Range: npt={}-\r\n", start)
        } else {
            format!("Range: npt={}-{}\r\n", start, end)
        };

        let request = format!(
            "PLAY {} RTSP/1.0\r\nCSeq: {}\r\nSession: {}\r\n{}User-Agent: {}\r\n\r\n",
            self.request_url,
            self.next_cseq(),
            self.session_id,
            range_line,
            USER_AGENT,
        );

        match self.exchange(&request) {
            Ok(_) => Ok(()),
            Err(e) => {
                self.close_stream();
                Err(e)
            }
        }
    }

    /// Re-issue PLAY from `seek_time` seconds without re-running SETUP.
    pub fn seek_stream(&mut self, seek_time: f64) -> Result<()> {
        self.seek_time = seek_time;
        self.play_stream()
    }

    pub fn pause_stream(&mut self) -> Result<()> {
        let request = format!(
            "PAUSE {} RTSP/1.0\r\nCSeq: {}\r\nSession: {}\r\nUser-Agent: {}\r\n\r\n",
            self.request_url,
            self.next_cseq(),
            self.session_id,
            USER_AGENT,
        );

        match self.exchange(&request) {
            Ok(_) => Ok(()),
            Err(e) => {
                self.close_stream();
                Err(e)
            }
        }
    }

    /// Ask the server to release the stream. The local receive path stays
    /// up until [`close_stream`](Self::close_stream) or
    /// [`disconnect`](Self::disconnect).
    pub fn teardown_stream(&mut self) -> Result<()> {
        if self.stream.is_none() {
            self.close_stream();
            return Ok(());
        }

        let request = format!(
            "TEARDOWN {} RTSP/1.0\r\nCSeq: {}\r\nSession: {}\r\nUser-Agent: {}\r\n\r\n",
            self.request_url,
            self.next_cseq(),
            self.session_id,
            USER_AGENT,
        );

        match self.exchange(&request) {
            Ok(_) => Ok(()),
            Err(e) => {
                self.close_stream();
                Err(e)
            }
        }
    }

    /// Stop receiving and close the output file.
    pub fn close_stream(&mut self) {
        if let Some(media_session) = &self.media_session
            && let Some(source) = media_session.source()
        {
            source.stop_receiving();
            source.close_file_sink();
        }
    }

    fn next_cseq(&self) -> u32 {
        self.cseq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn send_options(&mut self) -> Result<()> {
        let request = format!(
            "OPTIONS {} RTSP/1.0\r\nCSeq: {}\r\nUser-Agent: {}\r\n\r\n",
            self.request_url,
            self.next_cseq(),
            USER_AGENT,
        );
        self.exchange(&request).map(|_| ())
    }

    /// DESCRIBE; returns the SDP body sliced out of the response.
    fn send_describe(&mut self) -> Result<String> {
        let request = format!(
            "DESCRIBE {} RTSP/1.0\r\nCSeq: {}\r\nUser-Agent: {}\r\n\r\n",
            self.request_url,
            self.next_cseq(),
            USER_AGENT,
        );
        let response = self.exchange(&request)?;

        match response.find("v=") {
            Some(start) => Ok(response[start..].to_string()),
            None => Err(RtspError::RequestFailed(
                "DESCRIBE response carried no SDP".into(),
            )),
        }
    }

    /// SETUP with a freshly picked client port pair; records the server's
    /// transport parameters and session id.
    fn send_setup(&mut self) -> Result<()> {
        self.client_rtp_port = rand::rng().random_range(8000..9000);
        self.client_rtcp_port = self.client_rtp_port + 1;
        self.session_id.clear();

        let request = format!(
            "SETUP {} RTSP/1.0\r\nCSeq: {}\r\nTransport: client_port={}-{};\r\nSession: {}\r\nUser-Agent: {}\r\n\r\n",
            self.request_url,
            self.next_cseq(),
            self.client_rtp_port,
            self.client_rtcp_port,
            self.session_id,
            USER_AGENT,
        );
        let response = self.exchange(&request)?;

        let transport = parse_server_transport(&response)?;
        self.server_address = transport.source;
        self.server_rtp_port = transport.server_rtp_port;
        self.server_rtcp_port = transport.server_rtcp_port;
        self.session_id = parse_session_header(&response);

        tracing::debug!(
            session_id = %self.session_id,
            server = %self.server_address,
            server_rtp_port = self.server_rtp_port,
            "stream set up"
        );
        Ok(())
    }

    /// One request, one response. Success is a reply that opens with the
    /// RTSP version token and status 200; anything else — including a
    /// receive timeout — fails the exchange.
    fn exchange(&mut self, request: &str) -> Result<String> {
        let stream = self.stream.as_mut().ok_or(RtspError::NotConnected)?;
        stream.write_all(request.as_bytes())?;

        let mut buf = vec![0u8; RESPONSE_BUFFER_SIZE];
        let n = stream.read(&mut buf)?;
        if n == 0 {
            return Err(RtspError::RequestFailed("connection closed by server".into()));
        }

        let response = String::from_utf8_lossy(&buf[..n]).into_owned();
        let status_ok = response.starts_with("RTSP/1.0")
            && response.split_whitespace().nth(1) == Some("200");

        if status_ok {
            Ok(response)
        } else {
            let status_line = response.lines().next().unwrap_or("").to_string();
            Err(RtspError::RequestFailed(status_line))
        }
    }
}

impl Default for RtspClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RtspClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

struct ServerTransport {
    /// `destination=` — this client, per the server.
    #[allow(dead_code)]
    destination: String,
    /// `source=` — the address the server streams from.
    source: String,
    server_rtp_port: u16,
    server_rtcp_port: u16,
}

/// Parse the server's SETUP `Transport` response parameters.
fn parse_server_transport(response: &str) -> Result<ServerTransport> {
    let line = response
        .lines()
        .find_map(|l| l.trim().strip_prefix("Transport:"))
        .map(str::trim)
        .ok_or_else(|| RtspError::UnsupportedTransport("missing Transport header".into()))?;

    let mut destination = None;
    let mut source = None;
    let mut server_ports = None;

    for part in line.split(';') {
        let part = part.trim();
        if let Some(v) = part.strip_prefix("destination=") {
            destination = Some(v.trim().to_string());
        } else if let Some(v) = part.strip_prefix("source=") {
            source = Some(v.trim().to_string());
        } else if let Some(v) = part.strip_prefix("server_port=") {
            let mut ends = v.splitn(2, '-');
            let rtp: u16 = ends
                .next()
                .and_then(|p| p.trim().parse().ok())
                .ok_or_else(|| RtspError::UnsupportedTransport(line.to_string()))?;
            let rtcp: u16 = ends
                .next()
                .and_then(|p| p.trim().parse().ok())
                .unwrap_or(rtp + 1);
            server_ports = Some((rtp, rtcp));
        }
    }

    match (destination, source, server_ports) {
        (Some(destination), Some(source), Some((rtp, rtcp))) => Ok(ServerTransport {
            destination,
            source,
            server_rtp_port: rtp,
            server_rtcp_port: rtcp,
        }),
        _ => Err(RtspError::UnsupportedTransport(line.to_string())),
    }
}

/// `Session:` header value, without any parameter suffix. Empty when the
/// header is absent.
fn parse_session_header(response: &str) -> String {
    response
        .lines()
        .find_map(|l| l.trim().strip_prefix("Session:"))
        .map(|v| v.split(';').next().unwrap_or("").trim().to_string())
        .unwrap_or_default()
}

/// Split an `rtsp://host[:port]/name` URL into its parts.
pub fn parse_request_url(url: &str) -> Result<(String, u16, String)> {
    let invalid = || RtspError::InvalidUrl(url.to_string());

    let rest = url.strip_prefix("rtsp://").ok_or_else(invalid)?;
    let slash = rest.rfind('/').ok_or_else(invalid)?;
    let name = &rest[slash + 1..];
    let host_port = &rest[..slash];
    if name.is_empty() || host_port.is_empty() {
        return Err(invalid());
    }

    let (host, port) = match host_port.split_once(':') {
        Some((host, port)) => (host, port.parse().map_err(|_| invalid())?),
        None => (host_port, DEFAULT_RTSP_PORT),
    };
    if host.is_empty() {
        return Err(invalid());
    }

    Ok((host.to_string(), port, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_with_port() {
        let (host, port, name) = parse_request_url("rtsp://10.0.0.1:9554/movie.ts").unwrap();
        assert_eq!(host, "10.0.0.1");
        assert_eq!(port, 9554);
        assert_eq!(name, "movie.ts");
    }

    #[test]
    fn url_without_port_defaults() {
        let (host, port, name) = parse_request_url("rtsp://media.example/movie.ts").unwrap();
        assert_eq!(host, "media.example");
        assert_eq!(port, DEFAULT_RTSP_PORT);
        assert_eq!(name, "movie.ts");
    }

    #[test]
    fn url_rejects_other_schemes_and_shapes() {
        assert!(parse_request_url("http://h/movie.ts").is_err());
        assert!(parse_request_url("rtsp://hostonly").is_err());
        assert!(parse_request_url("rtsp://h:port/x.ts").is_err());
        assert!(parse_request_url("rtsp://h/").is_err());
    }

    #[test]
    fn parses_server_transport_response() {
        let response = "RTSP/1.0 200 OK\r\n\
                        CSeq: 3\r\n\
                        Transport: RTP/AVP;unicast;destination=10.0.0.2;source=10.0.0.1;client_port=8000-8001;server_port=6000-6001\r\n\
                        Session: 4217\r\n\r\n";
        let t = parse_server_transport(response).unwrap();
        assert_eq!(t.destination, "10.0.0.2");
        assert_eq!(t.source, "10.0.0.1");
        assert_eq!(t.server_rtp_port, 6000);
        assert_eq!(t.server_rtcp_port, 6001);
        assert_eq!(parse_session_header(response), "4217");
    }

    #[test]
    fn transport_without_server_port_is_an_error() {
        let response =
            "RTSP/1.0 200 OK\r\nTransport: RTP/AVP;destination=10.0.0.2;source=10.0.0.1\r\n\r\n";
        assert!(parse_server_transport(response).is_err());
    }

    #[test]
    fn session_header_strips_parameters() {
        let response = "RTSP/1.0 200 OK\r\nSession: 99;timeout=60\r\n\r\n";
        assert_eq!(parse_session_header(response), "99");
    }

    #[test]
    fn missing_session_header_is_empty() {
        assert_eq!(parse_session_header("RTSP/1.0 200 OK\r\n\r\n"), "");
    }

    #[test]
    fn play_without_open_stream_fails() {
        let mut client = RtspClient::new();
        assert!(client.play_stream().is_err());
    }
}
