//! Per-connection RTSP session state and request dispatch.
//!
//! A [`ClientSession`] is created when a TCP connection is accepted and
//! owns that connection for its whole life. It parses each inbound RTSP
//! request, produces exactly one response, and tracks the at-most-one
//! media stream the client sets up. Sessions never remove themselves from
//! the server's table: any terminal condition (TEARDOWN, protocol error,
//! socket error, timeout) marks the session [`SessionState::Inactive`],
//! and the server's sweep loop reaps it.

pub mod media;
pub mod stream;
pub mod transport;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use parking_lot::Mutex;

use crate::events::{EventHub, ServerEvent};
use crate::protocol::{RtspRequest, RtspResponse, SUPPORTED_METHODS};
use crate::server::PortAllocator;
use crate::session::media::{MediaRegistry, ServerMediaSession};
use crate::session::stream::StreamState;
use crate::session::transport::TransportHeader;
use crate::transport::{RECV_BUFFER_SIZE, TcpTransport, Transport};

/// Lifecycle state of a client session.
///
/// `Active` from accept until a terminal condition; `Inactive` sessions
/// are reaped by the sweep loop and never resurrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Inactive,
}

/// Monitoring-facing snapshot of one session, carried by
/// [`ServerEvent`](crate::events::ServerEvent) notifications.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: u32,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Local>,
    pub state: SessionState,
    /// Most recent RTSP method handled on this connection.
    pub method: String,
    /// Stream name requested by the most recent DESCRIBE.
    pub stream_name: String,
}

/// One client's control connection plus its streaming resources.
pub struct ClientSession {
    id: u32,
    peer: SocketAddr,
    connected_at: DateTime<Local>,
    last_activity: Mutex<Instant>,
    state: Mutex<SessionState>,
    last_method: Mutex<String>,
    stream_name: Mutex<String>,
    transport: TcpTransport,
    /// Looked up in the shared registry, not owned.
    media: Mutex<Option<Arc<ServerMediaSession>>>,
    /// Owned: created at SETUP, destroyed at TEARDOWN or session close.
    stream: Mutex<Option<StreamState>>,
    registry: Arc<MediaRegistry>,
    ports: PortAllocator,
    events: EventHub,
}

impl ClientSession {
    pub fn new(
        id: u32,
        transport: TcpTransport,
        registry: Arc<MediaRegistry>,
        ports: PortAllocator,
        events: EventHub,
    ) -> Self {
        let peer = transport.peer_addr();
        ClientSession {
            id,
            peer,
            connected_at: Local::now(),
            last_activity: Mutex::new(Instant::now()),
            state: Mutex::new(SessionState::Active),
            last_method: Mutex::new(String::new()),
            stream_name: Mutex::new(String::new()),
            transport,
            media: Mutex::new(None),
            stream: Mutex::new(None),
            registry,
            ports,
            events,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            peer: self.peer,
            connected_at: self.connected_at,
            state: self.state(),
            method: self.last_method.lock().clone(),
            stream_name: self.stream_name.lock().clone(),
        }
    }

    /// Mark the session inactive if it has been idle longer than `max`.
    /// Returns whether the timeout fired.
    pub fn check_timeout(&self, max: Duration) -> bool {
        if self.last_activity.lock().elapsed() > max {
            *self.state.lock() = SessionState::Inactive;
            true
        } else {
            false
        }
    }

    /// Release the stream (if any) and the control connection. Idempotent;
    /// called by the sweep loop and by server shutdown.
    pub fn close(&self) {
        if let Some(stream) = self.stream.lock().take() {
            match self.media.lock().as_ref() {
                Some(media) => media.delete_stream(&stream),
                None => stream.end_playing(),
            }
        }
        self.transport.close();
    }

    /// Control-channel loop: one receive in flight at a time; each request
    /// is answered before the next receive is armed. Exits when the session
    /// goes inactive or the server stops.
    pub(crate) fn run(&self, running: Arc<AtomicBool>) {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        while running.load(Ordering::SeqCst) && self.state() == SessionState::Active {
            let n = match self.transport.recv(&mut buf) {
                Ok(0) => {
                    tracing::debug!(session_id = self.id, "client closed connection");
                    self.begin_teardown();
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    if self.state() == SessionState::Active {
                        tracing::debug!(session_id = self.id, error = %e, "receive failed");
                    }
                    self.begin_teardown();
                    break;
                }
            };

            *self.last_activity.lock() = Instant::now();

            let text = String::from_utf8_lossy(&buf[..n]).into_owned();
            let response = self.handle_request(&text);

            // Terminal failures still get their response sent; the loop
            // condition then stops us from re-arming the receive.
            if let Err(e) = self.transport.send(response.as_bytes()) {
                tracing::debug!(session_id = self.id, error = %e, "response send failed");
                self.begin_teardown();
                break;
            }
        }

        tracing::debug!(session_id = self.id, "session loop exited");
    }

    fn begin_teardown(&self) {
        *self.state.lock() = SessionState::Inactive;
    }

    /// Parse one request and produce exactly one serialized response.
    fn handle_request(&self, raw: &str) -> String {
        let request = match RtspRequest::parse(raw) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(session_id = self.id, peer = %self.peer, error = %e, "bad request");
                self.begin_teardown();
                return RtspResponse::bad_request()
                    .add_header("Allow", SUPPORTED_METHODS)
                    .serialize();
            }
        };

        let cseq = request.cseq().to_string();
        tracing::debug!(
            session_id = self.id,
            peer = %self.peer,
            method = %request.method,
            uri = %request.uri,
            %cseq,
            "request"
        );

        let response = match request.method.as_str() {
            "OPTIONS" => self.handle_options(&cseq),
            "DESCRIBE" => self.handle_describe(&cseq, &request),
            "SETUP" => self.handle_setup(&cseq, &request),
            "PLAY" => self.handle_play(&cseq, &request),
            "PAUSE" => self.handle_pause(&cseq),
            "TEARDOWN" => self.handle_teardown(&cseq),
            method => {
                tracing::warn!(session_id = self.id, method, "unsupported RTSP method");
                self.begin_teardown();
                RtspResponse::method_not_allowed()
                    .add_header("CSeq", &cseq)
                    .add_header("Allow", SUPPORTED_METHODS)
            }
        };

        *self.last_method.lock() = request.method;
        self.events.emit(ServerEvent::Updated(self.snapshot()));

        response.serialize()
    }

    fn handle_options(&self, cseq: &str) -> RtspResponse {
        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Public", SUPPORTED_METHODS)
    }

    /// The server address the client dialed; lands in SDP `c=` lines and
    /// the `source=` transport parameter.
    fn host_ip(&self) -> IpAddr {
        self.transport
            .local_ip()
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
    }

    fn handle_describe(&self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let name = request.stream_name();
        *self.stream_name.lock() = name.to_string();

        let Some(media) = self.registry.lookup(name) else {
            tracing::warn!(session_id = self.id, name, "DESCRIBE for unknown stream");
            self.begin_teardown();
            return RtspResponse::stream_not_found().add_header("CSeq", cseq);
        };

        let Some(sdp) = media.sdp_description(self.host_ip()) else {
            self.begin_teardown();
            return RtspResponse::stream_not_found().add_header("CSeq", cseq);
        };

        *self.media.lock() = Some(media);

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Content-Base", &request.uri)
            .add_header("Content-Type", "application/sdp")
            .with_body(sdp)
    }

    fn handle_setup(&self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        // SETUP without a prior DESCRIBE resolves the stream here.
        let media = {
            let mut media = self.media.lock();
            if media.is_none() {
                *media = self.registry.lookup(request.stream_name());
            }
            media.clone()
        };
        let Some(media) = media else {
            tracing::warn!(session_id = self.id, name = request.stream_name(), "SETUP for unknown stream");
            self.begin_teardown();
            return RtspResponse::stream_not_found().add_header("CSeq", cseq);
        };

        let header = request.get_header("Transport").unwrap_or("");
        if header.contains("TCP") || header.contains("interleaved=") {
            tracing::warn!(session_id = self.id, header, "interleaved transport requested");
            self.begin_teardown();
            return RtspResponse::unsupported_transport().add_header("CSeq", cseq);
        }
        let Some(params) = TransportHeader::parse(header) else {
            tracing::warn!(session_id = self.id, header, "unusable Transport header");
            self.begin_teardown();
            return RtspResponse::unsupported_transport().add_header("CSeq", cseq);
        };

        let (server_rtp_port, server_rtcp_port) = self.ports.allocate();

        let stream = match media.get_stream_parameters(
            self.peer.ip(),
            params.client_rtp_port,
            params.client_rtcp_port,
            server_rtp_port,
            server_rtcp_port,
        ) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(session_id = self.id, error = %e, "stream setup failed");
                self.begin_teardown();
                return RtspResponse::unsupported_transport().add_header("CSeq", cseq);
            }
        };
        *self.stream.lock() = Some(stream);

        tracing::info!(
            session_id = self.id,
            stream = media.file_name(),
            client_rtp_port = params.client_rtp_port,
            server_rtp_port,
            "stream set up"
        );

        let transport_line = format!(
            "RTP/AVP;unicast;destination={};source={};client_port={}-{};server_port={}-{}",
            self.peer.ip(),
            self.host_ip(),
            params.client_rtp_port,
            params.client_rtcp_port,
            server_rtp_port,
            server_rtcp_port,
        );

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Transport", &transport_line)
            .add_header("Session", &self.id.to_string())
    }

    fn handle_play(&self, cseq: &str, request: &RtspRequest) -> RtspResponse {
        let media = self.media.lock().clone();
        let stream_guard = self.stream.lock();
        let (Some(media), Some(stream)) = (media, stream_guard.as_ref()) else {
            return RtspResponse::method_not_valid().add_header("CSeq", cseq);
        };

        let scale = request.scale();
        let range = request.range();
        let scale_value = scale.unwrap_or(0.0);
        let duration = media.duration();

        let (mut start, mut end) = range.unwrap_or((0.0, 0.0));
        if end <= 0.0 || end > duration {
            end = duration;
        }
        if start < 0.0 {
            start = 0.0;
        } else if end > 0.0 && scale_value > 0.0 && start > end {
            start = end;
        }

        // Scale is parsed and echoed but does not alter delivery.

        if range.is_some() {
            media.seek_stream(stream, start);
        }

        let (seq, rtptime) = media.start_stream(stream);
        tracing::info!(session_id = self.id, start, end, seq, "playing");

        let mut response = RtspResponse::ok().add_header("CSeq", cseq);
        if let Some(scale) = scale {
            response = response.add_header("Scale", &scale.to_string());
        }
        if range.is_some() {
            let value = if start == 0.0 && scale_value >= 0.0 {
                format!("npt={}-", start)
            } else {
                format!("npt={}-{}", start, end)
            };
            response = response.add_header("Range", &value);
        }
        response
            .add_header("Session", &self.id.to_string())
            .add_header(
                "RTP-Info",
                &format!(
                    "url={}/{};seq={};rtptime={}",
                    request.uri,
                    media.track_id(),
                    seq,
                    rtptime
                ),
            )
    }

    fn handle_pause(&self, cseq: &str) -> RtspResponse {
        let media = self.media.lock().clone();
        let stream_guard = self.stream.lock();
        let (Some(media), Some(stream)) = (media, stream_guard.as_ref()) else {
            return RtspResponse::method_not_valid().add_header("CSeq", cseq);
        };

        media.pause_stream(stream);
        tracing::info!(session_id = self.id, "paused");

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .add_header("Session", &self.id.to_string())
    }

    fn handle_teardown(&self, cseq: &str) -> RtspResponse {
        let media = self.media.lock().clone();
        let stream = self.stream.lock().take();
        let (Some(media), Some(stream)) = (media, stream) else {
            return RtspResponse::method_not_valid().add_header("CSeq", cseq);
        };

        media.delete_stream(&stream);
        self.begin_teardown();
        tracing::info!(session_id = self.id, "torn down");

        RtspResponse::ok()
            .add_header("CSeq", cseq)
            .without_terminator()
    }
}
