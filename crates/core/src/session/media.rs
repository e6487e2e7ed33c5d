use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;

use crate::error::Result;
use crate::media::{MediaSource, PAYLOAD_TYPE_MP2T, RtpSink, TsFileSource};
use crate::protocol::sdp;
use crate::session::stream::StreamState;
use crate::transport::UdpTransport;

/// One streamable catalog file, shared by every client requesting its name.
///
/// Created on the first DESCRIBE/SETUP for a name whose backing file
/// exists; evicted from the [`MediaRegistry`] when the file disappears.
/// Effectively immutable after the SDP text is memoized — per-client state
/// lives in [`StreamState`], which this type manufactures.
pub struct ServerMediaSession {
    file_name: String,
    catalog: PathBuf,
    created_at: DateTime<Local>,
    track_number: u32,
    sdp: Mutex<Option<String>>,
    duration: Mutex<f64>,
    file_size: Mutex<u64>,
}

impl ServerMediaSession {
    pub fn new(file_name: &str, catalog: &Path) -> Self {
        ServerMediaSession {
            file_name: file_name.to_string(),
            catalog: catalog.to_path_buf(),
            created_at: Local::now(),
            track_number: 1,
            sdp: Mutex::new(None),
            duration: Mutex::new(0.0),
            file_size: Mutex::new(0),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Control id of the single track (`track1`).
    pub fn track_id(&self) -> String {
        format!("track{}", self.track_number)
    }

    /// Playable duration in seconds; 0.0 until the first source probe.
    pub fn duration(&self) -> f64 {
        *self.duration.lock()
    }

    pub fn file_size(&self) -> u64 {
        *self.file_size.lock()
    }

    fn file_path(&self) -> PathBuf {
        self.catalog.join(&self.file_name)
    }

    /// Open a fresh media source over the backing file, refreshing the
    /// cached duration/size metadata.
    pub fn create_source(&self) -> Result<Arc<dyn MediaSource>> {
        let source = TsFileSource::open(&self.file_path())?;
        *self.duration.lock() = source.duration();
        *self.file_size.lock() = source.file_size();
        Ok(Arc::new(source))
    }

    /// The SDP description, built once and memoized.
    ///
    /// `None` when the backing file cannot be probed (vanished between
    /// lookup and describe).
    pub fn sdp_description(&self, host_ip: IpAddr) -> Option<String> {
        let mut sdp = self.sdp.lock();
        if sdp.is_none() {
            if let Err(e) = self.create_source() {
                tracing::error!(file = %self.file_name, error = %e, "SDP probe failed");
                return None;
            }
            let session_id = self.created_at.timestamp().to_string();
            *sdp = Some(sdp::generate_sdp(
                &self.file_name,
                &host_ip.to_string(),
                &session_id,
                PAYLOAD_TYPE_MP2T,
                *self.duration.lock(),
                *self.file_size.lock(),
                &self.track_id(),
            ));
        }
        sdp.clone()
    }

    /// Build the per-client stream resources: a fresh source, the server's
    /// RTP/RTCP sockets aimed at the client's advertised ports, and the
    /// paced sink.
    ///
    /// An RTCP bind failure is tolerated (the channel carries no data);
    /// an RTP bind failure fails the SETUP.
    pub fn get_stream_parameters(
        &self,
        client_ip: IpAddr,
        client_rtp_port: u16,
        client_rtcp_port: u16,
        server_rtp_port: u16,
        server_rtcp_port: u16,
    ) -> Result<StreamState> {
        let source = self.create_source()?;

        let rtp = UdpTransport::bind(
            server_rtp_port,
            SocketAddr::new(client_ip, client_rtp_port),
        )?;
        let rtcp = UdpTransport::bind(
            server_rtcp_port,
            SocketAddr::new(client_ip, client_rtcp_port),
        )
        .map(Arc::new)
        .map_err(|e| tracing::warn!(server_rtcp_port, error = %e, "RTCP bind failed"))
        .ok();

        let sink = RtpSink::new(PAYLOAD_TYPE_MP2T, source.clone(), Arc::new(rtp));
        Ok(StreamState::new(sink, source, rtcp))
    }

    /// Start delivery, returning (sequence, rtptime) for the `RTP-Info`
    /// response header.
    pub fn start_stream(&self, stream: &StreamState) -> (u16, u32) {
        stream.start_playing();
        let rtp_time = stream.sink().rtp_time();
        (rtp_time as u16, rtp_time)
    }

    pub fn pause_stream(&self, stream: &StreamState) {
        stream.pause_playing();
    }

    pub fn seek_stream(&self, stream: &StreamState, npt: f64) {
        stream.source().seek_to_npt(npt);
    }

    pub fn delete_stream(&self, stream: &StreamState) {
        stream.end_playing();
    }
}

/// Shared table of media sessions, keyed by stream (file) name.
pub struct MediaRegistry {
    catalog: PathBuf,
    table: Mutex<HashMap<String, Arc<ServerMediaSession>>>,
}

impl MediaRegistry {
    pub fn new(catalog: &Path) -> Self {
        MediaRegistry {
            catalog: catalog.to_path_buf(),
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Reconcile "does the file exist" with "do we have a session object".
    ///
    /// | file | session | outcome            |
    /// |------|---------|--------------------|
    /// | yes  | yes     | reuse              |
    /// | yes  | no      | create + register  |
    /// | no   | yes     | evict, miss        |
    /// | no   | no      | miss               |
    pub fn lookup(&self, stream_name: &str) -> Option<Arc<ServerMediaSession>> {
        if stream_name.is_empty()
            || stream_name.contains('/')
            || stream_name.contains('\\')
            || stream_name.contains("..")
        {
            tracing::warn!(stream_name, "rejected suspicious stream name");
            return None;
        }

        let file_exists = self.catalog.join(stream_name).is_file();
        let mut table = self.table.lock();

        match (file_exists, table.get(stream_name).cloned()) {
            (true, Some(session)) => Some(session),
            (true, None) => {
                let session = Arc::new(ServerMediaSession::new(stream_name, &self.catalog));
                table.insert(stream_name.to_string(), session.clone());
                tracing::info!(stream_name, "media session created");
                Some(session)
            }
            (false, Some(_)) => {
                table.remove(stream_name);
                tracing::info!(stream_name, "media session evicted, backing file gone");
                None
            }
            (false, None) => None,
        }
    }

    /// Drop every registered media session (server shutdown).
    pub fn clear(&self) {
        self.table.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn catalog_with(name: &str, bytes: usize) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(name), vec![0u8; bytes]).unwrap();
        dir
    }

    #[test]
    fn lookup_creates_then_reuses() {
        let dir = catalog_with("movie.ts", 512);
        let registry = MediaRegistry::new(dir.path());

        let first = registry.lookup("movie.ts").unwrap();
        let second = registry.lookup("movie.ts").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn lookup_misses_unknown_name() {
        let dir = catalog_with("movie.ts", 512);
        let registry = MediaRegistry::new(dir.path());
        assert!(registry.lookup("other.ts").is_none());
    }

    #[test]
    fn lookup_evicts_when_file_disappears() {
        let dir = catalog_with("movie.ts", 512);
        let registry = MediaRegistry::new(dir.path());

        registry.lookup("movie.ts").unwrap();
        std::fs::remove_file(dir.path().join("movie.ts")).unwrap();

        assert!(registry.lookup("movie.ts").is_none());
        // Evicted for good, not just hidden.
        assert!(registry.table.lock().is_empty());
    }

    #[test]
    fn lookup_rejects_path_traversal() {
        let dir = catalog_with("movie.ts", 512);
        let registry = MediaRegistry::new(dir.path());
        assert!(registry.lookup("../movie.ts").is_none());
        assert!(registry.lookup("a/b.ts").is_none());
        assert!(registry.lookup("").is_none());
    }

    #[test]
    fn sdp_is_memoized() {
        let dir = catalog_with("movie.ts", 2048);
        let session = ServerMediaSession::new("movie.ts", dir.path());
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);

        let first = session.sdp_description(ip).unwrap();
        assert!(first.contains("i=movie.ts\r\n"));
        assert!(first.contains("a=size:fs=2048\r\n"));
        assert!(first.contains("a=control:track1\r\n"));

        let second = session.sdp_description(ip).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn sdp_fails_when_file_vanishes_before_probe() {
        let dir = catalog_with("movie.ts", 64);
        let session = ServerMediaSession::new("movie.ts", dir.path());
        std::fs::remove_file(dir.path().join("movie.ts")).unwrap();
        assert!(session.sdp_description(IpAddr::V4(Ipv4Addr::LOCALHOST)).is_none());
    }

    #[test]
    fn stream_parameters_bind_server_ports() {
        let dir = catalog_with("movie.ts", 256);
        let session = ServerMediaSession::new("movie.ts", dir.path());

        let stream = session
            .get_stream_parameters(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000, 40001, 0, 0)
            .unwrap();
        let (seq, rtptime) = session.start_stream(&stream);
        assert_eq!(seq, rtptime as u16);
        session.delete_stream(&stream);
        session.delete_stream(&stream);
    }
}
