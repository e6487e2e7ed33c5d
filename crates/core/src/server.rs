use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::Receiver;
use parking_lot::Mutex;
use rand::RngExt;

use crate::error::Result;
use crate::events::{EventHub, ServerEvent};
use crate::session::media::{MediaRegistry, ServerMediaSession};
use crate::session::{ClientSession, SessionState};
use crate::transport::{SocketListener, TcpTransport};

/// Delay between accept polls when no connection is pending.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Interval between timeout-sweep passes.
const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// Server configuration, fixed at construction.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// RTSP control port.
    pub port: u16,
    /// Admission ceiling: connections at or above this count are rejected.
    pub max_connections: usize,
    /// A session idle longer than this is marked inactive by the sweep.
    pub session_timeout: Duration,
    /// Low end of the RTP port range (RTP takes the even port,
    /// RTCP takes RTP + 1).
    pub rtp_port_min: u16,
    /// High end of the RTP port range.
    pub rtp_port_max: u16,
    /// Directory containing the streamable files.
    pub catalog: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 8554,
            max_connections: 100,
            session_timeout: Duration::from_secs(60),
            rtp_port_min: 6000,
            rtp_port_max: 9000,
            catalog: PathBuf::from("."),
        }
    }
}

/// Allocates RTP/RTCP port pairs from a bounded range.
///
/// Steps by two per allocation (RTP even, RTCP = RTP + 1) and wraps back
/// to the minimum once past the maximum. There is no in-use tracking: a
/// wrapped allocation can collide with a still-active earlier one under
/// sustained load. Known limitation; the contract is even-step,
/// range-bound, wrap-to-min.
#[derive(Clone)]
pub struct PortAllocator {
    min: u16,
    max: u16,
    current: Arc<Mutex<u16>>,
}

impl PortAllocator {
    pub fn new(min: u16, max: u16) -> Self {
        PortAllocator {
            min,
            max,
            current: Arc::new(Mutex::new(0)),
        }
    }

    /// Next (RTP, RTCP) pair.
    pub fn allocate(&self) -> (u16, u16) {
        let mut current = self.current.lock();
        *current = current.wrapping_add(2);
        if *current < self.min || *current > self.max {
            *current = self.min;
        }
        (*current, *current + 1)
    }
}

/// The RTSP streaming server.
///
/// Owns the client-session table, the media-session registry, and two
/// background loops: the accept loop (admission control + session
/// creation) and the timeout sweep. Both are cooperative — they check the
/// running flag every iteration — so [`stop`](Self::stop) completes within
/// one poll interval.
pub struct RtspServer {
    config: ServerConfig,
    registry: Arc<MediaRegistry>,
    sessions: Arc<Mutex<HashMap<u32, Arc<ClientSession>>>>,
    ports: PortAllocator,
    next_session_id: Arc<AtomicU32>,
    live_connections: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    events: EventHub,
    local_addr: Option<SocketAddr>,
    workers: Vec<JoinHandle<()>>,
}

impl RtspServer {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(MediaRegistry::new(&config.catalog));
        let ports = PortAllocator::new(config.rtp_port_min, config.rtp_port_max);
        // Random seed so session ids are not guessable across restarts;
        // monotonic from there.
        let seed = rand::rng().random_range(1000..10_000);

        RtspServer {
            config,
            registry,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ports,
            next_session_id: Arc::new(AtomicU32::new(seed)),
            live_connections: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            events: EventHub::new(),
            local_addr: None,
            workers: Vec::new(),
        }
    }

    /// Bind the control port and launch the accept and sweep loops.
    ///
    /// Fails fast when the port cannot be bound. A second call while
    /// running is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let listener = SocketListener::bind(self.config.port)?;
        self.local_addr = Some(listener.local_addr()?);
        self.running.store(true, Ordering::SeqCst);

        {
            let sessions = self.sessions.clone();
            let registry = self.registry.clone();
            let ports = self.ports.clone();
            let next_id = self.next_session_id.clone();
            let live = self.live_connections.clone();
            let running = self.running.clone();
            let events = self.events.clone();
            let max_connections = self.config.max_connections;
            self.workers.push(thread::spawn(move || {
                accept_loop(
                    listener,
                    sessions,
                    registry,
                    ports,
                    next_id,
                    live,
                    running,
                    events,
                    max_connections,
                );
            }));
        }

        {
            let sessions = self.sessions.clone();
            let live = self.live_connections.clone();
            let running = self.running.clone();
            let events = self.events.clone();
            let timeout = self.config.session_timeout;
            self.workers.push(thread::spawn(move || {
                sweep_loop(sessions, live, running, events, timeout);
            }));
        }

        self.events.emit(ServerEvent::Started);
        tracing::info!(port = self.config.port, "RTSP server running");
        Ok(())
    }

    /// Stop both loops, close every client session, and clear both tables.
    /// Blocks until the loops have observed the flag and exited.
    pub fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!("server stopping");

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }

        let sessions: Vec<_> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.close();
        }

        self.registry.clear();
        self.live_connections.store(0, Ordering::SeqCst);
        self.local_addr = None;
        self.events.emit(ServerEvent::Stopped);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bound control address while running (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Live (admitted, unreaped) connection count.
    pub fn live_connections(&self) -> usize {
        self.live_connections.load(Ordering::SeqCst)
    }

    /// Sessions currently registered, including inactive ones awaiting
    /// the next sweep pass.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Attach an observer to server lifecycle events.
    pub fn subscribe(&self) -> Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Resolve a stream name against the catalog and the media-session
    /// table (create-on-demand, evict-on-demand).
    pub fn lookup_server_media_session(&self, stream_name: &str) -> Option<Arc<ServerMediaSession>> {
        self.registry.lookup(stream_name)
    }
}

impl Drop for RtspServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
fn accept_loop(
    listener: SocketListener,
    sessions: Arc<Mutex<HashMap<u32, Arc<ClientSession>>>>,
    registry: Arc<MediaRegistry>,
    ports: PortAllocator,
    next_id: Arc<AtomicU32>,
    live: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    events: EventHub,
    max_connections: usize,
) {
    while running.load(Ordering::SeqCst) {
        match listener.poll_accept() {
            Ok(Some((stream, peer))) => {
                if live.load(Ordering::SeqCst) >= max_connections {
                    tracing::warn!(%peer, max_connections, "connection rejected, server full");
                    drop(stream);
                    events.emit(ServerEvent::Rejected { peer });
                    continue;
                }

                let id = next_id.fetch_add(1, Ordering::SeqCst) + 1;
                let session = Arc::new(ClientSession::new(
                    id,
                    TcpTransport::new(stream, peer),
                    registry.clone(),
                    ports.clone(),
                    events.clone(),
                ));
                sessions.lock().insert(id, session.clone());
                live.fetch_add(1, Ordering::SeqCst);
                events.emit(ServerEvent::Connected(session.snapshot()));
                tracing::info!(session_id = id, %peer, "client connected");

                let session_running = running.clone();
                thread::spawn(move || session.run(session_running));
            }
            Ok(None) => thread::sleep(ACCEPT_POLL_INTERVAL),
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "accept failed");
                }
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
    tracing::debug!("accept loop exited");
}

/// Two-phase reap: a pass closes and removes the sessions it finds already
/// inactive, and only *marks* the ones that crossed the timeout during the
/// same pass — those are removed on the next pass. Each session is visited
/// once per pass, so a session never skips the grace interval.
fn sweep_loop(
    sessions: Arc<Mutex<HashMap<u32, Arc<ClientSession>>>>,
    live: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    events: EventHub,
    timeout: Duration,
) {
    while running.load(Ordering::SeqCst) {
        {
            let mut table = sessions.lock();
            let mut reaped = Vec::new();

            for session in table.values() {
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                if session.state() == SessionState::Inactive {
                    session.close();
                    reaped.push(session.id());
                    decrement_live(&live);
                    events.emit(ServerEvent::Disconnected(session.snapshot()));
                    tracing::info!(session_id = session.id(), "session reaped");
                } else if session.check_timeout(timeout) {
                    decrement_live(&live);
                    events.emit(ServerEvent::Timeout(session.snapshot()));
                    tracing::info!(session_id = session.id(), "session timed out");
                }
            }

            for id in reaped {
                table.remove(&id);
            }
        }

        thread::sleep(SWEEP_INTERVAL);
    }
    tracing::debug!("sweep loop exited");
}

fn decrement_live(live: &AtomicUsize) {
    // Saturating: a timed-out session is decremented both when marked and
    // when reaped, and the counter must never wrap below zero.
    let _ = live.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;

    fn test_config(dir: &tempfile::TempDir) -> ServerConfig {
        ServerConfig {
            port: 0,
            catalog: dir.path().to_path_buf(),
            ..ServerConfig::default()
        }
    }

    fn wait_for<F: FnMut() -> bool>(mut cond: F, what: &str) {
        for _ in 0..100 {
            if cond() {
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }
        panic!("timed out waiting for {what}");
    }

    #[test]
    fn port_allocator_steps_and_wraps() {
        let ports = PortAllocator::new(6000, 6004);
        assert_eq!(ports.allocate(), (6000, 6001));
        assert_eq!(ports.allocate(), (6002, 6003));
        assert_eq!(ports.allocate(), (6004, 6005));
        // (max - min) / 2 + 1 allocations consumed the range; wrap to min.
        assert_eq!(ports.allocate(), (6000, 6001));
    }

    #[test]
    fn start_is_idempotent_and_stop_clears() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = RtspServer::new(test_config(&dir));
        server.start().unwrap();
        server.start().unwrap();
        assert!(server.is_running());

        let addr = server.local_addr().unwrap();
        let _client = TcpStream::connect(addr).unwrap();
        wait_for(|| server.session_count() == 1, "session registration");

        server.stop();
        assert!(!server.is_running());
        assert_eq!(server.session_count(), 0);
        assert_eq!(server.live_connections(), 0);
    }

    #[test]
    fn admission_rejects_over_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.max_connections = 1;
        // Generous timeout so the admitted session stays alive.
        config.session_timeout = Duration::from_secs(600);

        let mut server = RtspServer::new(config);
        let events = server.subscribe();
        server.start().unwrap();
        let addr = server.local_addr().unwrap();

        let _first = TcpStream::connect(addr).unwrap();
        wait_for(|| server.live_connections() == 1, "first connection");

        let _second = TcpStream::connect(addr).unwrap();
        let mut rejected = false;
        for _ in 0..100 {
            match events.recv_timeout(Duration::from_millis(50)) {
                Ok(ServerEvent::Rejected { .. }) => {
                    rejected = true;
                    break;
                }
                Ok(_) => continue,
                Err(_) => continue,
            }
        }
        assert!(rejected, "second connection must be rejected");
        assert!(server.live_connections() <= 1);

        server.stop();
    }

    #[test]
    fn timeout_sweep_reaps_in_two_phases() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(&dir);
        config.session_timeout = Duration::from_millis(50);

        let mut server = RtspServer::new(config);
        let events = server.subscribe();
        server.start().unwrap();
        let addr = server.local_addr().unwrap();

        let _client = TcpStream::connect(addr).unwrap();
        wait_for(|| server.session_count() == 1, "session registration");

        // First interesting pass: timeout fires, session marked but still
        // registered.
        let mut saw_timeout_with_session_present = false;
        loop {
            match events.recv_timeout(Duration::from_secs(2)).unwrap() {
                ServerEvent::Timeout(_) => {
                    saw_timeout_with_session_present = server.session_count() == 1;
                    break;
                }
                _ => continue,
            }
        }
        assert!(
            saw_timeout_with_session_present,
            "timed-out session must survive the pass that marked it"
        );

        // Next pass: reaped.
        loop {
            match events.recv_timeout(Duration::from_secs(2)).unwrap() {
                ServerEvent::Disconnected(_) => break,
                _ => continue,
            }
        }
        wait_for(|| server.session_count() == 0, "session reap");

        server.stop();
    }

    #[test]
    fn bind_failure_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let mut config = test_config(&dir);
        config.port = blocker.local_addr().unwrap().port();

        let mut server = RtspServer::new(config);
        assert!(server.start().is_err());
        assert!(!server.is_running());
    }
}
