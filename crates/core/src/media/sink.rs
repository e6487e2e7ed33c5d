use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::media::{MediaSource, RtpPacket, frame, rtp};
use crate::transport::Transport;

/// Iterations spent in the slow-start phase, sleeping every iteration.
const SLOW_START_ITERATIONS: u32 = 500;

/// Past slow start: number of sends between pacing sleeps.
///
/// Must stay small — UDP has no flow control, and long bursts drive up the
/// receiver's loss rate.
const SENDS_PER_BURST: u32 = 5;

const PACING_SLEEP: Duration = Duration::from_millis(1);

/// Rate-paced RTP sender for one client's stream.
///
/// Pulls frames from the bound [`MediaSource`], wraps them in the
/// positioned-frame record and an RTP header, and pushes them over the UDP
/// transport from a background thread. The loop is driven purely by a
/// boolean flag checked once per iteration, so a stop takes effect within
/// one iteration.
///
/// Pacing is a fixed two-phase ramp, not adaptive: the first
/// [`SLOW_START_ITERATIONS`] iterations sleep every time, after which the
/// loop sleeps once per [`SENDS_PER_BURST`]-packet burst.
///
/// The sequence counter starts at a random value and increments once per
/// sent packet; only its low 16 bits reach the wire. The timestamp field
/// carries the same counter — it tracks packets sent, not media time, and
/// the receiver's file-offset reassembly never reads it.
pub struct RtpSink {
    payload_type: u8,
    ssrc: u32,
    counter: Arc<AtomicU32>,
    playing: Arc<AtomicBool>,
    source: Arc<dyn MediaSource>,
    socket: Arc<dyn Transport>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RtpSink {
    pub fn new(payload_type: u8, source: Arc<dyn MediaSource>, socket: Arc<dyn Transport>) -> Self {
        let ssrc = rtp::generate_ssrc();
        tracing::debug!(
            payload_type,
            ssrc = format_args!("{:#010X}", ssrc),
            "RTP sink created"
        );
        RtpSink {
            payload_type,
            ssrc,
            counter: Arc::new(AtomicU32::new(rtp::generate_initial_sequence())),
            playing: Arc::new(AtomicBool::new(false)),
            source,
            socket,
            worker: Mutex::new(None),
        }
    }

    /// Current sequence number (low 16 bits of the packet counter).
    pub fn sequence(&self) -> u16 {
        self.counter.load(Ordering::SeqCst) as u16
    }

    /// Current RTP timestamp. Tracks the packet counter (see type docs).
    pub fn rtp_time(&self) -> u32 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Launch the sender loop. No-op while already playing.
    pub fn start_playing(&self) {
        if self.playing.swap(true, Ordering::SeqCst) {
            return;
        }

        // A previous pause left the old worker exiting; reap it before
        // spawning the next one.
        if let Some(stale) = self.worker.lock().take() {
            let _ = stale.join();
        }

        let playing = self.playing.clone();
        let counter = self.counter.clone();
        let source = self.source.clone();
        let socket = self.socket.clone();
        let payload_type = self.payload_type;
        let ssrc = self.ssrc;

        let handle = thread::spawn(move || {
            send_loop(&playing, &counter, &*source, &*socket, payload_type, ssrc);
        });
        *self.worker.lock() = Some(handle);

        tracing::debug!(ssrc = format_args!("{:#010X}", self.ssrc), "sink started");
    }

    /// Stop the sender loop without releasing any resources; a later
    /// [`start_playing`](Self::start_playing) resumes from the cursor.
    pub fn stop_playing(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    /// Stop the loop, reap the worker, and close the media source.
    /// Idempotent — every exit path of a stream ends up here.
    pub fn end_playing(&self) {
        self.playing.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
        self.source.close();
    }
}

impl Drop for RtpSink {
    fn drop(&mut self) {
        self.end_playing();
    }
}

fn send_loop(
    playing: &AtomicBool,
    counter: &AtomicU32,
    source: &dyn MediaSource,
    socket: &dyn Transport,
    payload_type: u8,
    ssrc: u32,
) {
    let mut rate_control: u32 = 0;
    let mut send_control: u32 = 0;

    while playing.load(Ordering::SeqCst) {
        // Send slowly at first; UDP gives no feedback, so the ramp-up is
        // the only concession to a receiver that is still settling.
        if rate_control > SLOW_START_ITERATIONS {
            if send_control > SENDS_PER_BURST {
                thread::sleep(PACING_SLEEP);
                send_control = 0;
            }
            send_control += 1;
        } else {
            thread::sleep(PACING_SLEEP);
        }

        // An empty pull (end of file) skips the send and the sequence
        // advance but keeps the loop paced and responsive to stop.
        let Some(media_frame) = source.next_frame() else {
            continue;
        };
        if media_frame.data.is_empty() {
            continue;
        }

        let seq = counter.load(Ordering::SeqCst);
        let packet = RtpPacket {
            marker: false,
            payload_type,
            sequence: seq as u16,
            timestamp: seq,
            ssrc,
            csrc: Vec::new(),
            payload: frame::encode(media_frame.position, &media_frame.data),
        };

        match socket.send(&packet.build()) {
            Ok(_) => {
                counter.fetch_add(1, Ordering::SeqCst);
                if rate_control <= SLOW_START_ITERATIONS {
                    rate_control += 1;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, seq, "RTP send failed");
            }
        }
    }

    tracing::debug!("sender loop exited");
}
