use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::client::file_sink::FileSink;
use crate::error::Result;
use crate::media::{RtpPacket, frame};
use crate::transport::Transport;

/// Receive timeout so the loop can observe the stop flag between
/// datagrams.
const RECV_TIMEOUT: Duration = Duration::from_millis(200);

/// Datagram buffer; comfortably above the sender's header + frame ceiling.
const RECV_BUFFER_SIZE: usize = 4 * 1024;

/// Client-side RTP receiver: datagrams in, positioned file writes out.
///
/// Each datagram is parsed as an RTP packet whose payload carries one
/// positioned-frame record; the frame bytes are written to the output file
/// at the recovered offset. A malformed datagram is logged and dropped —
/// the loop always re-arms for the next one. No reordering buffer and no
/// loss detection: a missing datagram is a permanent hole in the file.
pub struct RtpSource {
    sink: Arc<FileSink>,
    transport: Arc<dyn Transport>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RtpSource {
    pub fn new(sink: Arc<FileSink>, transport: Arc<dyn Transport>) -> Self {
        RtpSource {
            sink,
            transport,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Launch the receive loop. No-op while already receiving.
    pub fn start_receiving(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let running = self.running.clone();
        let sink = self.sink.clone();
        let transport = self.transport.clone();

        let handle = thread::spawn(move || {
            let mut buf = vec![0u8; RECV_BUFFER_SIZE];
            while running.load(Ordering::SeqCst) {
                match transport.recv(&mut buf) {
                    Ok(0) => continue,
                    Ok(n) => {
                        if let Err(e) = handle_packet(&sink, &buf[..n]) {
                            // One bad datagram must never kill the loop.
                            tracing::warn!(error = %e, len = n, "dropped undecodable datagram");
                        }
                    }
                    Err(e) => {
                        // Expected timeouts while idle; anything else is
                        // logged and the loop keeps re-arming.
                        tracing::trace!(error = %e, "receive idle");
                    }
                }
            }
            tracing::debug!("receive loop exited");
        });
        *self.worker.lock() = Some(handle);
    }

    /// Stop the receive loop. Idempotent.
    pub fn stop_receiving(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }

    /// Close the output file (after the loop has stopped delivering).
    pub fn close_file_sink(&self) {
        self.sink.close();
    }

    /// Suggested receive timeout for the transport backing this source.
    pub fn recv_timeout() -> Duration {
        RECV_TIMEOUT
    }
}

impl Drop for RtpSource {
    fn drop(&mut self) {
        self.stop_receiving();
    }
}

fn handle_packet(sink: &FileSink, datagram: &[u8]) -> Result<()> {
    let packet = RtpPacket::parse(datagram)?;
    let media_frame = frame::decode(&packet.payload)?;
    sink.write_at(media_frame.position, &media_frame.data)
}
