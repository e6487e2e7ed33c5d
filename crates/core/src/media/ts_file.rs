//! MPEG-2 transport stream file source.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use parking_lot::Mutex;

use crate::error::Result;
use crate::media::{Frame, MAX_FRAME_SIZE, MediaSource, PREFERRED_FRAME_SIZE};

/// MPEG-TS packet size (ISO 13818-1 §2.4.3.2).
const TS_PACKET_LEN: u64 = 188;
const TS_SYNC_BYTE: u8 = 0x47;

/// PCR clock rate: the 33-bit PCR base ticks at 90 kHz.
const PCR_CLOCK_HZ: f64 = 90_000.0;

/// Cap on how many packets the duration probe inspects at each end of the
/// file, so opening a large file stays cheap.
const PROBE_PACKET_LIMIT: u64 = 4096;

/// A file-backed [`MediaSource`] for MPEG-2 transport streams.
///
/// Owns the open file handle. The cursor advances monotonically with each
/// [`next_frame`](MediaSource::next_frame) except on an explicit seek.
/// Duration is probed once at open time from the first and last PCR-bearing
/// packets; files without a PCR report 0.0 (unknown).
pub struct TsFileSource {
    file: Mutex<Option<File>>,
    file_size: u64,
    duration: f64,
}

impl TsFileSource {
    /// Open a transport stream file and probe its metadata.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let duration = probe_duration(&mut file, file_size).unwrap_or(0.0);
        file.seek(SeekFrom::Start(0))?;

        tracing::debug!(
            path = %path.display(),
            file_size,
            duration,
            "opened transport stream source"
        );

        Ok(TsFileSource {
            file: Mutex::new(Some(file)),
            file_size,
            duration,
        })
    }
}

impl MediaSource for TsFileSource {
    fn seek_to_npt(&self, npt: f64) {
        if self.duration <= 0.0 {
            return;
        }

        let offset = ((npt / self.duration) * self.file_size as f64) as u64;
        let offset = offset.min(self.file_size);

        let mut guard = self.file.lock();
        if let Some(file) = guard.as_mut() {
            if let Err(e) = file.seek(SeekFrom::Start(offset)) {
                tracing::error!(error = %e, npt, offset, "seek failed");
            } else {
                tracing::debug!(npt, offset, "seeked within file");
            }
        }
    }

    fn next_frame(&self) -> Option<Frame> {
        let mut guard = self.file.lock();
        let file = guard.as_mut()?;

        let position = match file.stream_position() {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(error = %e, "could not read cursor position");
                return None;
            }
        };

        let mut data = vec![0u8; PREFERRED_FRAME_SIZE.min(MAX_FRAME_SIZE)];
        match file.read(&mut data) {
            Ok(0) => None,
            Ok(n) => {
                data.truncate(n);
                Some(Frame { position, data })
            }
            Err(e) => {
                tracing::error!(error = %e, position, "frame read failed");
                None
            }
        }
    }

    fn close(&self) {
        if self.file.lock().take().is_some() {
            tracing::debug!("media source closed");
        }
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn file_size(&self) -> u64 {
        self.file_size
    }
}

/// Extract the PCR base from a TS packet, if it carries one.
fn packet_pcr(packet: &[u8]) -> Option<u64> {
    if packet.len() < 12 || packet[0] != TS_SYNC_BYTE {
        return None;
    }
    // adaptation_field_control bit + field long enough + PCR flag set
    if packet[3] & 0x20 == 0 || packet[4] < 7 || packet[5] & 0x10 == 0 {
        return None;
    }

    let base = (packet[6] as u64) << 25
        | (packet[7] as u64) << 17
        | (packet[8] as u64) << 9
        | (packet[9] as u64) << 1
        | (packet[10] as u64) >> 7;
    Some(base)
}

/// Duration in seconds from the delta between the first and last PCR.
///
/// Scans up to [`PROBE_PACKET_LIMIT`] packets from each end. Returns `None`
/// when no two distinct PCRs are found (unaligned file, no adaptation
/// fields, or single-PCR stream). PCR wraparound (~26.5 h) is not handled.
fn probe_duration(file: &mut File, file_size: u64) -> Option<f64> {
    let packet_count = file_size / TS_PACKET_LEN;
    if packet_count < 2 {
        return None;
    }

    let mut packet = [0u8; TS_PACKET_LEN as usize];

    let mut first_pcr = None;
    for index in 0..packet_count.min(PROBE_PACKET_LIMIT) {
        file.seek(SeekFrom::Start(index * TS_PACKET_LEN)).ok()?;
        file.read_exact(&mut packet).ok()?;
        if let Some(pcr) = packet_pcr(&packet) {
            first_pcr = Some(pcr);
            break;
        }
    }
    let first_pcr = first_pcr?;

    let mut last_pcr = None;
    let tail = packet_count.saturating_sub(PROBE_PACKET_LIMIT);
    for index in (tail..packet_count).rev() {
        file.seek(SeekFrom::Start(index * TS_PACKET_LEN)).ok()?;
        file.read_exact(&mut packet).ok()?;
        if let Some(pcr) = packet_pcr(&packet) {
            last_pcr = Some(pcr);
            break;
        }
    }
    let last_pcr = last_pcr?;

    if last_pcr > first_pcr {
        Some((last_pcr - first_pcr) as f64 / PCR_CLOCK_HZ)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// A TS packet whose adaptation field carries a PCR at `seconds`.
    fn pcr_packet(seconds: f64) -> [u8; TS_PACKET_LEN as usize] {
        let base = (seconds * PCR_CLOCK_HZ) as u64;
        let mut p = [0xFFu8; TS_PACKET_LEN as usize];
        p[0] = TS_SYNC_BYTE;
        p[1] = 0x40;
        p[2] = 0x00;
        p[3] = 0x20; // adaptation field only
        p[4] = 183; // adaptation_field_length
        p[5] = 0x10; // PCR flag
        p[6] = (base >> 25) as u8;
        p[7] = (base >> 17) as u8;
        p[8] = (base >> 9) as u8;
        p[9] = (base >> 1) as u8;
        p[10] = ((base & 1) << 7) as u8 | 0x7E;
        p[11] = 0x00;
        p
    }

    /// A payload-only packet with no adaptation field.
    fn filler_packet() -> [u8; TS_PACKET_LEN as usize] {
        let mut p = [0xAAu8; TS_PACKET_LEN as usize];
        p[0] = TS_SYNC_BYTE;
        p[3] = 0x10; // payload only
        p
    }

    fn write_ts_file(dir: &tempfile::TempDir, name: &str, duration: f64, packets: usize) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(&pcr_packet(0.0)).unwrap();
        for _ in 0..packets.saturating_sub(2) {
            file.write_all(&filler_packet()).unwrap();
        }
        file.write_all(&pcr_packet(duration)).unwrap();
        path
    }

    #[test]
    fn probes_duration_from_pcr_delta() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ts_file(&dir, "movie.ts", 120.0, 100);
        let source = TsFileSource::open(&path).unwrap();
        assert!((source.duration() - 120.0).abs() < 0.001);
        assert_eq!(source.file_size(), 100 * TS_PACKET_LEN);
    }

    #[test]
    fn pcr_less_file_has_unknown_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.ts");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();
        let source = TsFileSource::open(&path).unwrap();
        assert_eq!(source.duration(), 0.0);
    }

    #[test]
    fn frames_advance_monotonically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.ts");
        std::fs::write(&path, vec![7u8; 2500]).unwrap();
        let source = TsFileSource::open(&path).unwrap();

        let f1 = source.next_frame().unwrap();
        assert_eq!(f1.position, 0);
        assert_eq!(f1.data.len(), PREFERRED_FRAME_SIZE);

        let f2 = source.next_frame().unwrap();
        assert_eq!(f2.position, PREFERRED_FRAME_SIZE as u64);

        let f3 = source.next_frame().unwrap();
        assert_eq!(f3.position, 2048);
        assert_eq!(f3.data.len(), 2500 - 2048);

        assert!(source.next_frame().is_none());
    }

    #[test]
    fn seek_maps_npt_to_byte_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_ts_file(&dir, "movie.ts", 120.0, 100);
        let source = TsFileSource::open(&path).unwrap();

        source.seek_to_npt(30.0);
        let frame = source.next_frame().unwrap();
        let expected = ((30.0 / 120.0) * (100 * TS_PACKET_LEN) as f64) as u64;
        assert_eq!(frame.position, expected);
    }

    #[test]
    fn seek_without_duration_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.ts");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();
        let source = TsFileSource::open(&path).unwrap();

        source.seek_to_npt(10.0);
        assert_eq!(source.next_frame().unwrap().position, 0);
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.ts");
        std::fs::write(&path, vec![0u8; 16]).unwrap();
        let source = TsFileSource::open(&path).unwrap();
        source.close();
        source.close();
        assert!(source.next_frame().is_none());
    }
}
