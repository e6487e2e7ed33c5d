use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::error::Result;

/// Offset-addressed output file for reassembled frames.
///
/// Frames arrive from the RTP receive loop in whatever order UDP delivers
/// them, each tagged with its byte offset; every write seeks first. The
/// lock serializes concurrent writers, and a lost datagram simply leaves a
/// hole at its offset.
pub struct FileSink {
    file: Mutex<Option<File>>,
}

impl FileSink {
    /// Create (or truncate) the output file.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        tracing::debug!(path = %path.display(), "output file created");
        Ok(FileSink {
            file: Mutex::new(Some(file)),
        })
    }

    /// Seek to `position` and write `data` there.
    pub fn write_at(&self, position: u64, data: &[u8]) -> Result<()> {
        let mut guard = self.file.lock();
        let Some(file) = guard.as_mut() else {
            // Late datagrams after close are dropped silently.
            return Ok(());
        };
        file.seek(SeekFrom::Start(position))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    /// Close the output file. Idempotent.
    pub fn close(&self) {
        if self.file.lock().take().is_some() {
            tracing::debug!("output file closed");
        }
    }
}
