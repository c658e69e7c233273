//! Encoded packet output
//!
//! Packets are appended as-is: the H.264 encoder already emits Annex B access
//! units, so the output file is a raw elementary stream playable with
//! `ffplay capture.h264`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::video::frame::EncodedPacket;

/// Output buffer size
const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// Destination for encoded packets
pub trait PacketSink: Send {
    /// Append one packet's bytes
    fn write(&mut self, packet: &EncodedPacket) -> Result<()>;

    /// Flush and release the destination. Safe to call more than once.
    fn close(&mut self) -> Result<()>;

    /// Total payload bytes accepted so far
    fn bytes_written(&self) -> u64;
}

/// Buffered sink over any writer
pub struct StreamSink<W: Write + Send> {
    name: String,
    writer: Option<BufWriter<W>>,
    bytes_written: u64,
    packets_written: u64,
}

impl StreamSink<File> {
    /// Create (or truncate) the output file
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| {
            AppError::Sink(format!(
                "Failed to create output file {}: {}",
                path.display(),
                e
            ))
        })?;
        info!("Output file opened: {}", path.display());
        Ok(Self::new(file, path.display().to_string()))
    }
}

impl<W: Write + Send> StreamSink<W> {
    pub fn new(writer: W, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            writer: Some(BufWriter::with_capacity(WRITE_BUFFER_SIZE, writer)),
            bytes_written: 0,
            packets_written: 0,
        }
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }
}

impl<W: Write + Send> PacketSink for StreamSink<W> {
    fn write(&mut self, packet: &EncodedPacket) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(AppError::Sink(format!("{} is already closed", self.name)));
        };
        writer
            .write_all(&packet.data)
            .map_err(|e| AppError::Sink(format!("Failed to write to {}: {}", self.name, e)))?;

        self.bytes_written += packet.len() as u64;
        self.packets_written += 1;
        debug!("Write packet {} ({})", packet.pts, packet.len());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer
            .flush()
            .map_err(|e| AppError::Sink(format!("Failed to flush {}: {}", self.name, e)))?;
        info!(
            "Closed {}: {} packets, {} bytes",
            self.name, self.packets_written, self.bytes_written
        );
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl<W: Write + Send> Drop for StreamSink<W> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(pts: u64, data: &[u8]) -> EncodedPacket {
        EncodedPacket::new(data.to_vec(), pts, pts as i64, pts == 0)
    }

    #[test]
    fn test_file_receives_packets_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.h264");
        let mut sink = StreamSink::create(&path).unwrap();

        sink.write(&packet(0, &[0, 0, 0, 1, 0x67])).unwrap();
        sink.write(&packet(1, &[0, 0, 0, 1, 0x41])).unwrap();
        assert_eq!(sink.bytes_written(), 10);
        assert_eq!(sink.packets_written(), 2);
        sink.close().unwrap();

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents, vec![0, 0, 0, 1, 0x67, 0, 0, 0, 1, 0x41]);
    }

    #[test]
    fn test_close_twice_and_write_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = StreamSink::create(dir.path().join("out.h264")).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();
        assert!(matches!(sink.write(&packet(0, &[1])), Err(AppError::Sink(_))));
    }

    #[test]
    fn test_drop_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.h264");
        {
            let mut sink = StreamSink::create(&path).unwrap();
            sink.write(&packet(0, &[9, 9, 9])).unwrap();
        }
        assert_eq!(std::fs::read(&path).unwrap(), vec![9, 9, 9]);
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_close_reports_buffered_write_failure() {
        let mut sink = StreamSink::new(BrokenPipe, "pipe");
        sink.write(&packet(0, &[1, 2, 3])).unwrap();
        assert!(matches!(sink.close(), Err(AppError::Sink(_))));
        // The writer is gone either way
        assert!(sink.close().is_ok());
    }

    #[test]
    fn test_create_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = StreamSink::create(dir.path().join("missing").join("out.h264"));
        assert!(matches!(result, Err(AppError::Sink(_))));
    }
}
