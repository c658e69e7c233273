//! Recording control loop
//!
//! Drives one capture session: acquire a frame, convert it, submit it with the
//! next timestamp and write every packet the encoder makes available. Every
//! exit path flushes the encoder, drains it and releases the device, encoder
//! and output, whether the loop ended normally or on a fatal error.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::convert::ColorConverter;
use super::device::{DeviceStatus, FrameSource};
use super::encoder::{EncoderBackend, EncoderSession, EncoderState};
use super::frame::{EncodedPacket, PlanarFrame, RawFrame, Timestamp};
use super::sink::PacketSink;
use crate::error::{AppError, Result};
use crate::shutdown::ShutdownController;
use crate::utils::LogThrottler;

const TIMEOUT_LOG_KEY: &str = "device_timeout";
/// Minimum interval between repeated timeout warnings
const TIMEOUT_LOG_INTERVAL_SECS: u64 = 5;

/// Why a recording ended without a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Shutdown was requested
    Cancelled,
    /// The device went away
    Disconnected,
    /// The configured frame cap was reached
    FrameLimit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Cancelled => write!(f, "cancelled"),
            ExitReason::Disconnected => write!(f, "device disconnected"),
            ExitReason::FrameLimit => write!(f, "frame limit reached"),
        }
    }
}

/// Outcome of a completed recording
#[derive(Debug, Clone)]
pub struct RecordingSummary {
    /// Pictures submitted to the encoder
    pub frames_submitted: u64,
    /// Packets written to the output
    pub packets_written: u64,
    /// Payload bytes written to the output
    pub bytes_written: u64,
    /// Refresh pictures among the written packets
    pub keyframes: u64,
    /// Acquisitions that returned no frame
    pub timeouts: u64,
    pub exit_reason: ExitReason,
    pub elapsed: Duration,
}

impl RecordingSummary {
    pub fn average_fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames_submitted as f64 / secs
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    frames_submitted: u64,
    packets_written: u64,
    keyframes: u64,
    timeouts: u64,
}

/// Capture-to-file recorder
pub struct Recorder {
    source: Box<dyn FrameSource>,
    session: EncoderSession,
    sink: Box<dyn PacketSink>,
    converter: ColorConverter,
    /// Reused for every acquisition
    raw: RawFrame,
    /// Reused for every conversion
    planar: PlanarFrame,
    max_frames: Option<u64>,
    shutdown: ShutdownController,
    throttler: LogThrottler,
    counters: Counters,
    released: bool,
}

impl Recorder {
    /// Assemble a recorder from an opened device, encoder and output
    ///
    /// The encoder must be configured for the device's resolution.
    pub fn new(
        source: Box<dyn FrameSource>,
        backend: Box<dyn EncoderBackend>,
        sink: Box<dyn PacketSink>,
        shutdown: ShutdownController,
    ) -> Result<Self> {
        let resolution = source.resolution();
        let encoder_resolution = backend.config().resolution;
        if encoder_resolution != resolution {
            return Err(AppError::DimensionMismatch {
                expected: resolution,
                actual: encoder_resolution,
            });
        }

        let format = source.pixel_format();
        let converter = ColorConverter::new(resolution, format)?;

        Ok(Self {
            raw: RawFrame::new(resolution, format),
            planar: PlanarFrame::new(resolution),
            session: EncoderSession::new(backend),
            source,
            sink,
            converter,
            max_frames: None,
            shutdown,
            throttler: LogThrottler::with_secs(TIMEOUT_LOG_INTERVAL_SECS),
            counters: Counters::default(),
            released: false,
        })
    }

    /// Stop after this many submitted pictures
    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    /// Record until cancelled, disconnected or the frame cap is reached
    ///
    /// Resources are released before this returns, on success and on error.
    pub fn run(&mut self) -> Result<RecordingSummary> {
        if self.released {
            return Err(AppError::InvalidState(
                "recorder already released".to_string(),
            ));
        }

        let start = Instant::now();
        info!(
            "Recording from {} ({} {}) with {} encoder",
            self.source.name(),
            self.source.resolution(),
            self.source.pixel_format(),
            self.session.name()
        );

        let outcome = self.capture_loop();
        if let Err(e) = &outcome {
            error!("Recording aborted: {}", e);
        }

        let finalised = self.finalise();
        if let Err(e) = &finalised {
            error!("Failed to finalise encoder: {}", e);
        }
        let released = self.release();

        let exit_reason = outcome?;
        finalised?;
        released?;

        let summary = RecordingSummary {
            frames_submitted: self.counters.frames_submitted,
            packets_written: self.counters.packets_written,
            bytes_written: self.sink.bytes_written(),
            keyframes: self.counters.keyframes,
            timeouts: self.counters.timeouts,
            exit_reason,
            elapsed: start.elapsed(),
        };
        info!(
            "Recording finished ({}): {} frames, {} packets ({} keyframes), {} bytes, {} timeouts in {:.1}s ({:.1} fps)",
            summary.exit_reason,
            summary.frames_submitted,
            summary.packets_written,
            summary.keyframes,
            summary.bytes_written,
            summary.timeouts,
            summary.elapsed.as_secs_f64(),
            summary.average_fps()
        );
        Ok(summary)
    }

    fn capture_loop(&mut self) -> Result<ExitReason> {
        loop {
            if self
                .max_frames
                .is_some_and(|max| self.counters.frames_submitted >= max)
            {
                info!("Frame limit of {} reached", self.counters.frames_submitted);
                return Ok(ExitReason::FrameLimit);
            }

            match self.source.acquire(&mut self.raw) {
                DeviceStatus::Ok => {
                    let suppressed = self.throttler.clear(TIMEOUT_LOG_KEY);
                    if suppressed > 0 {
                        debug!("Device recovered after {} more timeout(s)", suppressed);
                    }
                    self.encode_frame()?;
                }
                DeviceStatus::NoFrame => {
                    self.counters.timeouts += 1;
                    if let Some(suppressed) = self.throttler.check(TIMEOUT_LOG_KEY) {
                        if suppressed > 0 {
                            warn!(
                                "Timeout waiting for frame from {} ({} more since last report)",
                                self.source.name(),
                                suppressed
                            );
                        } else {
                            warn!("Timeout waiting for frame from {}", self.source.name());
                        }
                    }
                }
                DeviceStatus::Disconnected => {
                    warn!("Device {} disconnected", self.source.name());
                    return Ok(ExitReason::Disconnected);
                }
                DeviceStatus::Fatal(reason) => {
                    return Err(AppError::DeviceFatal {
                        device: self.source.name().to_string(),
                        reason,
                    });
                }
            }

            if self.shutdown.is_requested() {
                info!("Stopping after {} frames", self.counters.frames_submitted);
                return Ok(ExitReason::Cancelled);
            }
        }
    }

    /// Convert, submit and drain one acquired frame
    fn encode_frame(&mut self) -> Result<()> {
        let pts: Timestamp = self.counters.frames_submitted;
        self.converter.convert(&self.raw, &mut self.planar)?;
        self.session.submit(&self.planar, pts)?;
        self.counters.frames_submitted += 1;
        self.drain()
    }

    fn drain(&mut self) -> Result<()> {
        while let Some(packet) = self.session.poll()? {
            self.write_packet(&packet)?;
        }
        Ok(())
    }

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()> {
        self.sink.write(packet)?;
        self.counters.packets_written += 1;
        if packet.key_frame {
            self.counters.keyframes += 1;
        }
        Ok(())
    }

    /// Flush the encoder and write everything it was still holding
    fn finalise(&mut self) -> Result<()> {
        if self.session.state() == EncoderState::Closed {
            return Ok(());
        }

        self.session.flush()?;

        // Every packet consumes a distinct pending picture, so only runs of
        // empty polls need a bound.
        let idle_limit = self.session.reorder_depth() + 1;
        let mut idle_polls = 0;
        while self.session.state() == EncoderState::Draining {
            match self.session.poll()? {
                Some(packet) => {
                    idle_polls = 0;
                    self.write_packet(&packet)?;
                }
                None => {
                    idle_polls += 1;
                    if idle_polls > idle_limit {
                        return Err(AppError::Encoder(format!(
                            "{} still draining after {} empty polls",
                            self.session.name(),
                            idle_polls
                        )));
                    }
                }
            }
        }
        debug!(
            "Encoder finalised: {} submitted, {} packets written",
            self.counters.frames_submitted, self.counters.packets_written
        );
        Ok(())
    }

    /// Close the device, encoder and output
    ///
    /// Each resource is released even if another one fails; the first failure
    /// is returned. Calling this more than once has no further effect.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let device = self.source.close().map_err(|e| {
            warn!("Failed to close device {}: {}", self.source.name(), e);
            AppError::Io(e)
        });
        self.session.close();
        // Buffered output reaches the file here, so a failure loses data
        let output = self.sink.close().map_err(|e| {
            error!("Failed to close output: {}", e);
            e
        });
        debug!("Recorder resources released");

        device.and(output)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
