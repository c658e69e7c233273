//! Synthetic frame source
//!
//! Produces a moving gradient so the full pipeline can run without a sensor
//! attached. Optionally "unplugs" itself after a fixed number of frames.

use std::time::{Duration, Instant};

use tracing::info;

use super::device::{DeviceStatus, FrameSource};
use super::format::{PixelFormat, Resolution};
use super::frame::RawFrame;

/// Test pattern generator
pub struct TestPatternSource {
    resolution: Resolution,
    format: PixelFormat,
    /// Delay between frames, zero for as-fast-as-possible
    interval: Duration,
    /// Report `Disconnected` once this many frames were produced
    frame_limit: Option<u64>,
    produced: u64,
    last_frame: Option<Instant>,
    open: bool,
}

impl TestPatternSource {
    pub fn new(resolution: Resolution, format: PixelFormat) -> Self {
        Self {
            resolution,
            format,
            interval: Duration::ZERO,
            frame_limit: None,
            produced: 0,
            last_frame: None,
            open: true,
        }
    }

    /// Pace frames at the given rate
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.interval = if fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / fps
        };
        self
    }

    /// Simulate an unplug after `frames` frames
    pub fn with_frame_limit(mut self, frames: Option<u64>) -> Self {
        self.frame_limit = frames;
        self
    }

    pub fn frames_produced(&self) -> u64 {
        self.produced
    }

    fn pace(&mut self) {
        if let Some(last) = self.last_frame {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
    }

    fn paint(&self, frame: &mut RawFrame) {
        let width = self.resolution.width as usize;
        let height = self.resolution.height as usize;
        let phase = (self.produced * 4) as usize;
        let (ro, go, bo) = self
            .format
            .rgb_offsets()
            .unwrap_or((2, 1, 0));

        for (i, px) in frame.data_mut().chunks_exact_mut(4).enumerate() {
            let x = i % width;
            let y = i / width;
            px[ro] = ((x * 255 / width.max(1)) + phase) as u8;
            px[go] = (y * 255 / height.max(1)) as u8;
            px[bo] = (((x + y) / 2 + phase) & 0xFF) as u8;
            px[3] = 0xFF;
        }
    }
}

impl FrameSource for TestPatternSource {
    fn name(&self) -> &str {
        "test-pattern"
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn acquire(&mut self, frame: &mut RawFrame) -> DeviceStatus {
        if !self.open {
            return DeviceStatus::Fatal("device already closed".to_string());
        }
        if self.frame_limit.is_some_and(|limit| self.produced >= limit) {
            return DeviceStatus::Disconnected;
        }

        self.pace();
        self.paint(frame);
        self.produced += 1;
        DeviceStatus::Ok
    }

    fn close(&mut self) -> std::io::Result<()> {
        if self.open {
            info!("Test pattern closed after {} frames", self.produced);
            self.open = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnects_after_limit() {
        let res = Resolution::new(8, 8);
        let mut source = TestPatternSource::new(res, PixelFormat::Bgra).with_frame_limit(Some(2));
        let mut frame = RawFrame::new(res, PixelFormat::Bgra);

        assert_eq!(source.acquire(&mut frame), DeviceStatus::Ok);
        assert_eq!(source.acquire(&mut frame), DeviceStatus::Ok);
        assert_eq!(source.acquire(&mut frame), DeviceStatus::Disconnected);
        assert_eq!(source.frames_produced(), 2);
    }

    #[test]
    fn test_frames_change_over_time() {
        let res = Resolution::new(8, 8);
        let mut source = TestPatternSource::new(res, PixelFormat::Rgbx);
        let mut first = RawFrame::new(res, PixelFormat::Rgbx);
        let mut second = RawFrame::new(res, PixelFormat::Rgbx);

        source.acquire(&mut first);
        source.acquire(&mut second);
        assert_ne!(first.data(), second.data());
    }

    #[test]
    fn test_close_is_idempotent() {
        let res = Resolution::new(8, 8);
        let mut source = TestPatternSource::new(res, PixelFormat::Bgra);
        let mut frame = RawFrame::new(res, PixelFormat::Bgra);

        source.close().unwrap();
        source.close().unwrap();
        assert!(matches!(source.acquire(&mut frame), DeviceStatus::Fatal(_)));
    }
}
