//! V4L2 frame source
//!
//! Opens a capture node in a packed 32-bit RGB layout and hands out frames
//! from memory-mapped driver buffers.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::Device;

use super::device::{DeviceStatus, FrameSource};
use super::format::{PixelFormat, Resolution};
use super::frame::RawFrame;
use crate::error::{AppError, Result};

/// Default number of capture buffers
const DEFAULT_BUFFER_COUNT: u32 = 2;
/// Default capture timeout in milliseconds
const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// V4L2 capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Device path
    pub device_path: PathBuf,
    /// Requested resolution (the driver may pick another one)
    pub resolution: Resolution,
    /// Requested packed layout
    pub format: PixelFormat,
    /// Number of capture buffers
    pub buffer_count: u32,
    /// Per-frame wait limit; exceeding it reports `NoFrame`
    pub timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from("/dev/video0"),
            resolution: Resolution::QVGA,
            format: PixelFormat::Bgra,
            buffer_count: DEFAULT_BUFFER_COUNT,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl CaptureConfig {
    /// Create config for a specific device
    pub fn for_device(path: impl AsRef<Path>) -> Self {
        Self {
            device_path: path.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Set resolution
    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Resolution::new(width, height);
        self
    }

    /// Set format
    pub fn with_format(mut self, format: PixelFormat) -> Self {
        self.format = format;
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Frame source backed by a V4L2 capture node
pub struct V4l2Source {
    name: String,
    resolution: Resolution,
    format: PixelFormat,
    /// Bytes per line as reported by the driver (may include padding)
    stride: usize,
    stream: Option<MmapStream<'static>>,
    device: Option<Device>,
}

impl V4l2Source {
    /// Open the device, negotiate the format and start streaming
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        if !config.format.is_packed() {
            return Err(AppError::Config(format!(
                "Capture format must be a packed RGB layout, got {}",
                config.format
            )));
        }

        let name = config.device_path.display().to_string();
        let device = Device::with_path(&config.device_path).map_err(|e| {
            AppError::VideoError(format!("Failed to open device {}: {}", name, e))
        })?;

        let mut fmt = device
            .format()
            .map_err(|e| AppError::VideoError(format!("Failed to get device format: {}", e)))?;
        fmt.width = config.resolution.width;
        fmt.height = config.resolution.height;
        fmt.fourcc = config.format.to_fourcc();

        let actual = device
            .set_format(&fmt)
            .map_err(|e| AppError::VideoError(format!("Failed to set device format: {}", e)))?;

        let format = PixelFormat::from_fourcc(actual.fourcc)
            .filter(|f| f.is_packed())
            .ok_or_else(|| {
                AppError::VideoError(format!(
                    "Device {} does not support {} (driver offered {})",
                    name, config.format, actual.fourcc
                ))
            })?;
        if format != config.format {
            warn!(
                "Device {} negotiated {} instead of {}",
                name, format, config.format
            );
        }

        let resolution = Resolution::new(actual.width, actual.height);
        if resolution != config.resolution {
            warn!(
                "Device {} negotiated {} instead of {}",
                name, resolution, config.resolution
            );
        }

        let stride = (actual.stride as usize).max(resolution.width as usize * 4);

        let mut stream = MmapStream::with_buffers(&device, Type::VideoCapture, config.buffer_count)
            .map_err(|e| AppError::VideoError(format!("Failed to request buffers: {}", e)))?;
        stream.set_timeout(config.timeout);

        info!(
            "Capture format: {} {} stride={} buffers={}",
            resolution, format, stride, config.buffer_count
        );

        Ok(Self {
            name,
            resolution,
            format,
            stride,
            stream: Some(stream),
            device: Some(device),
        })
    }
}

/// Copy one driver buffer into `frame`, dropping per-row padding
fn copy_frame(
    buf: &[u8],
    bytes_used: usize,
    stride: usize,
    resolution: Resolution,
    frame: &mut RawFrame,
) -> DeviceStatus {
    let row_bytes = frame.stride();
    let rows = resolution.height as usize;
    // Some drivers leave bytesused at zero for single-planar mmap buffers
    let used = if bytes_used == 0 {
        buf.len()
    } else {
        bytes_used.min(buf.len())
    };
    let needed = stride * (rows - 1) + row_bytes;

    if used < needed {
        debug!("Dropping short frame: {} bytes, need {}", used, needed);
        return DeviceStatus::NoFrame;
    }

    let dst = frame.data_mut();
    if stride == row_bytes {
        dst.copy_from_slice(&buf[..row_bytes * rows]);
    } else {
        for (row, out) in dst.chunks_exact_mut(row_bytes).enumerate() {
            let start = row * stride;
            out.copy_from_slice(&buf[start..start + row_bytes]);
        }
    }
    DeviceStatus::Ok
}

impl FrameSource for V4l2Source {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn acquire(&mut self, frame: &mut RawFrame) -> DeviceStatus {
        debug_assert_eq!(frame.capacity(), self.resolution.pixels() as usize);

        let resolution = self.resolution;
        let stride = self.stride;
        let Some(stream) = self.stream.as_mut() else {
            return DeviceStatus::Fatal("device already closed".to_string());
        };

        match stream.next() {
            Ok((buf, meta)) => copy_frame(buf, meta.bytesused as usize, stride, resolution, frame),
            Err(e) => DeviceStatus::from_io_error(&e),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        if self.stream.take().is_some() {
            info!("Closing capture device {}", self.name);
        }
        self.device.take();
        Ok(())
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
