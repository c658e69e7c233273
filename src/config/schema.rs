use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::video::capture::CaptureConfig;
use crate::video::encoder::EncoderConfig;
use crate::video::format::{PixelFormat, Resolution};

/// Main recorder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Frame source settings
    pub device: DeviceConfig,
    /// Encoder settings
    pub encoder: EncoderSettings,
    /// Output settings
    pub output: OutputConfig,
    /// Stop after this many frames (unlimited if unset)
    pub max_frames: Option<u64>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            encoder: EncoderSettings::default(),
            output: OutputConfig::default(),
            max_frames: None,
        }
    }
}

impl RecorderConfig {
    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let resolution = self.device.resolution();
        if !resolution.is_encodable() {
            return Err(AppError::Config(format!(
                "Resolution must be non-zero and even, got {}",
                resolution
            )));
        }
        if !self.device.format.is_packed() {
            return Err(AppError::Config(format!(
                "Device format must be a packed 32-bit RGB layout, got {}",
                self.device.format
            )));
        }
        if self.device.buffer_count == 0 {
            return Err(AppError::Config("buffer_count must be at least 1".to_string()));
        }
        if self.device.timeout_ms == 0 {
            return Err(AppError::Config("timeout_ms must be positive".to_string()));
        }
        if self.encoder.fps == 0 {
            return Err(AppError::Config("Encoder fps must be positive".to_string()));
        }
        if self.encoder.gop_size == 0 {
            return Err(AppError::Config("gop_size must be positive".to_string()));
        }
        if self.encoder.bitrate_kbps == 0 {
            return Err(AppError::Config("bitrate_kbps must be positive".to_string()));
        }
        if self.max_frames == Some(0) {
            return Err(AppError::Config("max_frames must be positive".to_string()));
        }
        if self.output.path.as_os_str().is_empty() {
            return Err(AppError::Config("Output path is empty".to_string()));
        }
        Ok(())
    }
}

/// Kind of frame source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// V4L2 capture node
    #[default]
    V4l2,
    /// Synthetic moving gradient
    TestPattern,
}

impl std::str::FromStr for SourceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "v4l2" | "camera" => Ok(SourceKind::V4l2),
            "test-pattern" | "pattern" | "test" => Ok(SourceKind::TestPattern),
            _ => Err(AppError::Config(format!("Unknown source: {}", s))),
        }
    }
}

/// Frame source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub source: SourceKind,
    /// Device path (e.g., /dev/video0)
    pub path: PathBuf,
    /// Requested width
    pub width: u32,
    /// Requested height
    pub height: u32,
    /// Packed pixel layout
    pub format: PixelFormat,
    /// Number of capture buffers
    pub buffer_count: u32,
    /// Per-frame wait limit in milliseconds
    pub timeout_ms: u64,
    /// Test pattern only: report a disconnect after this many frames
    pub pattern_frames: Option<u64>,
    /// Test pattern only: frames per second, 0 for unpaced
    pub pattern_fps: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::V4l2,
            path: PathBuf::from("/dev/video0"),
            width: 320,
            height: 240,
            format: PixelFormat::Bgra,
            buffer_count: 2,
            timeout_ms: 2000,
            pattern_frames: None,
            pattern_fps: 9,
        }
    }
}

impl DeviceConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// V4L2 capture settings derived from this section
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            device_path: self.path.clone(),
            resolution: self.resolution(),
            format: self.format,
            buffer_count: self.buffer_count,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// Encoder configuration (resolution comes from the opened device)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
    /// Frames per second (time base 1/fps)
    pub fps: u32,
    /// Interval between refresh pictures
    pub gop_size: u32,
    /// Maximum consecutive B-frames
    pub max_b_frames: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            bitrate_kbps: 400,
            fps: 9,
            gop_size: 9,
            max_b_frames: 1,
        }
    }
}

impl EncoderSettings {
    /// Encoder configuration for a device of the given resolution
    pub fn encoder_config(&self, resolution: Resolution) -> EncoderConfig {
        EncoderConfig::h264(resolution, self.bitrate_kbps)
            .with_fps(self.fps)
            .with_gop_size(self.gop_size)
            .with_max_b_frames(self.max_b_frames)
    }
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Raw H.264 elementary stream file
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("capture.h264"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RecorderConfig::default();
        config.validate().unwrap();
        assert_eq!(config.device.resolution(), Resolution::QVGA);
        assert_eq!(config.encoder.gop_size, 9);
        assert_eq!(config.output.path, PathBuf::from("capture.h264"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "device": { "source": "test-pattern", "width": 640, "height": 480, "format": "RGBX" },
            "encoder": { "bitrate_kbps": 1200 },
            "max_frames": 90
        }"#;
        let config: RecorderConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.device.source, SourceKind::TestPattern);
        assert_eq!(config.device.resolution(), Resolution::VGA);
        assert_eq!(config.device.format, PixelFormat::Rgbx);
        assert_eq!(config.device.timeout_ms, 2000);
        assert_eq!(config.encoder.bitrate_kbps, 1200);
        assert_eq!(config.encoder.fps, 9);
        assert_eq!(config.max_frames, Some(90));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RecorderConfig::default();
        config.device.width = 321;
        assert!(config.validate().is_err());

        let mut config = RecorderConfig::default();
        config.encoder.gop_size = 0;
        assert!(config.validate().is_err());

        let mut config = RecorderConfig::default();
        config.device.format = PixelFormat::Yuv420;
        assert!(config.validate().is_err());

        let mut config = RecorderConfig::default();
        config.max_frames = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_encoder_config_uses_device_resolution() {
        let settings = EncoderSettings::default();
        let config = settings.encoder_config(Resolution::VGA);
        assert_eq!(config.resolution, Resolution::VGA);
        assert_eq!(config.fps, 9);
        assert_eq!(config.max_b_frames, 1);
    }

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("v4l2".parse::<SourceKind>().unwrap(), SourceKind::V4l2);
        assert_eq!("pattern".parse::<SourceKind>().unwrap(), SourceKind::TestPattern);
        assert!("usb".parse::<SourceKind>().is_err());
    }
}
