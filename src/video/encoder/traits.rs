//! Encoder traits and common types

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::video::format::{PixelFormat, Resolution};
use crate::video::frame::{EncodedPacket, PlanarFrame, Timestamp};

/// Encoder configuration
///
/// Fixed before the first picture is submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Picture size, always the device's reported resolution
    pub resolution: Resolution,
    /// Input pixel format
    pub input_format: PixelFormat,
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
    /// Frames per second; the time base is 1/fps
    pub fps: u32,
    /// Interval between refresh (IDR) pictures
    pub gop_size: u32,
    /// Maximum consecutive bidirectionally predicted pictures
    pub max_b_frames: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::QVGA,
            input_format: PixelFormat::Yuv420,
            bitrate_kbps: 400,
            fps: 9,
            gop_size: 9,
            max_b_frames: 1,
        }
    }
}

impl EncoderConfig {
    pub fn h264(resolution: Resolution, bitrate_kbps: u32) -> Self {
        Self {
            resolution,
            bitrate_kbps,
            ..Default::default()
        }
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_gop_size(mut self, gop_size: u32) -> Self {
        self.gop_size = gop_size;
        self
    }

    pub fn with_max_b_frames(mut self, max_b_frames: u32) -> Self {
        self.max_b_frames = max_b_frames;
        self
    }

    /// Whether `pts` falls on a refresh boundary
    pub fn is_refresh_point(&self, pts: Timestamp) -> bool {
        self.gop_size > 0 && pts % self.gop_size as u64 == 0
    }
}

/// Result of asking a backend for output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// A finished packet
    Packet(EncodedPacket),
    /// Nothing ready until more input arrives
    Again,
    /// Flushed and fully drained
    EndOfStream,
}

/// Codec collaborator driven by [`EncoderSession`](super::session::EncoderSession)
///
/// Follows a send/receive protocol: every `send_picture` may make zero or more
/// packets available through `receive_packet`. Backends receive pictures by
/// reference and must copy whatever they keep for reordering.
///
/// An `Err` from either call is a hard encoder failure, never "not ready".
pub trait EncoderBackend: Send {
    /// Get encoder name
    fn name(&self) -> &str;

    /// Submit one picture, or `None` to mark end of stream
    fn send_picture(&mut self, picture: Option<(&PlanarFrame, Timestamp)>) -> Result<()>;

    /// Fetch the next ready packet
    fn receive_packet(&mut self) -> Result<ReceiveOutcome>;

    /// Maximum number of pictures held back at any time
    fn reorder_depth(&self) -> usize {
        0
    }

    /// Get current configuration
    fn config(&self) -> &EncoderConfig;
}
