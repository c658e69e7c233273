//! Video capture and recording module
//!
//! This module provides frame sources (V4L2 and a synthetic pattern), packed
//! RGB to I420 conversion, H.264 encoding and the recording loop that ties
//! them together.

pub mod capture;
pub mod convert;
pub mod device;
pub mod encoder;
pub mod format;
pub mod frame;
pub mod pattern;
pub mod recorder;
pub mod sink;

#[cfg(test)]
pub(crate) mod testing;

pub use capture::{CaptureConfig, V4l2Source};
pub use convert::ColorConverter;
pub use device::{DeviceStatus, FrameSource};
pub use encoder::{EncoderBackend, EncoderConfig, EncoderSession, EncoderState, H264Encoder};
pub use format::{PixelFormat, Resolution};
pub use frame::{EncodedPacket, PlanarFrame, RawFrame, Timestamp};
pub use pattern::TestPatternSource;
pub use recorder::{ExitReason, Recorder, RecordingSummary};
pub use sink::{PacketSink, StreamSink};
