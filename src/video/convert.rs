//! Pixel format conversion
//!
//! Packed 32-bit RGB (as delivered by the sensor) → YUV420P (as consumed by
//! the H.264 encoder), using OpenH264's BT.601 limited-range converter. Chroma
//! is taken from the mean of each 2x2 block.

use openh264::formats::{BgraSliceU8, RgbaSliceU8, YUVBuffer};

use crate::error::{AppError, Result};
use crate::video::format::{PixelFormat, Resolution};
use crate::video::frame::{PlanarFrame, RawFrame};

/// Color space converter
///
/// Dimensions and source layout are fixed at pipeline setup. The YUV scratch
/// buffer is reused for every frame.
pub struct ColorConverter {
    src_format: PixelFormat,
    resolution: Resolution,
    scratch: YUVBuffer,
}

impl ColorConverter {
    /// Create a converter from a packed layout to YUV420P
    pub fn new(resolution: Resolution, src_format: PixelFormat) -> Result<Self> {
        if !src_format.is_packed() {
            return Err(AppError::VideoError(format!(
                "Unsupported conversion: {} → YUV420",
                src_format
            )));
        }

        // YUVBuffer panics on odd dimensions
        if !resolution.is_encodable() {
            return Err(AppError::VideoError(format!(
                "Resolution {} cannot be subsampled to 4:2:0 (dimensions must be even)",
                resolution
            )));
        }

        Ok(Self {
            src_format,
            resolution,
            scratch: YUVBuffer::new(resolution.width as usize, resolution.height as usize),
        })
    }

    /// Convert one raw frame into the planar picture
    pub fn convert(&mut self, raw: &RawFrame, out: &mut PlanarFrame) -> Result<()> {
        for actual in [raw.resolution(), out.resolution()] {
            if actual != self.resolution {
                return Err(AppError::DimensionMismatch {
                    expected: self.resolution,
                    actual,
                });
            }
        }
        if raw.format() != self.src_format {
            return Err(AppError::VideoError(format!(
                "Raw frame is {}, converter expects {}",
                raw.format(),
                self.src_format
            )));
        }

        let dimensions = (
            self.resolution.width as usize,
            self.resolution.height as usize,
        );
        // The padding byte (alpha or X) is ignored either way
        match self.src_format {
            PixelFormat::Bgra | PixelFormat::Bgrx => {
                self.scratch.read_rgb(BgraSliceU8::new(raw.data(), dimensions))
            }
            PixelFormat::Rgba | PixelFormat::Rgbx => {
                self.scratch.read_rgb(RgbaSliceU8::new(raw.data(), dimensions))
            }
            PixelFormat::Yuv420 => {
                return Err(AppError::VideoError(
                    "Raw frame is already planar".to_string(),
                ))
            }
        }

        out.copy_from(&self.scratch);
        Ok(())
    }
}
