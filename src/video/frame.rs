//! Frame buffers flowing through the recording pipeline

use bytes::Bytes;
use openh264::formats::YUVSource;

use super::format::{PixelFormat, Resolution};

/// Frame index assigned by the recorder, one per submitted picture
pub type Timestamp = u64;

/// Packed 4-byte-per-pixel frame as delivered by the device
///
/// Allocated once and overwritten in place by every acquisition.
#[derive(Debug, Clone)]
pub struct RawFrame {
    data: Vec<u8>,
    resolution: Resolution,
    format: PixelFormat,
}

impl RawFrame {
    /// Allocate a zeroed frame for the given resolution and packed layout
    pub fn new(resolution: Resolution, format: PixelFormat) -> Self {
        debug_assert!(format.is_packed(), "raw frames carry packed pixels");
        Self {
            data: vec![0u8; format.frame_size(resolution)],
            resolution,
            format,
        }
    }

    /// Number of pixels the buffer holds (the device's fixed capacity)
    pub fn capacity(&self) -> usize {
        self.resolution.pixels() as usize
    }

    /// Bytes per row without padding
    pub fn stride(&self) -> usize {
        self.resolution.width as usize * 4
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// I420 picture: full-size Y plane followed by quarter-size U and V planes
#[derive(Debug, Clone)]
pub struct PlanarFrame {
    /// Raw buffer containing all planes
    data: Vec<u8>,
    resolution: Resolution,
    /// U plane offset
    u_offset: usize,
    /// V plane offset
    v_offset: usize,
}

impl PlanarFrame {
    /// Create a new picture buffer for the given resolution
    pub fn new(resolution: Resolution) -> Self {
        let y_size = resolution.pixels() as usize;
        let uv_size = (resolution.width as usize / 2) * (resolution.height as usize / 2);

        Self {
            data: vec![0u8; y_size + uv_size * 2],
            resolution,
            u_offset: y_size,
            v_offset: y_size + uv_size,
        }
    }

    /// Get the raw buffer as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn y_plane(&self) -> &[u8] {
        &self.data[..self.u_offset]
    }

    pub fn u_plane(&self) -> &[u8] {
        &self.data[self.u_offset..self.v_offset]
    }

    pub fn v_plane(&self) -> &[u8] {
        &self.data[self.v_offset..]
    }

    /// Borrow all three planes mutably at once
    pub fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8]) {
        let (y, chroma) = self.data.split_at_mut(self.u_offset);
        let (u, v) = chroma.split_at_mut(self.v_offset - self.u_offset);
        (y, u, v)
    }

    /// Overwrite all three planes from a YUV source of the same size
    pub fn copy_from(&mut self, src: &impl YUVSource) {
        let (y, u, v) = self.planes_mut();
        y.copy_from_slice(src.y());
        u.copy_from_slice(src.u());
        v.copy_from_slice(src.v());
    }

    /// Row strides of the Y, U and V planes
    pub fn strides(&self) -> (usize, usize, usize) {
        let w = self.resolution.width as usize;
        (w, w / 2, w / 2)
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Compressed output of the encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    /// Encoded payload, written to the output verbatim
    pub data: Bytes,
    /// Presentation timestamp (the picture's frame index)
    pub pts: Timestamp,
    /// Decode timestamp, differs from `pts` when pictures are reordered
    pub dts: i64,
    /// Whether this packet starts with a refresh (IDR) picture
    pub key_frame: bool,
}

impl EncodedPacket {
    pub fn new(data: impl Into<Bytes>, pts: Timestamp, dts: i64, key_frame: bool) -> Self {
        Self {
            data: data.into(),
            pts,
            dts,
            key_frame,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
