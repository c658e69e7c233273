//! Pixel format definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use v4l::format::fourcc;

/// Pixel layouts understood by the recorder
///
/// The packed layouts are named by their in-memory byte order. A sensor that
/// hands out native-endian `0xAARRGGBB` words on a little-endian host
/// produces `Bgra`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PixelFormat {
    /// B, G, R, A bytes per pixel
    Bgra,
    /// B, G, R, padding bytes per pixel
    Bgrx,
    /// R, G, B, A bytes per pixel
    Rgba,
    /// R, G, B, padding bytes per pixel
    Rgbx,
    /// YUV 4:2:0 planar (I420), the encoder input layout
    Yuv420,
}

impl PixelFormat {
    /// Convert to V4L2 FourCC
    pub fn to_fourcc(&self) -> fourcc::FourCC {
        match self {
            PixelFormat::Bgra => fourcc::FourCC::new(b"AR24"),
            PixelFormat::Bgrx => fourcc::FourCC::new(b"XR24"),
            PixelFormat::Rgba => fourcc::FourCC::new(b"AB24"),
            PixelFormat::Rgbx => fourcc::FourCC::new(b"XB24"),
            PixelFormat::Yuv420 => fourcc::FourCC::new(b"YU12"),
        }
    }

    /// Try to convert from V4L2 FourCC
    pub fn from_fourcc(fourcc: fourcc::FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"AR24" | b"BA24" => Some(PixelFormat::Bgra),
            b"XR24" | b"BX24" => Some(PixelFormat::Bgrx),
            b"AB24" | b"RA24" => Some(PixelFormat::Rgba),
            b"XB24" | b"RX24" => Some(PixelFormat::Rgbx),
            b"YU12" | b"I420" => Some(PixelFormat::Yuv420),
            _ => None,
        }
    }

    /// Whether this is one of the interleaved 4-byte-per-pixel layouts
    pub fn is_packed(&self) -> bool {
        !matches!(self, PixelFormat::Yuv420)
    }

    /// Byte offsets of the red, green and blue samples inside one packed pixel
    pub fn rgb_offsets(&self) -> Option<(usize, usize, usize)> {
        match self {
            PixelFormat::Bgra | PixelFormat::Bgrx => Some((2, 1, 0)),
            PixelFormat::Rgba | PixelFormat::Rgbx => Some((0, 1, 2)),
            PixelFormat::Yuv420 => None,
        }
    }

    /// Calculate the size of one frame in this layout
    pub fn frame_size(&self, resolution: Resolution) -> usize {
        let pixels = resolution.pixels() as usize;
        match self {
            PixelFormat::Yuv420 => {
                let chroma = (resolution.width as usize / 2) * (resolution.height as usize / 2);
                pixels + chroma * 2
            }
            _ => pixels * 4,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Bgra => "BGRA",
            PixelFormat::Bgrx => "BGRX",
            PixelFormat::Rgba => "RGBA",
            PixelFormat::Rgbx => "RGBX",
            PixelFormat::Yuv420 => "YUV420",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BGRA" | "RGB32" | "AR24" => Ok(PixelFormat::Bgra),
            "BGRX" | "XR24" => Ok(PixelFormat::Bgrx),
            "RGBA" | "AB24" => Ok(PixelFormat::Rgba),
            "RGBX" | "XB24" => Ok(PixelFormat::Rgbx),
            "YUV420" | "I420" | "YUV420P" => Ok(PixelFormat::Yuv420),
            _ => Err(format!("Unknown pixel format: {}", s)),
        }
    }
}

/// Resolution (width x height)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Get total pixels
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// 4:2:0 subsampling needs both dimensions to be non-zero and even
    pub fn is_encodable(&self) -> bool {
        self.width > 0 && self.height > 0 && self.width % 2 == 0 && self.height % 2 == 0
    }

    /// Native resolution of the small thermal cores this tool was written for
    pub const QVGA: Resolution = Resolution {
        width: 320,
        height: 240,
    };
    pub const VGA: Resolution = Resolution {
        width: 640,
        height: 480,
    };
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
