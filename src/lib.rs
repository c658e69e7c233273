//! sensor-recorder - capture frames from an imaging sensor and record them
//!
//! This crate provides the recording pipeline: frame acquisition, color space
//! conversion, H.264 encoding and raw elementary stream output.

pub mod config;
pub mod error;
pub mod shutdown;
pub mod utils;
pub mod video;

pub use error::{AppError, Result};
