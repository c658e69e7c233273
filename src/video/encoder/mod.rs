//! Video encoder implementations
//!
//! This module provides:
//! - The backend trait and encoder configuration
//! - A stateful session driving any backend through open/encode/drain/close
//! - H264 encoding via OpenH264

pub mod h264;
pub mod session;
pub mod traits;

pub use h264::H264Encoder;
pub use session::{EncoderSession, EncoderState};
pub use traits::{EncoderBackend, EncoderConfig, ReceiveOutcome};
