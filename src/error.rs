use thiserror::Error;

use crate::video::format::Resolution;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Video error: {0}")]
    VideoError(String),

    #[error("Video device failure [{device}]: {reason}")]
    DeviceFatal { device: String, reason: String },

    #[error("Frame dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: Resolution,
        actual: Resolution,
    },

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Output error: {0}")]
    Sink(String),
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AppError>;
