//! Utility modules shared across the recorder

pub mod throttle;

pub use throttle::LogThrottler;
