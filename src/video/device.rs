//! Imaging device abstraction
//!
//! A [`FrameSource`] is an already-opened device. The recorder asks it for one
//! frame at a time and interprets the returned [`DeviceStatus`]; sources never
//! decide on their own whether to retry or give up.

use std::fmt;
use std::io;

use crate::video::format::{PixelFormat, Resolution};
use crate::video::frame::RawFrame;

/// Outcome of a single acquisition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceStatus {
    /// The buffer now holds one complete new frame
    Ok,
    /// No frame within the device timeout; buffer contents are stale
    NoFrame,
    /// The device went away; the session is over
    Disconnected,
    /// Any other device failure
    Fatal(String),
}

impl DeviceStatus {
    /// Classify an I/O error returned by a capture call
    pub fn from_io_error(err: &io::Error) -> Self {
        if matches!(
            err.kind(),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
        ) {
            return DeviceStatus::NoFrame;
        }

        let is_device_lost = matches!(
            err.raw_os_error(),
            Some(libc::ENXIO)
                | Some(libc::ENODEV)
                | Some(libc::EIO)
                | Some(libc::EPIPE)
                | Some(libc::ESHUTDOWN)
        );

        if is_device_lost {
            DeviceStatus::Disconnected
        } else {
            DeviceStatus::Fatal(err.to_string())
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Ok => write!(f, "ok"),
            DeviceStatus::NoFrame => write!(f, "no frame (timeout)"),
            DeviceStatus::Disconnected => write!(f, "disconnected"),
            DeviceStatus::Fatal(reason) => write!(f, "fatal: {}", reason),
        }
    }
}

/// An opened imaging device
pub trait FrameSource: Send {
    /// Human readable identifier used in logs
    fn name(&self) -> &str;

    /// Fixed resolution reported by the device when it was opened
    fn resolution(&self) -> Resolution;

    /// Packed layout of the frames this device produces
    fn pixel_format(&self) -> PixelFormat;

    /// Fill `frame` with the next frame
    ///
    /// `frame` must have been allocated for this device's resolution and
    /// layout. Must return within the device's timeout.
    fn acquire(&mut self, frame: &mut RawFrame) -> DeviceStatus;

    /// Release the device. Calling it again is a no-op.
    fn close(&mut self) -> std::io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_not_fatal() {
        let err = io::Error::new(io::ErrorKind::TimedOut, "select timeout");
        assert_eq!(DeviceStatus::from_io_error(&err), DeviceStatus::NoFrame);
    }

    #[test]
    fn test_device_lost_errnos() {
        for errno in [libc::ENODEV, libc::ENXIO, libc::EIO, libc::EPIPE, libc::ESHUTDOWN] {
            let err = io::Error::from_raw_os_error(errno);
            assert_eq!(DeviceStatus::from_io_error(&err), DeviceStatus::Disconnected);
        }
    }

    #[test]
    fn test_other_errors_are_fatal() {
        let err = io::Error::from_raw_os_error(libc::EINVAL);
        assert!(matches!(
            DeviceStatus::from_io_error(&err),
            DeviceStatus::Fatal(_)
        ));
    }
}
