//! H.264 encoder backed by OpenH264
//!
//! OpenH264 produces one access unit per picture and never reorders, so
//! `max_b_frames` is accepted but has no effect. Refresh pictures are forced
//! on every `gop_size` boundary.

use std::collections::VecDeque;

use openh264::encoder::{
    BitRate, Encoder, EncoderConfig as OpenH264Config, FrameRate, FrameType, RateControlMode,
};
use openh264::formats::YUVSlices;
use openh264::OpenH264API;
use tracing::{debug, info, trace, warn};

use super::traits::{EncoderBackend, EncoderConfig, ReceiveOutcome};
use crate::error::{AppError, Result};
use crate::video::format::PixelFormat;
use crate::video::frame::{EncodedPacket, PlanarFrame, Timestamp};

/// Software H.264 encoder
pub struct H264Encoder {
    config: EncoderConfig,
    encoder: Encoder,
    /// Packets produced but not yet collected
    ready: VecDeque<EncodedPacket>,
    end_of_stream: bool,
    /// Pictures the rate controller decided to skip
    skipped: u64,
}

impl H264Encoder {
    /// Create a new encoder; the resolution must be even in both dimensions
    pub fn new(config: EncoderConfig) -> Result<Self> {
        if !config.resolution.is_encodable() {
            return Err(AppError::Config(format!(
                "H.264 needs a non-zero, even resolution, got {}",
                config.resolution
            )));
        }
        if config.input_format != PixelFormat::Yuv420 {
            return Err(AppError::Config(format!(
                "H.264 encoder takes YUV420 input, got {}",
                config.input_format
            )));
        }
        if config.fps == 0 {
            return Err(AppError::Config("Encoder fps must be positive".to_string()));
        }
        if config.max_b_frames > 0 {
            warn!(
                "OpenH264 has no B-frame support, ignoring max_b_frames={}",
                config.max_b_frames
            );
        }

        let oh_config = OpenH264Config::new()
            .bitrate(BitRate::from_bps(config.bitrate_kbps.saturating_mul(1000)))
            .max_frame_rate(FrameRate::from_hz(config.fps as f32))
            .rate_control_mode(RateControlMode::Bitrate);

        let encoder = Encoder::with_api_config(OpenH264API::from_source(), oh_config)
            .map_err(|e| AppError::Encoder(format!("Failed to create H.264 encoder: {}", e)))?;

        info!(
            "H.264 encoder created: {} @ {} kbps, {} fps, GOP {}",
            config.resolution, config.bitrate_kbps, config.fps, config.gop_size
        );

        Ok(Self {
            config,
            encoder,
            ready: VecDeque::new(),
            end_of_stream: false,
            skipped: 0,
        })
    }

    fn encode_picture(&mut self, picture: &PlanarFrame, pts: Timestamp) -> Result<()> {
        if picture.resolution() != self.config.resolution {
            return Err(AppError::DimensionMismatch {
                expected: self.config.resolution,
                actual: picture.resolution(),
            });
        }

        if self.config.is_refresh_point(pts) {
            self.encoder.force_intra_frame();
        }

        let width = self.config.resolution.width as usize;
        let height = self.config.resolution.height as usize;
        let yuv = YUVSlices::new(
            (picture.y_plane(), picture.u_plane(), picture.v_plane()),
            (width, height),
            picture.strides(),
        );

        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| AppError::Encoder(format!("Encode failed at pts {}: {}", pts, e)))?;

        let key_frame = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        let data = bitstream.to_vec();
        if data.is_empty() {
            self.skipped += 1;
            debug!("Rate control skipped picture {}", pts);
            return Ok(());
        }

        trace!("Encoded picture {}: {} bytes, key={}", pts, data.len(), key_frame);
        self.ready
            .push_back(EncodedPacket::new(data, pts, pts as i64, key_frame));
        Ok(())
    }
}

impl EncoderBackend for H264Encoder {
    fn name(&self) -> &str {
        "openh264"
    }

    fn send_picture(&mut self, picture: Option<(&PlanarFrame, Timestamp)>) -> Result<()> {
        if self.end_of_stream {
            return Err(AppError::Encoder(
                "H.264 encoder already received end of stream".to_string(),
            ));
        }
        match picture {
            Some((frame, pts)) => self.encode_picture(frame, pts),
            None => {
                self.end_of_stream = true;
                if self.skipped > 0 {
                    debug!("H.264 encoder skipped {} picture(s)", self.skipped);
                }
                Ok(())
            }
        }
    }

    fn receive_packet(&mut self) -> Result<ReceiveOutcome> {
        Ok(match self.ready.pop_front() {
            Some(packet) => ReceiveOutcome::Packet(packet),
            None if self.end_of_stream => ReceiveOutcome::EndOfStream,
            None => ReceiveOutcome::Again,
        })
    }

    fn config(&self) -> &EncoderConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::format::Resolution;

    fn gray_picture(resolution: Resolution, luma: u8) -> PlanarFrame {
        let mut frame = PlanarFrame::new(resolution);
        let (y, u, v) = frame.planes_mut();
        y.fill(luma);
        u.fill(128);
        v.fill(128);
        frame
    }

    fn collect(encoder: &mut H264Encoder) -> Vec<EncodedPacket> {
        let mut out = Vec::new();
        while let ReceiveOutcome::Packet(p) = encoder.receive_packet().unwrap() {
            out.push(p);
        }
        out
    }

    #[test]
    fn test_rejects_odd_resolution() {
        let config = EncoderConfig::h264(Resolution::new(161, 120), 400);
        assert!(matches!(H264Encoder::new(config), Err(AppError::Config(_))));
    }

    #[test]
    fn test_first_packet_is_keyframe() {
        let res = Resolution::new(160, 120);
        let mut encoder = H264Encoder::new(EncoderConfig::h264(res, 400)).unwrap();
        let picture = gray_picture(res, 100);

        encoder.send_picture(Some((&picture, 0))).unwrap();
        let packets = collect(&mut encoder);
        assert_eq!(packets.len(), 1);
        assert!(packets[0].key_frame);
        assert_eq!(packets[0].pts, 0);
        assert!(packets[0].data.starts_with(&[0, 0, 0, 1]));
    }

    #[test]
    fn test_flush_reports_end_of_stream() {
        let res = Resolution::new(160, 120);
        let mut encoder = H264Encoder::new(EncoderConfig::h264(res, 400)).unwrap();
        let picture = gray_picture(res, 60);

        encoder.send_picture(Some((&picture, 0))).unwrap();
        assert_eq!(encoder.reorder_depth(), 0);
        collect(&mut encoder);
        assert_eq!(encoder.receive_packet().unwrap(), ReceiveOutcome::Again);

        encoder.send_picture(None).unwrap();
        assert_eq!(encoder.receive_packet().unwrap(), ReceiveOutcome::EndOfStream);
        assert!(encoder.send_picture(Some((&picture, 1))).is_err());
    }

    #[test]
    fn test_dimension_mismatch() {
        let res = Resolution::new(160, 120);
        let mut encoder = H264Encoder::new(EncoderConfig::h264(res, 400)).unwrap();
        let picture = gray_picture(Resolution::new(320, 240), 60);
        assert!(matches!(
            encoder.send_picture(Some((&picture, 0))),
            Err(AppError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_refresh_on_gop_boundary() {
        let res = Resolution::new(160, 120);
        let config = EncoderConfig::h264(res, 2000).with_gop_size(3);
        let mut encoder = H264Encoder::new(config).unwrap();

        let mut packets = Vec::new();
        for pts in 0..4 {
            let picture = gray_picture(res, 40 + pts as u8 * 10);
            encoder.send_picture(Some((&picture, pts))).unwrap();
            packets.extend(collect(&mut encoder));
        }

        let keys: Vec<u64> = packets.iter().filter(|p| p.key_frame).map(|p| p.pts).collect();
        assert!(keys.contains(&0));
        assert!(keys.contains(&3));
    }
}
