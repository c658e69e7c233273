//! Test doubles for the recording pipeline.
//!
//! Each double shares a probe with the test so its observations survive being
//! boxed and moved into a [`Recorder`](super::recorder::Recorder).

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::device::{DeviceStatus, FrameSource};
use super::encoder::{EncoderBackend, EncoderConfig, ReceiveOutcome};
use super::format::{PixelFormat, Resolution};
use super::frame::{EncodedPacket, PlanarFrame, RawFrame, Timestamp};
use super::sink::PacketSink;
use crate::error::{AppError, Result};

pub type Probe<T> = Arc<Mutex<T>>;

/// Observations of a [`ScriptedSource`]
#[derive(Debug, Default)]
pub struct SourceProbe {
    pub acquisitions: usize,
    pub close_calls: usize,
}

/// Device replaying a fixed list of statuses, then `Disconnected` forever
pub struct ScriptedSource {
    resolution: Resolution,
    script: VecDeque<DeviceStatus>,
    probe: Probe<SourceProbe>,
    /// Run this after every acquisition (e.g. to raise the shutdown flag)
    on_acquire: Option<Box<dyn FnMut(usize) + Send>>,
}

impl ScriptedSource {
    pub fn new(
        resolution: Resolution,
        script: impl IntoIterator<Item = DeviceStatus>,
    ) -> (Self, Probe<SourceProbe>) {
        let probe = Probe::default();
        (
            Self {
                resolution,
                script: script.into_iter().collect(),
                probe: probe.clone(),
                on_acquire: None,
            },
            probe,
        )
    }

    pub fn on_acquire(mut self, hook: impl FnMut(usize) + Send + 'static) -> Self {
        self.on_acquire = Some(Box::new(hook));
        self
    }
}

impl FrameSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Bgra
    }

    fn acquire(&mut self, frame: &mut RawFrame) -> DeviceStatus {
        let count = {
            let mut probe = self.probe.lock();
            probe.acquisitions += 1;
            probe.acquisitions
        };
        let status = self.script.pop_front().unwrap_or(DeviceStatus::Disconnected);
        if status == DeviceStatus::Ok {
            frame.data_mut().fill(count as u8);
        }
        if let Some(hook) = self.on_acquire.as_mut() {
            hook(count);
        }
        status
    }

    fn close(&mut self) -> std::io::Result<()> {
        let mut probe = self.probe.lock();
        probe.close_calls += 1;
        if probe.close_calls > 1 {
            return Err(std::io::Error::other("device closed twice"));
        }
        Ok(())
    }
}

/// Observations of a [`ReorderingBackend`]
#[derive(Debug, Default)]
pub struct BackendProbe {
    pub submitted: Vec<Timestamp>,
    pub flushed: bool,
    pub dropped: usize,
    /// Queue the next packet twice
    pub duplicate_next: bool,
    /// Fail every following `receive_packet`
    pub fail_receive: bool,
    /// Fail `send_picture` for this timestamp
    pub fail_send_at: Option<Timestamp>,
    /// Answer `Again` this many times after flush before emitting anything
    pub again_after_flush: usize,
}

/// Backend that holds back up to `depth` pictures, like a B-frame encoder
///
/// By default packets leave in presentation order. In swapping mode every
/// odd picture is held until the next one arrives and the pair is emitted
/// newest first (0, 2, 1, 4, 3, ...), like an IPB encoder.
pub struct ReorderingBackend {
    config: EncoderConfig,
    depth: usize,
    swap_pairs: bool,
    held: VecDeque<(Timestamp, Vec<u8>)>,
    ready: VecDeque<EncodedPacket>,
    emitted: u64,
    flushing: bool,
    probe: Probe<BackendProbe>,
}

impl ReorderingBackend {
    pub fn new(depth: usize) -> (Self, Probe<BackendProbe>) {
        let probe = Probe::default();
        (
            Self {
                config: EncoderConfig::default().with_max_b_frames(depth as u32),
                depth,
                swap_pairs: false,
                held: VecDeque::new(),
                ready: VecDeque::new(),
                emitted: 0,
                flushing: false,
                probe: probe.clone(),
            },
            probe,
        )
    }

    /// Emit adjacent pictures out of presentation order
    pub fn swapping() -> (Self, Probe<BackendProbe>) {
        let (mut backend, probe) = Self::new(1);
        backend.swap_pairs = true;
        (backend, probe)
    }

    fn emit(&mut self, pts: Timestamp, luma: &[u8]) {
        let mut data = pts.to_be_bytes().to_vec();
        data.extend_from_slice(&luma[..luma.len().min(8)]);
        let packet = EncodedPacket::new(
            data,
            pts,
            self.emitted as i64 - self.depth as i64,
            self.config.is_refresh_point(pts),
        );
        self.emitted += 1;
        if std::mem::take(&mut self.probe.lock().duplicate_next) {
            self.ready.push_back(packet.clone());
        }
        self.ready.push_back(packet);
    }

    fn release_oldest(&mut self) {
        if let Some((pts, luma)) = self.held.pop_front() {
            self.emit(pts, &luma);
        }
    }

    fn release_newest(&mut self) {
        if let Some((pts, luma)) = self.held.pop_back() {
            self.emit(pts, &luma);
        }
    }
}

impl EncoderBackend for ReorderingBackend {
    fn name(&self) -> &str {
        "reordering-mock"
    }

    fn send_picture(&mut self, picture: Option<(&PlanarFrame, Timestamp)>) -> Result<()> {
        if self.flushing {
            return Err(AppError::Encoder("picture after end of stream".to_string()));
        }
        match picture {
            Some((frame, pts)) => {
                {
                    let mut probe = self.probe.lock();
                    if probe.fail_send_at == Some(pts) {
                        return Err(AppError::Encoder(format!("injected failure at {}", pts)));
                    }
                    probe.submitted.push(pts);
                }
                self.held.push_back((pts, frame.y_plane().to_vec()));
                if self.swap_pairs {
                    if pts == 0 {
                        self.release_oldest();
                    } else if self.held.len() == 2 {
                        self.release_newest();
                        self.release_oldest();
                    }
                } else {
                    while self.held.len() > self.depth {
                        self.release_oldest();
                    }
                }
            }
            None => {
                self.flushing = true;
                self.probe.lock().flushed = true;
                while !self.held.is_empty() {
                    self.release_oldest();
                }
            }
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> Result<ReceiveOutcome> {
        {
            let mut probe = self.probe.lock();
            if probe.fail_receive {
                return Err(AppError::Encoder("injected receive failure".to_string()));
            }
            if self.flushing && probe.again_after_flush > 0 {
                probe.again_after_flush -= 1;
                return Ok(ReceiveOutcome::Again);
            }
        }
        Ok(match self.ready.pop_front() {
            Some(packet) => ReceiveOutcome::Packet(packet),
            None if self.flushing => ReceiveOutcome::EndOfStream,
            None => ReceiveOutcome::Again,
        })
    }

    fn reorder_depth(&self) -> usize {
        self.depth
    }

    fn config(&self) -> &EncoderConfig {
        &self.config
    }
}

impl Drop for ReorderingBackend {
    fn drop(&mut self) {
        self.probe.lock().dropped += 1;
    }
}

/// Observations of a [`MemorySink`]
#[derive(Debug, Default)]
pub struct SinkProbe {
    pub packets: Vec<EncodedPacket>,
    pub bytes: Vec<u8>,
    pub close_calls: usize,
    /// Fail the write of the n-th packet (0-based)
    pub fail_at: Option<usize>,
}

/// Sink collecting packets in memory
pub struct MemorySink {
    probe: Probe<SinkProbe>,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> (Self, Probe<SinkProbe>) {
        let probe = Probe::default();
        (
            Self {
                probe: probe.clone(),
                closed: false,
            },
            probe,
        )
    }
}

impl PacketSink for MemorySink {
    fn write(&mut self, packet: &EncodedPacket) -> Result<()> {
        if self.closed {
            return Err(AppError::Sink("write after close".to_string()));
        }
        let mut probe = self.probe.lock();
        if probe.fail_at == Some(probe.packets.len()) {
            return Err(AppError::Sink("injected write failure".to_string()));
        }
        probe.bytes.extend_from_slice(&packet.data);
        probe.packets.push(packet.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.probe.lock().close_calls += 1;
        self.closed = true;
        Ok(())
    }

    fn bytes_written(&self) -> u64 {
        self.probe.lock().bytes.len() as u64
    }
}
