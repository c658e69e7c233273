//! Frame encoder session
//!
//! Wraps an [`EncoderBackend`] in an explicit state machine:
//!
//! ```text
//! Open --submit--> Encoding --flush--> Draining --exhausted--> Closed
//! ```
//!
//! `poll` must be called until it yields `None` after every submit, and again
//! after `flush`, because a backend may hold pictures back for reordering.

use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, trace, warn};

use super::traits::{EncoderBackend, ReceiveOutcome};
use crate::error::{AppError, Result};
use crate::video::frame::{EncodedPacket, PlanarFrame, Timestamp};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    /// Created, nothing submitted yet
    Open,
    /// Accepting pictures
    Encoding,
    /// End of stream signalled, remaining packets being drained
    Draining,
    /// Drained or released; no further output
    Closed,
}

impl fmt::Display for EncoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncoderState::Open => write!(f, "open"),
            EncoderState::Encoding => write!(f, "encoding"),
            EncoderState::Draining => write!(f, "draining"),
            EncoderState::Closed => write!(f, "closed"),
        }
    }
}

/// Stateful encoder session
pub struct EncoderSession {
    backend: Option<Box<dyn EncoderBackend>>,
    state: EncoderState,
    pictures_submitted: u64,
    packets_emitted: u64,
    /// Next timestamp the session will accept
    next_pts: Timestamp,
    /// Timestamps submitted but not yet seen in an emitted packet
    pending: BTreeSet<Timestamp>,
}

impl EncoderSession {
    pub fn new(backend: Box<dyn EncoderBackend>) -> Self {
        debug!("Encoder session opened with {}", backend.name());
        Self {
            backend: Some(backend),
            state: EncoderState::Open,
            pictures_submitted: 0,
            packets_emitted: 0,
            next_pts: 0,
            pending: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    pub fn name(&self) -> &str {
        self.backend.as_deref().map(|b| b.name()).unwrap_or("released")
    }

    /// Upper bound on pictures the backend may still be holding
    pub fn reorder_depth(&self) -> usize {
        self.backend.as_deref().map(|b| b.reorder_depth()).unwrap_or(0)
    }

    fn backend_mut(&mut self) -> Result<&mut Box<dyn EncoderBackend>> {
        self.backend
            .as_mut()
            .ok_or_else(|| AppError::InvalidState("encoder session already released".to_string()))
    }

    /// Submit one picture with its timestamp
    ///
    /// Timestamps must be consecutive, starting at 0.
    pub fn submit(&mut self, picture: &PlanarFrame, pts: Timestamp) -> Result<()> {
        match self.state {
            EncoderState::Open | EncoderState::Encoding => {}
            state => {
                return Err(AppError::InvalidState(format!(
                    "cannot submit picture {} to a {} encoder",
                    pts, state
                )))
            }
        }
        if pts != self.next_pts {
            return Err(AppError::InvalidState(format!(
                "picture timestamp {} out of sequence (expected {})",
                pts, self.next_pts
            )));
        }

        trace!("Send frame {}", pts);
        self.backend_mut()?.send_picture(Some((picture, pts)))?;

        self.state = EncoderState::Encoding;
        self.pictures_submitted += 1;
        self.next_pts += 1;
        self.pending.insert(pts);
        Ok(())
    }

    /// Fetch the next ready packet, `None` if nothing is ready right now
    ///
    /// While draining, the session moves to `Closed` once the backend reports
    /// end of stream; a `None` in the `Draining` state means "not yet".
    pub fn poll(&mut self) -> Result<Option<EncodedPacket>> {
        let draining = match self.state {
            EncoderState::Open | EncoderState::Closed => return Ok(None),
            EncoderState::Encoding => false,
            EncoderState::Draining => true,
        };

        let outcome = self.backend_mut()?.receive_packet()?;
        match outcome {
            ReceiveOutcome::Packet(packet) => {
                if !self.pending.remove(&packet.pts) {
                    return Err(AppError::Encoder(format!(
                        "encoder emitted unexpected or duplicate packet for pts {}",
                        packet.pts
                    )));
                }
                // Pictures further back than the reorder window were skipped
                let cutoff = packet.pts.saturating_sub(self.reorder_depth() as u64);
                self.pending = self.pending.split_off(&cutoff);
                self.packets_emitted += 1;
                Ok(Some(packet))
            }
            // Nothing ready yet; a draining session stays open for the next poll
            ReceiveOutcome::Again => Ok(None),
            ReceiveOutcome::EndOfStream => {
                if !draining {
                    warn!("Encoder reported end of stream before flush");
                }
                self.finish_drain();
                Ok(None)
            }
        }
    }

    fn finish_drain(&mut self) {
        if !self.pending.is_empty() {
            // Skipped pictures legitimately produce no packet
            debug!(
                "Encoder drained with {} picture(s) that produced no packet",
                self.pending.len()
            );
            self.pending.clear();
        }
        debug!(
            "Encoder drained: {} pictures in, {} packets out",
            self.pictures_submitted, self.packets_emitted
        );
        self.state = EncoderState::Closed;
    }

    /// Signal end of stream; subsequent `poll` calls return the held-back packets
    ///
    /// Calling it again once draining or closed is a no-op.
    pub fn flush(&mut self) -> Result<()> {
        match self.state {
            EncoderState::Open | EncoderState::Encoding => {
                debug!("Flushing encoder ({} pending)", self.pending.len());
                self.backend_mut()?.send_picture(None)?;
                self.state = EncoderState::Draining;
                Ok(())
            }
            EncoderState::Draining | EncoderState::Closed => Ok(()),
        }
    }

    /// Release the backend. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(backend) = self.backend.take() {
            if !self.pending.is_empty() {
                warn!(
                    "Releasing encoder {} in {} state ({} picture(s) not drained)",
                    backend.name(),
                    self.state,
                    self.pending.len()
                );
            }
            debug!("Encoder {} released", backend.name());
        }
        self.state = EncoderState::Closed;
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        self.close();
    }
}
