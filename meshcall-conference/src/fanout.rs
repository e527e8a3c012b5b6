//! Fan-out of the single real encoder output to every receiver leg
//!
//! Only the primary leg owns an encoder. Each other leg gets a copy of every
//! encoded frame re-labelled with that leg's SSRC, so N receivers cost one
//! encode.

use crate::frame::EncodedFrame;
use crate::types::{LegId, Ssrc};

/// A secondary leg that receives duplicated frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutDestination {
    /// Position of the leg in the topology
    pub index: usize,
    pub leg: LegId,
    pub ssrc: Ssrc,
}

/// Frames produced for one source frame
#[derive(Debug)]
pub struct FanoutOutput {
    /// The source frame, unmodified, for the primary leg
    pub primary: EncodedFrame,
    /// One copy per destination as `(leg index, frame)`, in destination order
    pub duplicates: Vec<(usize, EncodedFrame)>,
}

#[derive(Debug, Clone, Default)]
pub struct FanoutDuplicator {
    destinations: Vec<FanoutDestination>,
}

impl FanoutDuplicator {
    #[must_use]
    pub const fn new(destinations: Vec<FanoutDestination>) -> Self {
        Self { destinations }
    }

    #[must_use]
    pub fn destinations(&self) -> &[FanoutDestination] {
        &self.destinations
    }

    /// Two-party calls have nothing to duplicate
    #[must_use]
    pub fn is_pass_through(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Duplicate one frame for every destination
    pub fn process(&self, frame: EncodedFrame) -> FanoutOutput {
        let duplicates = self
            .destinations
            .iter()
            .map(|destination| {
                (
                    destination.index,
                    frame.with_synchronization_source(destination.ssrc),
                )
            })
            .collect();
        FanoutOutput {
            primary: frame,
            duplicates,
        }
    }
}
