//! k-SVC layer selection for one receiver
//!
//! A receiver asks for a single maximum spatial layer. Upper spatial layers
//! in a k-SVC stream only predict from lower layers at key pictures, so after
//! a key frame every layer up to the target must be decoded until the
//! receiver has seen the top layer; from the next base-layer delta frame on,
//! only the current top layer is needed.
//!
//! Frames are judged in arrival order. The transport may hand frames over in
//! assembly order instead of decode order; a reordered frame leaves the
//! selector with stale state until the next key frame. This is a known
//! limitation and is kept as-is.

use serde::Serialize;
use tracing::{trace, warn};

use crate::frame::{EncodedFrame, FrameType};
use crate::scalability::ScalabilityMode;

/// Why a frame was not forwarded to the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Spatial layer above what this receiver asked for
    AboveTargetLayer,
    /// Key frame outside the base layer; cannot start a dependency chain
    KeyFrameAboveBaseLayer,
    /// Lower layer that the current decode ceiling does not need
    NotTopLayer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Forward,
    Drop(DropReason),
}

impl Decision {
    #[must_use]
    pub const fn is_forward(&self) -> bool {
        matches!(self, Self::Forward)
    }
}

/// Mutable state of one selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerSelectorState {
    /// Highest spatial index this receiver decodes; fixed at construction
    pub target_max_spatial_index: u8,
    /// Spatial layer currently used as the decode ceiling
    pub current_top_spatial_layer: u8,
    /// A key frame started a new chain and lower layers are still needed
    pub decoding_lower_layers_on_key_frame: bool,
}

impl LayerSelectorState {
    #[must_use]
    pub const fn new(target_max_spatial_index: u8) -> Self {
        Self {
            target_max_spatial_index,
            current_top_spatial_layer: 0,
            decoding_lower_layers_on_key_frame: false,
        }
    }

    /// Decision for a frame and the state after it
    ///
    /// Pure: the same state and frame always give the same result.
    #[must_use]
    pub fn step(self, frame_type: FrameType, spatial_index: u8) -> (Decision, Self) {
        if spatial_index > self.target_max_spatial_index {
            return (Decision::Drop(DropReason::AboveTargetLayer), self);
        }

        let mut next = self;
        match frame_type {
            FrameType::Key => {
                if spatial_index != 0 {
                    return (Decision::Drop(DropReason::KeyFrameAboveBaseLayer), self);
                }
                next.decoding_lower_layers_on_key_frame = true;
            }
            FrameType::Delta if spatial_index == 0 => {
                next.decoding_lower_layers_on_key_frame = false;
            }
            FrameType::Delta => {}
        }

        if next.decoding_lower_layers_on_key_frame {
            next.current_top_spatial_layer = spatial_index;
        }

        let decision = if spatial_index == next.current_top_spatial_layer
            || next.decoding_lower_layers_on_key_frame
        {
            Decision::Forward
        } else {
            Decision::Drop(DropReason::NotTopLayer)
        };
        (decision, next)
    }
}

/// Per-receiver filter turning the full SVC stream into a decodable sub-stream
#[derive(Debug, Clone)]
pub struct LayerSelector {
    state: LayerSelectorState,
}

impl LayerSelector {
    /// Create a selector that decodes up to `target_max_spatial_index`
    #[must_use]
    pub fn new(mode: &ScalabilityMode, target_max_spatial_index: u8) -> Self {
        if !mode.uses_key_frame_dependency() {
            warn!(
                mode = %mode,
                "Unexpected scalability mode for layer selection, expected a k-SVC mode"
            );
        }
        Self {
            state: LayerSelectorState::new(target_max_spatial_index),
        }
    }

    /// Judge the next arriving frame and update the state
    pub fn observe(&mut self, frame: &EncodedFrame) -> Decision {
        let spatial_index = frame.spatial_index();
        let (decision, next) = self.state.step(frame.frame_type(), spatial_index);

        if decision == Decision::Drop(DropReason::KeyFrameAboveBaseLayer) {
            warn!(
                spatial_index,
                picture_id = frame.metadata().picture_id,
                "Key frame is only expected in the bottom spatial layer, dropping"
            );
        }
        trace!(
            spatial_index,
            frame_type = ?frame.frame_type(),
            decision = ?decision,
            top = next.current_top_spatial_layer,
            ramping_up = next.decoding_lower_layers_on_key_frame,
            "Layer selection"
        );

        self.state = next;
        decision
    }

    /// Decision `observe` would make, without updating the state
    #[must_use]
    pub fn peek(&self, frame: &EncodedFrame) -> Decision {
        self.state.step(frame.frame_type(), frame.spatial_index()).0
    }

    #[must_use]
    pub const fn state(&self) -> LayerSelectorState {
        self.state
    }

    #[must_use]
    pub const fn target_max_spatial_index(&self) -> u8 {
        self.state.target_max_spatial_index
    }
}
