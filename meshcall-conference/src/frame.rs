//! Encoded video frames as they travel between encoder, legs and decoders

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::Ssrc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameType {
    Key,
    Delta,
}

/// Scalability metadata attached to every encoded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetadata {
    /// Spatial layer, 0 is the base layer
    pub spatial_index: u8,

    /// Temporal layer, 0 is the base layer
    pub temporal_index: u8,

    /// Stream the frame belongs to at the receiver
    pub synchronization_source: Ssrc,

    /// Picture counter of the encoder; all spatial layers of one picture share it
    pub picture_id: u64,
}

/// One encoded frame: a single spatial layer of one picture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    frame_type: FrameType,
    metadata: FrameMetadata,
    payload: Bytes,
}

impl EncodedFrame {
    #[must_use]
    pub const fn new(frame_type: FrameType, metadata: FrameMetadata, payload: Bytes) -> Self {
        Self {
            frame_type,
            metadata,
            payload,
        }
    }

    #[must_use]
    pub const fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    #[must_use]
    pub fn is_key_frame(&self) -> bool {
        self.frame_type == FrameType::Key
    }

    #[must_use]
    pub const fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }

    #[must_use]
    pub const fn spatial_index(&self) -> u8 {
        self.metadata.spatial_index
    }

    #[must_use]
    pub const fn synchronization_source(&self) -> Ssrc {
        self.metadata.synchronization_source
    }

    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Copy of this frame re-labelled for another stream
    ///
    /// The payload buffer is shared, not copied; `self` is left untouched.
    #[must_use]
    pub fn with_synchronization_source(&self, ssrc: Ssrc) -> Self {
        let mut metadata = self.metadata;
        metadata.synchronization_source = ssrc;
        Self {
            frame_type: self.frame_type,
            metadata,
            payload: self.payload.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relabel_keeps_original() {
        let original = EncodedFrame::new(
            FrameType::Key,
            FrameMetadata {
                spatial_index: 0,
                temporal_index: 0,
                synchronization_source: Ssrc(1),
                picture_id: 7,
            },
            Bytes::from_static(b"picture"),
        );

        let copy = original.with_synchronization_source(Ssrc(2));

        assert_eq!(original.synchronization_source(), Ssrc(1));
        assert_eq!(copy.synchronization_source(), Ssrc(2));
        assert_eq!(copy.frame_type(), FrameType::Key);
        assert_eq!(copy.metadata().picture_id, 7);
        assert_eq!(copy.payload(), original.payload());
    }
}
