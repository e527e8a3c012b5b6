//! Simulated scalable video encoder
//!
//! Emits one frame per spatial layer for every picture, base layer first,
//! following the layer structure of the configured scalability mode: a key
//! picture starts with a key frame at S0 and its upper layers are delta
//! frames predicted from the layer below.

use bytes::Bytes;
use tracing::debug;

use crate::capture::Resolution;
use crate::frame::{EncodedFrame, FrameMetadata, FrameType};
use crate::scalability::ScalabilityMode;
use crate::types::Ssrc;

#[derive(Debug, Clone)]
pub struct EncoderSettings {
    pub keyframe_interval: u64,
    /// Payload size of the base layer; each layer above is four times larger
    pub layer_payload_bytes: usize,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            keyframe_interval: 90,
            layer_payload_bytes: 1200,
        }
    }
}

#[derive(Debug)]
pub struct SvcEncoder {
    mode: ScalabilityMode,
    ssrc: Ssrc,
    output: Resolution,
    settings: EncoderSettings,
    picture_id: u64,
    key_frame_requested: bool,
}

impl SvcEncoder {
    #[must_use]
    pub fn new(mode: ScalabilityMode, ssrc: Ssrc, output: Resolution, settings: EncoderSettings) -> Self {
        debug!(
            mode = %mode,
            ssrc = %ssrc,
            output = %output,
            keyframe_interval = settings.keyframe_interval,
            "Encoder configured"
        );
        Self {
            mode,
            ssrc,
            output,
            settings,
            picture_id: 0,
            key_frame_requested: true,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> &ScalabilityMode {
        &self.mode
    }

    #[must_use]
    pub const fn ssrc(&self) -> Ssrc {
        self.ssrc
    }

    /// Resolution of the top spatial layer
    #[must_use]
    pub const fn output(&self) -> Resolution {
        self.output
    }

    /// Pictures encoded so far
    #[must_use]
    pub const fn pictures_encoded(&self) -> u64 {
        self.picture_id
    }

    /// Make the next picture a key picture
    pub fn request_key_frame(&mut self) {
        self.key_frame_requested = true;
    }

    fn temporal_index(&self, picture_id: u64) -> u8 {
        // L1T3 style pattern 0,2,1,2 and 0,1 for two layers
        match self.mode.temporal_layers() {
            3 => [0, 2, 1, 2][(picture_id % 4) as usize],
            2 => (picture_id % 2) as u8,
            _ => 0,
        }
    }

    /// Encode the next picture into one frame per spatial layer
    pub fn encode_next(&mut self) -> Vec<EncodedFrame> {
        let picture_id = self.picture_id;
        let interval = self.settings.keyframe_interval.max(1);
        let key_picture = self.key_frame_requested || picture_id % interval == 0;
        self.key_frame_requested = false;
        self.picture_id += 1;

        let temporal_index = if key_picture { 0 } else { self.temporal_index(picture_id) };

        (0..self.mode.spatial_layers())
            .map(|spatial_index| {
                let frame_type = if key_picture && spatial_index == 0 {
                    FrameType::Key
                } else {
                    FrameType::Delta
                };
                let size = self.settings.layer_payload_bytes << (2 * u32::from(spatial_index));
                EncodedFrame::new(
                    frame_type,
                    FrameMetadata {
                        spatial_index,
                        temporal_index,
                        synchronization_source: self.ssrc,
                        picture_id,
                    },
                    Bytes::from(vec![spatial_index; size]),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder(mode: &str, keyframe_interval: u64) -> SvcEncoder {
        SvcEncoder::new(
            ScalabilityMode::parse(mode),
            Ssrc(77),
            Resolution::new(640, 360),
            EncoderSettings {
                keyframe_interval,
                layer_payload_bytes: 10,
            },
        )
    }

    #[test]
    fn test_key_picture_structure() {
        let mut encoder = encoder("L2T3_KEY", 30);
        let frames = encoder.encode_next();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].frame_type(), FrameType::Key);
        assert_eq!(frames[0].spatial_index(), 0);
        assert_eq!(frames[1].frame_type(), FrameType::Delta);
        assert_eq!(frames[1].spatial_index(), 1);
        assert_eq!(frames[0].payload().len(), 10);
        assert_eq!(frames[1].payload().len(), 40);
        assert!(frames.iter().all(|f| f.synchronization_source() == Ssrc(77)));
    }

    #[test]
    fn test_keyframe_interval_and_temporal_pattern() {
        let mut encoder = encoder("L2T3_KEY", 4);
        let pictures: Vec<Vec<EncodedFrame>> = (0..8).map(|_| encoder.encode_next()).collect();

        let key_pictures: Vec<u64> = pictures
            .iter()
            .filter(|p| p[0].is_key_frame())
            .map(|p| p[0].metadata().picture_id)
            .collect();
        assert_eq!(key_pictures, vec![0, 4]);

        let temporal: Vec<u8> = pictures.iter().map(|p| p[0].metadata().temporal_index).collect();
        assert_eq!(temporal, vec![0, 2, 1, 2, 0, 2, 1, 2]);
        assert_eq!(encoder.pictures_encoded(), 8);
    }

    #[test]
    fn test_requested_key_frame() {
        let mut encoder = encoder("L1T3", 100);
        encoder.encode_next();
        assert!(!encoder.encode_next()[0].is_key_frame());

        encoder.request_key_frame();
        let frames = encoder.encode_next();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_key_frame());
        assert_eq!(frames[0].metadata().temporal_index, 0);
    }
}
