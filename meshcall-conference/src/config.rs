//! Conference session configuration

use serde::{Deserialize, Serialize};

use crate::encoder::EncoderSettings;
use crate::layout::Viewport;

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Codec negotiated on every camera leg
    pub codec: String,
    /// Capacity of each leg's transport queue (frames)
    pub leg_channel_capacity: usize,
    /// Area the video grid is laid out in
    pub viewport: Viewport,
    /// Pictures between two key frames
    pub keyframe_interval: u64,
    /// Payload size of a base layer frame (bytes)
    pub layer_payload_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let encoder = EncoderSettings::default();
        Self {
            codec: "VP9".to_string(),
            leg_channel_capacity: 256,
            viewport: Viewport {
                width: 1920,
                height: 1080,
            },
            keyframe_interval: encoder.keyframe_interval,
            layer_payload_bytes: encoder.layer_payload_bytes,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn encoder_settings(&self) -> EncoderSettings {
        EncoderSettings {
            keyframe_interval: self.keyframe_interval,
            layer_payload_bytes: self.layer_payload_bytes,
        }
    }
}
