//! Encoder parameters chosen from the size of the call

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scalability::ScalabilityMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoCodec {
    Vp8,
    Vp9,
}

impl VideoCodec {
    /// Case-insensitive lookup of a codec name; only VP8 and VP9 are supported
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "VP8" => Some(Self::Vp8),
            "VP9" => Some(Self::Vp9),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Vp8 => "VP8",
            Self::Vp9 => "VP9",
        }
    }

    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Vp8 => "video/VP8",
            Self::Vp9 => "video/VP9",
        }
    }

    #[must_use]
    pub const fn payload_type(&self) -> u8 {
        match self {
            Self::Vp8 => 96,
            Self::Vp9 => 98,
        }
    }

    #[must_use]
    pub const fn clock_rate(&self) -> u32 {
        90_000
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Camera encoder configuration for a call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodingConfig {
    pub codec: VideoCodec,
    pub input_height: u32,
    pub output_height: u32,
    pub scalability_mode: ScalabilityMode,
}

impl EncodingConfig {
    /// Pick output height and layering for `participants` people (self included)
    ///
    /// | participants | height       | mode       |
    /// |--------------|--------------|------------|
    /// | 2            | camera       | `L1T3`     |
    /// | 3..=8        | 360          | `L2T3_KEY` |
    /// | 9..=16       | 270          | `L2T3_KEY` |
    /// | 17+          | 135          | `L1T3`     |
    #[must_use]
    pub fn for_participants(participants: usize, camera_height: u32) -> Self {
        let (output_height, scalability_mode) = match participants {
            0..=2 => (camera_height, ScalabilityMode::l1t3()),
            3..=8 => (360, ScalabilityMode::l2t3_key()),
            9..=16 => (270, ScalabilityMode::l2t3_key()),
            _ => (135, ScalabilityMode::l1t3()),
        };
        Self {
            codec: VideoCodec::Vp9,
            input_height: camera_height,
            output_height,
            scalability_mode,
        }
    }

    #[must_use]
    pub fn scale_resolution_down_by(&self) -> f64 {
        f64::from(self.input_height) / f64::from(self.output_height)
    }

    #[must_use]
    pub fn send_encoding(&self) -> SendEncoding {
        SendEncoding {
            scale_resolution_down_by: self.scale_resolution_down_by(),
            scalability_mode: self.scalability_mode.clone(),
        }
    }
}

/// What the real encoder on the primary leg is told
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendEncoding {
    pub scale_resolution_down_by: f64,
    pub scalability_mode: ScalabilityMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_parse() {
        assert_eq!(VideoCodec::parse("vp9"), Some(VideoCodec::Vp9));
        assert_eq!(VideoCodec::parse("VP8"), Some(VideoCodec::Vp8));
        assert_eq!(VideoCodec::parse("H264"), None);
    }

    #[test]
    fn test_participant_bands() {
        let two = EncodingConfig::for_participants(2, 720);
        assert_eq!(two.output_height, 720);
        assert_eq!(two.scalability_mode.name(), "L1T3");
        assert!((two.scale_resolution_down_by() - 1.0).abs() < f64::EPSILON);

        let five = EncodingConfig::for_participants(5, 720);
        assert_eq!(five.output_height, 360);
        assert_eq!(five.scalability_mode.name(), "L2T3_KEY");
        assert!((five.scale_resolution_down_by() - 2.0).abs() < f64::EPSILON);

        let eight = EncodingConfig::for_participants(8, 1080);
        assert_eq!(eight.output_height, 360);

        let nine = EncodingConfig::for_participants(9, 1080);
        assert_eq!(nine.output_height, 270);
        assert_eq!(nine.scalability_mode.name(), "L2T3_KEY");
        assert!((nine.scale_resolution_down_by() - 4.0).abs() < f64::EPSILON);

        let sixteen = EncodingConfig::for_participants(16, 720);
        assert_eq!(sixteen.output_height, 270);

        let many = EncodingConfig::for_participants(25, 1080);
        assert_eq!(many.output_height, 135);
        assert_eq!(many.scalability_mode.name(), "L1T3");
        assert_eq!(many.codec, VideoCodec::Vp9);
    }

    #[test]
    fn test_send_encoding() {
        let send = EncodingConfig::for_participants(5, 720).send_encoding();
        assert!((send.scale_resolution_down_by - 2.0).abs() < f64::EPSILON);
        assert_eq!(send.scalability_mode.top_spatial_index(), 1);
    }
}
