//! Parameters of the video sender on an encode-side endpoint

use serde::Serialize;

use crate::encoding::{SendEncoding, VideoCodec};
use crate::scalability::ScalabilityMode;

pub const ABS_SEND_TIME_URI: &str =
    "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time";
pub const TRANSPORT_CC_URI: &str =
    "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01";
/// Carries spatial/temporal indices of every frame to the receiver
pub const DEPENDENCY_DESCRIPTOR_URI: &str =
    "http://www.webrtc.org/experiments/rtp-hdrext/generic-frame-descriptor-00";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DegradationPreference {
    Balanced,
    MaintainFramerate,
    MaintainResolution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
    Stopped,
}

impl ExtensionDirection {
    #[must_use]
    pub const fn as_sdp(&self) -> Option<&'static str> {
        match self {
            Self::SendRecv => Some("sendrecv"),
            Self::SendOnly => Some("sendonly"),
            Self::RecvOnly => Some("recvonly"),
            Self::Inactive => Some("inactive"),
            Self::Stopped => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderExtension {
    pub uri: String,
    pub direction: ExtensionDirection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EncodingParameters {
    pub scale_resolution_down_by: Option<f64>,
    pub scalability_mode: Option<ScalabilityMode>,
    pub codec: Option<VideoCodec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SenderParameters {
    pub encodings: Vec<EncodingParameters>,
    pub degradation_preference: DegradationPreference,
    pub header_extensions: Vec<HeaderExtension>,
}

impl SenderParameters {
    /// A sender fed by another leg's encoder; no encoder settings of its own
    #[must_use]
    pub fn passthrough() -> Self {
        Self {
            encodings: vec![EncodingParameters::default()],
            degradation_preference: DegradationPreference::Balanced,
            header_extensions: vec![
                HeaderExtension {
                    uri: ABS_SEND_TIME_URI.to_string(),
                    direction: ExtensionDirection::SendRecv,
                },
                HeaderExtension {
                    uri: TRANSPORT_CC_URI.to_string(),
                    direction: ExtensionDirection::SendRecv,
                },
                HeaderExtension {
                    uri: DEPENDENCY_DESCRIPTOR_URI.to_string(),
                    direction: ExtensionDirection::Stopped,
                },
            ],
        }
    }

    /// A sender driving a real encoder with the given settings
    #[must_use]
    pub fn encoding(send: &SendEncoding) -> Self {
        let mut params = Self::passthrough();
        params.encodings = vec![EncodingParameters {
            scale_resolution_down_by: Some(send.scale_resolution_down_by),
            scalability_mode: Some(send.scalability_mode.clone()),
            codec: None,
        }];
        params
    }

    /// Negotiate the dependency descriptor in both directions
    ///
    /// Without it the receiver never learns spatial and temporal indices.
    pub fn enable_dependency_descriptor(&mut self) {
        for ext in &mut self.header_extensions {
            if ext.uri == DEPENDENCY_DESCRIPTOR_URI {
                ext.direction = ExtensionDirection::SendRecv;
            }
        }
    }

    /// Codec of the first encoding, if one was chosen
    #[must_use]
    pub fn codec(&self) -> Option<VideoCodec> {
        self.encodings.first().and_then(|e| e.codec)
    }

    /// Header extensions that end up in the offer
    pub fn negotiated_extensions(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.header_extensions
            .iter()
            .filter_map(|ext| ext.direction.as_sdp().map(|dir| (ext.uri.as_str(), dir)))
    }
}
