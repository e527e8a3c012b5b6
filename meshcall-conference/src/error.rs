use thiserror::Error;

use crate::types::{LegId, Ssrc};

/// Failure reported by a signaling endpoint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalingError {
    #[error("invalid signaling state: {0}")]
    InvalidState(String),

    #[error("malformed session description: {0}")]
    Sdp(String),

    #[error("endpoint closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Signaling failed on leg {leg}: {source}")]
    Signaling {
        leg: LegId,
        #[source]
        source: SignalingError,
    },

    #[error("Legs {first} and {second} negotiated the same SSRC {ssrc}")]
    SsrcCollision { ssrc: Ssrc, first: LegId, second: LegId },

    #[error("Renderer detached before playback started")]
    RendererDetached,

    #[error("Camera has not been started")]
    CameraNotStarted,

    #[error("Screen share has not been started")]
    DisplayNotStarted,

    #[error("No call in progress")]
    NoActiveCall,
}

pub type Result<T> = std::result::Result<T, Error>;
