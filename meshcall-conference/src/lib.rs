//! meshcall conference fan-out
//!
//! Simulates a multi-party call in which one scalable (SVC) camera encoder
//! feeds every remote participant without a forwarding server. Each encoded
//! frame is duplicated once per receiver leg, and every receiver filters the
//! layered stream down to what it can decode.
//!
//! ## Architecture
//!
//! - **`ConferenceSession`**: capture, call setup and teardown
//! - **`TopologyBuilder`** / **`Topology`**: N legs, concurrent signaling, frame push
//! - **`FanoutDuplicator`**: per-leg copies of the primary encoder output with rewritten SSRC
//! - **`LayerSelector`**: per-receiver k-SVC spatial layer filter
//! - **`Leg`**: encode side, decode side and the in-process transport between them
//!
//! ## Data flow
//!
//! ```text
//! capture -> SvcEncoder -> FanoutDuplicator -> N legs -> N LayerSelectors -> N renderers
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use meshcall_conference::{ConferenceSession, FrameCollector, LoopbackFactory, SessionConfig, SyntheticCamera};
//!
//! let mut session = ConferenceSession::new(
//!     SessionConfig::default(),
//!     Arc::new(SyntheticCamera::default()),
//!     Arc::new(LoopbackFactory::new()),
//! );
//! session.start_camera().await?;
//! let renderers = (0..4).map(|_| Arc::new(FrameCollector::new()) as _).collect();
//! session.hold_call(5, false, renderers).await?;
//! session.send_picture().await?;
//! let report = session.finish().await?;
//! ```

mod capture;
mod config;
mod encoder;
mod encoding;
mod error;
mod fanout;
mod frame;
mod layout;
mod leg;
mod render;
mod scalability;
mod selector;
mod sender;
mod session;
mod signaling;
mod stats;
mod topology;
mod types;

pub use capture::{
    AudioConstraints, CaptureConstraints, CaptureDevice, DimensionConstraint, DisplaySurface,
    FacingMode, MediaSource, Resolution, SyntheticCamera, VideoConstraints, VideoTrackSettings,
};
pub use config::SessionConfig;
pub use encoder::{EncoderSettings, SvcEncoder};
pub use encoding::{EncodingConfig, SendEncoding, VideoCodec};
pub use error::{Error, Result, SignalingError};
pub use fanout::{FanoutDestination, FanoutDuplicator, FanoutOutput};
pub use frame::{EncodedFrame, FrameMetadata, FrameType};
pub use layout::{compute_grid, plan_layout, CallLayout, GridLayout, PreviewPlacement, Viewport};
pub use leg::{DecodeSide, Leg, LegRole, LegState};
pub use render::{FrameCollector, ReadyNotifier, ReadySignal, Renderer, StreamHandle};
pub use scalability::ScalabilityMode;
pub use selector::{Decision, DropReason, LayerSelector, LayerSelectorState};
pub use sender::{
    DegradationPreference, EncodingParameters, ExtensionDirection, HeaderExtension,
    SenderParameters, DEPENDENCY_DESCRIPTOR_URI,
};
pub use session::ConferenceSession;
pub use signaling::{
    EndpointFactory, EndpointSide, IceCandidate, LoopbackEndpoint, LoopbackFactory, SdpType,
    SessionDescription, SignalingEndpoint,
};
pub use stats::{LegReport, LegStats, LegStatsSnapshot, SessionReport};
pub use topology::{Topology, TopologyBuilder, TopologyStats, TopologyStatsSnapshot};
pub use types::{LegId, SessionId, Ssrc};
