//! Offer/answer/candidate exchange between the two ends of a leg
//!
//! The leg only relies on the call order and on the sender SSRC found in the
//! local description; everything else in the descriptions is opaque to it.
//! [`LoopbackEndpoint`] is an in-process implementation producing real SDP.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;
use webrtc::sdp::description::media::MediaDescription;
use webrtc::sdp::description::session::SessionDescription as Sdp;

use crate::encoding::VideoCodec;
use crate::error::SignalingError;
use crate::sender::SenderParameters;
use crate::types::{LegId, Ssrc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    fn parse(&self) -> Result<Sdp, SignalingError> {
        let mut reader = Cursor::new(self.sdp.as_bytes());
        Sdp::unmarshal(&mut reader).map_err(|e| SignalingError::Sdp(e.to_string()))
    }

    /// SSRC announced in the media section tagged `a=mid:<mid>`
    #[must_use]
    pub fn ssrc_for_mid(&self, mid: &str) -> Option<Ssrc> {
        let parsed = self.parse().ok()?;
        parsed
            .media_descriptions
            .iter()
            .find(|media| has_value_attribute(media, "mid", mid))
            .and_then(|media| {
                media
                    .attributes
                    .iter()
                    .filter(|attr| attr.key == "ssrc")
                    .find_map(|attr| attr.value.as_deref()?.split_whitespace().next()?.parse().ok())
            })
    }

    /// Codec of the first `rtpmap` in the description
    #[must_use]
    pub fn codec(&self) -> Option<VideoCodec> {
        let parsed = self.parse().ok()?;
        parsed.media_descriptions.iter().find_map(|media| {
            media
                .attributes
                .iter()
                .filter(|attr| attr.key == "rtpmap")
                .find_map(|attr| {
                    let (_, encoding) = attr.value.as_deref()?.split_once(' ')?;
                    VideoCodec::parse(encoding.split('/').next()?)
                })
        })
    }
}

fn has_value_attribute(media: &MediaDescription, key: &str, value: &str) -> bool {
    media
        .attributes
        .iter()
        .any(|attr| attr.key == key && attr.value.as_deref() == Some(value))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
}

/// One end of a leg's signaling exchange
///
/// Every call is expected to resolve eventually. There is no timeout: a call
/// that never resolves stalls the leg that made it.
#[async_trait]
pub trait SignalingEndpoint: Send + Sync {
    fn name(&self) -> &str;

    /// Apply sender settings before the offer is created
    async fn set_sender_parameters(&self, params: &SenderParameters) -> Result<(), SignalingError>;

    async fn create_offer(&self) -> Result<SessionDescription, SignalingError>;

    async fn create_answer(&self) -> Result<SessionDescription, SignalingError>;

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), SignalingError>;

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), SignalingError>;

    fn local_description(&self) -> Option<SessionDescription>;

    async fn gather_candidate(&self) -> Result<IceCandidate, SignalingError>;

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), SignalingError>;

    async fn close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointSide {
    Encode,
    Decode,
}

/// Creates the two signaling endpoints of every leg
pub trait EndpointFactory: Send + Sync {
    fn create(&self, leg: &LegId, side: EndpointSide) -> Arc<dyn SignalingEndpoint>;
}

/// Factory for in-process [`LoopbackEndpoint`]s
///
/// No two endpoints from the same factory share an SSRC.
#[derive(Debug, Default)]
pub struct LoopbackFactory {
    issued: Mutex<HashSet<Ssrc>>,
}

impl LoopbackFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_ssrc(&self) -> Ssrc {
        let mut issued = self.issued.lock();
        loop {
            let ssrc = Ssrc::random();
            if issued.insert(ssrc) {
                return ssrc;
            }
        }
    }
}

impl EndpointFactory for LoopbackFactory {
    fn create(&self, leg: &LegId, side: EndpointSide) -> Arc<dyn SignalingEndpoint> {
        Arc::new(LoopbackEndpoint::with_ssrc(leg, side, self.next_ssrc()))
    }
}

#[derive(Debug, Default)]
struct LoopbackState {
    params: Option<SenderParameters>,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    remote_candidates: Vec<IceCandidate>,
    closed: bool,
}

/// In-process signaling endpoint
pub struct LoopbackEndpoint {
    name: String,
    side: EndpointSide,
    ssrc: Ssrc,
    state: Mutex<LoopbackState>,
}

impl LoopbackEndpoint {
    #[must_use]
    pub fn new(leg: &LegId, side: EndpointSide) -> Self {
        Self::with_ssrc(leg, side, Ssrc::random())
    }

    #[must_use]
    pub fn with_ssrc(leg: &LegId, side: EndpointSide, ssrc: Ssrc) -> Self {
        let side_name = match side {
            EndpointSide::Encode => "local",
            EndpointSide::Decode => "remote",
        };
        Self {
            name: format!("{leg}/{side_name}"),
            side,
            ssrc,
            state: Mutex::new(LoopbackState::default()),
        }
    }

    /// SSRC this endpoint sends with
    #[must_use]
    pub const fn ssrc(&self) -> Ssrc {
        self.ssrc
    }

    /// Candidates received from the other end so far
    #[must_use]
    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().remote_candidates.clone()
    }

    fn describe(&self, codec: VideoCodec, params: Option<&SenderParameters>) -> String {
        let direction = match self.side {
            EndpointSide::Encode => "sendonly",
            EndpointSide::Decode => "recvonly",
        };
        let mut media = MediaDescription::new_jsep_media_description("video".to_owned(), vec![])
            .with_codec(
                codec.payload_type(),
                codec.name().to_owned(),
                codec.clock_rate(),
                0,
                String::new(),
            )
            .with_value_attribute("mid".to_owned(), "0".to_owned())
            .with_property_attribute(direction.to_owned());

        if let Some(params) = params {
            for (id, (uri, dir)) in params.negotiated_extensions().enumerate() {
                media = media.with_value_attribute("extmap".to_owned(), format!("{}/{dir} {uri}", id + 1));
            }
        }
        if self.side == EndpointSide::Encode {
            media = media.with_media_source(
                self.ssrc.0,
                self.name.clone(),
                "meshcall".to_owned(),
                "video".to_owned(),
            );
        }

        Sdp::new_jsep_session_description(false)
            .with_media(media)
            .marshal()
    }
}

#[async_trait]
impl SignalingEndpoint for LoopbackEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_sender_parameters(&self, params: &SenderParameters) -> Result<(), SignalingError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SignalingError::Closed);
        }
        state.params = Some(params.clone());
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, SignalingError> {
        let state = self.state.lock();
        if state.closed {
            return Err(SignalingError::Closed);
        }
        let params = state.params.as_ref();
        let codec = params.and_then(SenderParameters::codec).unwrap_or(VideoCodec::Vp9);
        Ok(SessionDescription {
            sdp_type: SdpType::Offer,
            sdp: self.describe(codec, params),
        })
    }

    async fn create_answer(&self) -> Result<SessionDescription, SignalingError> {
        let state = self.state.lock();
        if state.closed {
            return Err(SignalingError::Closed);
        }
        let offer = state
            .remote
            .as_ref()
            .filter(|d| d.sdp_type == SdpType::Offer)
            .ok_or_else(|| SignalingError::InvalidState("no remote offer to answer".to_string()))?;
        let codec = offer.codec().unwrap_or(VideoCodec::Vp9);
        Ok(SessionDescription {
            sdp_type: SdpType::Answer,
            sdp: self.describe(codec, state.params.as_ref()),
        })
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), SignalingError> {
        description.parse()?;
        let mut state = self.state.lock();
        if state.closed {
            return Err(SignalingError::Closed);
        }
        if description.sdp_type == SdpType::Answer && state.remote.is_none() {
            return Err(SignalingError::InvalidState(
                "answer set before remote offer".to_string(),
            ));
        }
        debug!(endpoint = %self.name, sdp_type = ?description.sdp_type, "Local description set");
        state.local = Some(description);
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), SignalingError> {
        description.parse()?;
        let mut state = self.state.lock();
        if state.closed {
            return Err(SignalingError::Closed);
        }
        if description.sdp_type == SdpType::Answer && state.local.is_none() {
            return Err(SignalingError::InvalidState(
                "remote answer without local offer".to_string(),
            ));
        }
        debug!(endpoint = %self.name, sdp_type = ?description.sdp_type, "Remote description set");
        state.remote = Some(description);
        Ok(())
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.state.lock().local.clone()
    }

    async fn gather_candidate(&self) -> Result<IceCandidate, SignalingError> {
        let state = self.state.lock();
        if state.closed {
            return Err(SignalingError::Closed);
        }
        if state.local.is_none() {
            return Err(SignalingError::InvalidState(
                "candidates gathered before local description".to_string(),
            ));
        }
        let port = 49152 + (self.ssrc.0 % 16384);
        Ok(IceCandidate {
            candidate: format!("candidate:1 1 udp 2130706431 127.0.0.1 {port} typ host"),
            sdp_mid: Some("0".to_string()),
        })
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), SignalingError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(SignalingError::Closed);
        }
        if state.remote.is_none() {
            return Err(SignalingError::InvalidState(
                "candidate added before remote description".to_string(),
            ));
        }
        state.remote_candidates.push(candidate);
        Ok(())
    }

    async fn close(&self) {
        self.state.lock().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leg() -> LegId {
        LegId::new("test/leg-0")
    }

    #[tokio::test]
    async fn test_offer_carries_ssrc_at_mid_zero() {
        let local = LoopbackEndpoint::new(&leg(), EndpointSide::Encode);
        let offer = local.create_offer().await.unwrap();
        assert_eq!(offer.sdp_type, SdpType::Offer);
        assert_eq!(offer.ssrc_for_mid("0"), Some(local.ssrc()));
        assert_eq!(offer.ssrc_for_mid("1"), None);
        assert_eq!(offer.codec(), Some(VideoCodec::Vp9));
    }

    #[tokio::test]
    async fn test_offer_uses_sender_codec() {
        let local = LoopbackEndpoint::new(&leg(), EndpointSide::Encode);
        let mut params = SenderParameters::passthrough();
        params.encodings[0].codec = Some(VideoCodec::Vp8);
        local.set_sender_parameters(&params).await.unwrap();

        let offer = local.create_offer().await.unwrap();
        assert_eq!(offer.codec(), Some(VideoCodec::Vp8));
    }

    #[tokio::test]
    async fn test_answer_requires_remote_offer() {
        let remote = LoopbackEndpoint::new(&leg(), EndpointSide::Decode);
        let err = remote.create_answer().await.unwrap_err();
        assert!(matches!(err, SignalingError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_full_exchange() {
        let local = LoopbackEndpoint::new(&leg(), EndpointSide::Encode);
        let remote = LoopbackEndpoint::new(&leg(), EndpointSide::Decode);

        let offer = local.create_offer().await.unwrap();
        local.set_local_description(offer.clone()).await.unwrap();
        remote.set_remote_description(offer).await.unwrap();
        let answer = remote.create_answer().await.unwrap();
        assert_eq!(answer.sdp_type, SdpType::Answer);
        // the receiving side announces no send stream
        assert_eq!(answer.ssrc_for_mid("0"), None);
        remote.set_local_description(answer.clone()).await.unwrap();
        local.set_remote_description(answer).await.unwrap();

        let candidate = local.gather_candidate().await.unwrap();
        remote.add_candidate(candidate.clone()).await.unwrap();
        assert_eq!(remote.remote_candidates(), vec![candidate]);
    }

    #[tokio::test]
    async fn test_candidate_before_remote_description_rejected() {
        let remote = LoopbackEndpoint::new(&leg(), EndpointSide::Decode);
        let candidate = IceCandidate {
            candidate: "candidate:1 1 udp 1 127.0.0.1 9 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
        };
        assert!(remote.add_candidate(candidate).await.is_err());
    }

    #[tokio::test]
    async fn test_closed_endpoint_rejects_calls() {
        let local = LoopbackEndpoint::new(&leg(), EndpointSide::Encode);
        local.close().await;
        assert_eq!(local.create_offer().await.unwrap_err(), SignalingError::Closed);
    }

    #[test]
    fn test_malformed_description_has_no_ssrc() {
        let description = SessionDescription {
            sdp_type: SdpType::Offer,
            sdp: "not an sdp".to_string(),
        };
        assert_eq!(description.ssrc_for_mid("0"), None);
    }

    #[tokio::test]
    async fn test_factory_never_reuses_ssrc() {
        let factory = LoopbackFactory::new();
        let mut seen = HashSet::new();
        for index in 0..64 {
            let id = LegId::new(format!("test/leg-{index}"));
            let local = factory.create(&id, EndpointSide::Encode);
            let offer = local.create_offer().await.unwrap();
            assert!(seen.insert(offer.ssrc_for_mid("0").unwrap()));
            factory.create(&id, EndpointSide::Decode);
        }
        assert_eq!(factory.issued.lock().len(), 128);
    }
}
