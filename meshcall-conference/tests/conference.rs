use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use meshcall_conference::{
    ConferenceSession, EncodedFrame, EncodingConfig, EndpointFactory, EndpointSide, Error,
    FrameCollector, FrameMetadata, FrameType, IceCandidate, LegId, LegRole, LegState,
    LoopbackEndpoint, LoopbackFactory, Renderer, ScalabilityMode, SdpType, SenderParameters,
    SessionConfig, SessionDescription, SessionId, SignalingEndpoint, SignalingError, Ssrc,
    SyntheticCamera, TopologyBuilder,
};

fn collectors(n: usize) -> (Vec<Arc<FrameCollector>>, Vec<Arc<dyn Renderer>>) {
    let collectors: Vec<Arc<FrameCollector>> = (0..n).map(|_| Arc::new(FrameCollector::new())).collect();
    let renderers = collectors
        .iter()
        .map(|c| Arc::clone(c) as Arc<dyn Renderer>)
        .collect();
    (collectors, renderers)
}

fn frame(frame_type: FrameType, spatial_index: u8, picture_id: u64, ssrc: Ssrc) -> EncodedFrame {
    EncodedFrame::new(
        frame_type,
        FrameMetadata {
            spatial_index,
            temporal_index: 0,
            synchronization_source: ssrc,
            picture_id,
        },
        Bytes::from_static(b"frame"),
    )
}

#[tokio::test]
async fn five_participants_get_four_selectors_at_layer_one() {
    let mut session = ConferenceSession::new(
        SessionConfig::default(),
        Arc::new(SyntheticCamera::default()),
        Arc::new(LoopbackFactory::new()),
    );
    session.start_camera().await.unwrap();

    let encoding = session.encoding_config(5).unwrap();
    assert_eq!(encoding.output_height, 360);
    assert_eq!(encoding.scalability_mode, ScalabilityMode::l2t3_key());

    let (_, renderers) = collectors(4);
    session.hold_call(5, false, renderers).await.unwrap();

    let topology = session.topology().unwrap();
    assert_eq!(topology.receiver_count(), 4);
    assert_eq!(topology.selector_count(), 4);
    assert_eq!(topology.selector_targets(), vec![1, 1, 1, 1]);
    assert_eq!(topology.top_spatial_index(), 1);
}

#[tokio::test]
async fn duplicates_carry_each_leg_ssrc() {
    let encoding = EncodingConfig::for_participants(4, 720);
    let (collectors, renderers) = collectors(3);
    let builder = TopologyBuilder::new(SessionId::from("fanout"), "VP9", 16, Arc::new(LoopbackFactory::new()));
    let mut topology = builder
        .build(3, &encoding.send_encoding(), renderers)
        .await
        .unwrap();

    let primary = topology.primary_ssrc().unwrap();
    let secondaries = topology.secondary_ssrcs();
    assert_eq!(secondaries.len(), 2);
    assert_ne!(secondaries[0], secondaries[1]);
    assert!(!secondaries.contains(&primary));

    topology.send_frame(frame(FrameType::Key, 0, 0, primary)).await;
    topology.finish().await;

    let seen: Vec<Ssrc> = collectors
        .iter()
        .map(|c| c.frames()[0].synchronization_source)
        .collect();
    assert_eq!(seen, vec![secondaries[0], secondaries[1], primary]);
}

#[tokio::test]
async fn receiver_decodes_expected_sub_stream() {
    let encoding = EncodingConfig::for_participants(3, 720);
    let (collectors, renderers) = collectors(2);
    let builder = TopologyBuilder::new(SessionId::from("e2e"), "VP9", 16, Arc::new(LoopbackFactory::new()));
    let mut topology = builder
        .build(2, &encoding.send_encoding(), renderers)
        .await
        .unwrap();
    let ssrc = topology.primary_ssrc().unwrap();

    let sequence = [
        (FrameType::Key, 0),
        (FrameType::Delta, 1),
        (FrameType::Delta, 0),
        (FrameType::Delta, 1),
        (FrameType::Delta, 0),
    ];
    for (picture_id, (frame_type, spatial_index)) in (1..).zip(sequence) {
        topology.send_frame(frame(frame_type, spatial_index, picture_id, ssrc)).await;
    }

    let reports = topology.finish().await;
    for collector in &collectors {
        let forwarded: Vec<u64> = collector.frames().iter().map(|m| m.picture_id).collect();
        assert_eq!(forwarded, vec![1, 2, 4]);
    }
    for report in &reports {
        let selector = report.selector.unwrap();
        assert_eq!(selector.current_top_spatial_layer, 1);
        assert!(!selector.decoding_lower_layers_on_key_frame);
        assert_eq!(report.stats.dropped_not_top, 2);
    }
}

#[tokio::test]
async fn full_call_reports_every_leg() {
    let mut session = ConferenceSession::new(
        SessionConfig {
            keyframe_interval: 10,
            ..SessionConfig::default()
        },
        Arc::new(SyntheticCamera::default()),
        Arc::new(LoopbackFactory::new()),
    );
    session.start_camera().await.unwrap();
    let (collectors, renderers) = collectors(3);
    session.hold_call(4, false, renderers).await.unwrap();

    for _ in 0..20 {
        session.send_picture().await.unwrap();
    }
    let report = session.finish().await.unwrap();

    assert_eq!(report.pictures_encoded, 20);
    assert_eq!(report.legs.len(), 3);
    assert_eq!(report.legs[2].role, LegRole::Primary);
    for (leg, collector) in report.legs.iter().zip(&collectors) {
        assert_eq!(leg.state, LegState::Closed);
        assert_eq!(leg.stats.frames_sent, 40);
        assert_eq!(leg.stats.frames_received, 40);
        // key pictures need both layers, other pictures only the top one
        assert_eq!(leg.stats.frames_forwarded, 22);
        assert_eq!(collector.rendered_count(), 22);
    }

    let json = report.to_json().unwrap();
    assert!(json.contains("\"scalability_mode\""));
}

#[tokio::test]
async fn picture_burst_reaches_every_leg() {
    let mut session = ConferenceSession::new(
        SessionConfig::default(),
        Arc::new(SyntheticCamera::default()),
        Arc::new(LoopbackFactory::new()),
    );
    session.start_camera().await.unwrap();
    let (_, renderers) = collectors(2);
    session.hold_call(3, false, renderers).await.unwrap();

    // 200 pictures of two layers each outrun the 256-frame transport queue
    let mut delivered = 0;
    for _ in 0..200 {
        delivered += session.send_picture().await.unwrap();
    }
    let report = session.finish().await.unwrap();

    assert_eq!(delivered, 800);
    let received: u64 = report.legs.iter().map(|leg| leg.stats.frames_received).sum();
    assert_eq!(received, 800);
    assert!(report.legs.iter().all(|leg| leg.stats.transport_drops == 0));
}

#[derive(Clone, Copy)]
enum Fault {
    RejectAnswer,
    StallOffer,
}

struct FaultyEndpoint {
    inner: Arc<LoopbackEndpoint>,
    fault: Option<Fault>,
}

#[async_trait]
impl SignalingEndpoint for FaultyEndpoint {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn set_sender_parameters(&self, params: &SenderParameters) -> Result<(), SignalingError> {
        self.inner.set_sender_parameters(params).await
    }

    async fn create_offer(&self) -> Result<SessionDescription, SignalingError> {
        if matches!(self.fault, Some(Fault::StallOffer)) {
            futures::future::pending::<()>().await;
        }
        self.inner.create_offer().await
    }

    async fn create_answer(&self) -> Result<SessionDescription, SignalingError> {
        if matches!(self.fault, Some(Fault::RejectAnswer)) {
            return Err(SignalingError::InvalidState("answer rejected".to_string()));
        }
        self.inner.create_answer().await
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<(), SignalingError> {
        self.inner.set_local_description(description).await
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), SignalingError> {
        self.inner.set_remote_description(description).await
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.inner.local_description()
    }

    async fn gather_candidate(&self) -> Result<IceCandidate, SignalingError> {
        self.inner.gather_candidate().await
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), SignalingError> {
        self.inner.add_candidate(candidate).await
    }

    async fn close(&self) {
        self.inner.close().await;
    }
}

/// Injects `fault` into the leg whose id ends with `target`
///
/// Keeps every endpoint it hands out so tests can look at signaling progress.
struct FaultyFactory {
    target: &'static str,
    fault: Fault,
    created: Mutex<Vec<(LegId, EndpointSide, Arc<LoopbackEndpoint>)>>,
}

impl FaultyFactory {
    fn new(target: &'static str, fault: Fault) -> Self {
        Self {
            target,
            fault,
            created: Mutex::new(Vec::new()),
        }
    }

    fn endpoint(&self, leg: &str, side: EndpointSide) -> Arc<LoopbackEndpoint> {
        self.created
            .lock()
            .iter()
            .find(|(id, s, _)| id.as_str() == leg && *s == side)
            .map(|(_, _, endpoint)| Arc::clone(endpoint))
            .unwrap()
    }
}

impl EndpointFactory for FaultyFactory {
    fn create(&self, leg: &LegId, side: EndpointSide) -> Arc<dyn SignalingEndpoint> {
        let fault = leg.as_str().ends_with(self.target).then_some(self.fault);
        let inner = Arc::new(LoopbackEndpoint::new(leg, side));
        self.created.lock().push((leg.clone(), side, Arc::clone(&inner)));
        Arc::new(FaultyEndpoint { inner, fault })
    }
}

#[tokio::test]
async fn signaling_failure_fails_the_build() {
    let encoding = EncodingConfig::for_participants(4, 720);
    let (_, renderers) = collectors(3);
    let factory = FaultyFactory::new("leg-1", Fault::RejectAnswer);
    let builder = TopologyBuilder::new(SessionId::from("faulty"), "VP9", 16, Arc::new(factory));

    let err = builder
        .build(3, &encoding.send_encoding(), renderers)
        .await
        .err()
        .unwrap();
    match err {
        Error::Signaling { leg, source } => {
            assert_eq!(leg.as_str(), "faulty/leg-1");
            assert_eq!(source, SignalingError::InvalidState("answer rejected".to_string()));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn stalled_signaling_blocks_the_build() {
    let encoding = EncodingConfig::for_participants(3, 720);
    let (_, renderers) = collectors(2);
    let factory = Arc::new(FaultyFactory::new("leg-0", Fault::StallOffer));
    let builder = TopologyBuilder::new(
        SessionId::from("stalled"),
        "VP9",
        16,
        Arc::clone(&factory) as Arc<dyn EndpointFactory>,
    );

    let result = tokio::time::timeout(
        Duration::from_millis(50),
        builder.build(2, &encoding.send_encoding(), renderers),
    )
    .await;
    assert!(result.is_err());

    // leg-0 never got past its offer
    let stalled = factory.endpoint("stalled/leg-0", EndpointSide::Encode);
    assert!(stalled.local_description().is_none());

    // leg-1 finished its whole exchange in the meantime
    let local = factory.endpoint("stalled/leg-1", EndpointSide::Encode);
    let remote = factory.endpoint("stalled/leg-1", EndpointSide::Decode);
    assert_eq!(local.local_description().unwrap().sdp_type, SdpType::Offer);
    assert_eq!(remote.local_description().unwrap().sdp_type, SdpType::Answer);
    assert_eq!(local.remote_candidates().len(), 1);
    assert_eq!(remote.remote_candidates().len(), 1);
}
