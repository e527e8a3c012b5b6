//! Transport legs
//!
//! A leg is one encode-to-decode path between two simulated endpoints:
//! - the encode side, with its video sender and signaling endpoint
//! - the decode side, running a [`LayerSelector`] in front of a renderer
//! - a bounded in-process channel standing in for the network; writers wait
//!   while it is full
//!
//! Signaling walks the leg through `Created -> OfferSent -> AnswerReceived ->
//! Connected`; a leg never moves backwards.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::encoding::VideoCodec;
use crate::error::{Error, Result, SignalingError};
use crate::frame::EncodedFrame;
use crate::render::Renderer;
use crate::selector::{Decision, LayerSelector, LayerSelectorState};
use crate::sender::{DegradationPreference, SenderParameters};
use crate::signaling::SignalingEndpoint;
use crate::stats::LegStats;
use crate::types::{LegId, Ssrc};

/// Media section whose SSRC identifies the leg's video stream
const VIDEO_MID: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegState {
    Created,
    OfferSent,
    AnswerReceived,
    Connected,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegRole {
    /// Carries the real encoder output
    Primary,
    /// Carries frames duplicated from the primary leg
    Secondary,
    /// Screen share; encoded but never decoded
    Display,
}

pub struct Leg {
    id: LegId,
    role: LegRole,
    state: LegState,
    local: Arc<dyn SignalingEndpoint>,
    remote: Arc<dyn SignalingEndpoint>,
    senders: Vec<SenderParameters>,
    ssrc: Option<Ssrc>,
    transport_tx: Option<mpsc::Sender<EncodedFrame>>,
    transport_rx: Option<mpsc::Receiver<EncodedFrame>>,
    selector_target: Option<u8>,
    stats: Arc<LegStats>,
}

impl Leg {
    #[must_use]
    pub fn new(
        id: LegId,
        role: LegRole,
        local: Arc<dyn SignalingEndpoint>,
        remote: Arc<dyn SignalingEndpoint>,
        channel_capacity: usize,
    ) -> Self {
        let (transport_tx, transport_rx) = mpsc::channel(channel_capacity.max(1));
        debug!(leg = %id, role = ?role, "Leg created");
        Self {
            id,
            role,
            state: LegState::Created,
            local,
            remote,
            senders: Vec::new(),
            ssrc: None,
            transport_tx: Some(transport_tx),
            transport_rx: Some(transport_rx),
            selector_target: None,
            stats: Arc::new(LegStats::default()),
        }
    }

    #[must_use]
    pub const fn id(&self) -> &LegId {
        &self.id
    }

    #[must_use]
    pub const fn role(&self) -> LegRole {
        self.role
    }

    #[must_use]
    pub const fn state(&self) -> LegState {
        self.state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == LegState::Connected
    }

    /// SSRC of the encode side, known once signaling completed
    #[must_use]
    pub const fn ssrc(&self) -> Option<Ssrc> {
        self.ssrc
    }

    #[must_use]
    pub fn senders(&self) -> &[SenderParameters] {
        &self.senders
    }

    /// Target spatial index of the attached selector
    #[must_use]
    pub const fn selector_target(&self) -> Option<u8> {
        self.selector_target
    }

    #[must_use]
    pub fn stats(&self) -> Arc<LegStats> {
        Arc::clone(&self.stats)
    }

    /// Add a video sender to the encode side
    pub fn add_transceiver(&mut self, params: SenderParameters) {
        self.senders.push(params);
    }

    fn advance(&mut self, next: LegState) {
        debug_assert!(next > self.state, "leg state must not regress");
        debug!(leg = %self.id, from = ?self.state, to = ?next, "Leg state change");
        self.state = next;
    }

    fn signaling_error(&self, source: SignalingError) -> Error {
        warn!(leg = %self.id, state = ?self.state, error = %source, "Signaling failed");
        Error::Signaling {
            leg: self.id.clone(),
            source,
        }
    }

    /// Negotiate the leg with `codec` and bring it to `Connected`
    ///
    /// Returns the SSRC of the encode side. A leg with other than exactly one
    /// sender, or an unsupported codec, is left in `Created` and `Ok(None)` is
    /// returned; only signaling failures are errors.
    pub async fn connect(&mut self, codec: &str) -> Result<Option<Ssrc>> {
        if self.senders.len() != 1 {
            warn!(leg = %self.id, senders = self.senders.len(), "Unexpected senders length");
            return Ok(None);
        }
        let Some(codec) = VideoCodec::parse(codec) else {
            warn!(leg = %self.id, codec, "Unexpected codec");
            return Ok(None);
        };

        let sender = &mut self.senders[0];
        sender.degradation_preference = DegradationPreference::MaintainResolution;
        if let Some(encoding) = sender.encodings.first_mut() {
            encoding.codec = Some(codec);
        }
        let params = sender.clone();

        let local = Arc::clone(&self.local);
        let remote = Arc::clone(&self.remote);

        local
            .set_sender_parameters(&params)
            .await
            .map_err(|e| self.signaling_error(e))?;

        let offer = local.create_offer().await.map_err(|e| self.signaling_error(e))?;
        local
            .set_local_description(offer)
            .await
            .map_err(|e| self.signaling_error(e))?;
        self.advance(LegState::OfferSent);

        let offer = local.local_description().ok_or_else(|| {
            self.signaling_error(SignalingError::InvalidState(
                "local description missing after offer".to_string(),
            ))
        })?;
        remote
            .set_remote_description(offer)
            .await
            .map_err(|e| self.signaling_error(e))?;
        let answer = remote.create_answer().await.map_err(|e| self.signaling_error(e))?;
        remote
            .set_local_description(answer.clone())
            .await
            .map_err(|e| self.signaling_error(e))?;
        local
            .set_remote_description(answer)
            .await
            .map_err(|e| self.signaling_error(e))?;
        self.advance(LegState::AnswerReceived);

        let local_candidate = local.gather_candidate().await.map_err(|e| self.signaling_error(e))?;
        remote
            .add_candidate(local_candidate)
            .await
            .map_err(|e| self.signaling_error(e))?;
        let remote_candidate = remote.gather_candidate().await.map_err(|e| self.signaling_error(e))?;
        local
            .add_candidate(remote_candidate)
            .await
            .map_err(|e| self.signaling_error(e))?;
        self.advance(LegState::Connected);

        self.ssrc = local
            .local_description()
            .and_then(|description| description.ssrc_for_mid(VIDEO_MID));
        if self.ssrc.is_none() {
            warn!(leg = %self.id, "No SSRC found in local description");
        }

        info!(leg = %self.id, role = ?self.role, codec = %codec, ssrc = ?self.ssrc, "Leg connected");
        Ok(self.ssrc)
    }

    /// Hand a frame to the transport
    ///
    /// Waits while the transport queue is full, so frames are never lost in
    /// transit. Frames offered before the leg is connected, or after the decode
    /// side went away, are dropped and counted.
    pub async fn write(&self, frame: EncodedFrame) -> bool {
        if self.state != LegState::Connected {
            self.stats.record_not_connected_drop();
            return false;
        }
        let Some(tx) = &self.transport_tx else {
            self.stats.record_transport_drop();
            return false;
        };
        if tx.send(frame).await.is_err() {
            self.stats.record_transport_drop();
            return false;
        }
        self.stats.record_sent();
        true
    }

    /// Attach a selector and renderer to the decode side
    ///
    /// Returns `None` if the decode side was already attached.
    pub fn attach_decoder(
        &mut self,
        selector: LayerSelector,
        renderer: Arc<dyn Renderer>,
    ) -> Option<DecodeSide> {
        let receiver = self.transport_rx.take()?;
        self.selector_target = Some(selector.target_max_spatial_index());
        Some(DecodeSide {
            leg: self.id.clone(),
            receiver,
            selector,
            renderer,
            stats: Arc::clone(&self.stats),
        })
    }

    /// Stop accepting frames; frames already queued still reach the decoder
    pub fn shut_transport(&mut self) {
        self.transport_tx = None;
    }

    /// Close both endpoints and release the transport
    pub async fn close(&mut self) {
        if self.state == LegState::Closed {
            return;
        }
        self.transport_tx = None;
        self.transport_rx = None;
        self.local.close().await;
        self.remote.close().await;
        self.advance(LegState::Closed);
    }
}

/// Receiving end of a leg: transport input -> selector -> renderer
pub struct DecodeSide {
    leg: LegId,
    receiver: mpsc::Receiver<EncodedFrame>,
    selector: LayerSelector,
    renderer: Arc<dyn Renderer>,
    stats: Arc<LegStats>,
}

impl DecodeSide {
    fn handle(&mut self, frame: &EncodedFrame) {
        self.stats.record_received();
        match self.selector.observe(frame) {
            Decision::Forward => {
                self.stats.record_forwarded();
                self.renderer.render(frame);
            }
            Decision::Drop(reason) => self.stats.record_dropped(reason),
        }
    }

    /// Process frames until the transport closes or `cancel` fires
    ///
    /// Returns the selector state at the end.
    pub async fn run(mut self, cancel: CancellationToken) -> LayerSelectorState {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                frame = self.receiver.recv() => match frame {
                    Some(frame) => self.handle(&frame),
                    None => break,
                },
            }
        }
        debug!(leg = %self.leg, stats = ?self.stats.snapshot(), "Decode side stopped");
        self.selector.state()
    }
}
