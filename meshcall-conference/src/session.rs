//! Conference session
//!
//! Owns capture, the active call's topology and the encoders feeding it.
//! Dropping or resetting the session releases every leg.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::capture::{CaptureConstraints, CaptureDevice, MediaSource, Resolution};
use crate::config::SessionConfig;
use crate::encoder::SvcEncoder;
use crate::encoding::{EncodingConfig, SendEncoding};
use crate::error::{Error, Result};
use crate::layout::{plan_layout, CallLayout};
use crate::leg::{Leg, LegRole};
use crate::render::{Renderer, StreamHandle};
use crate::scalability::ScalabilityMode;
use crate::sender::SenderParameters;
use crate::signaling::{EndpointFactory, EndpointSide};
use crate::stats::{LegReport, SessionReport};
use crate::topology::{Topology, TopologyBuilder};
use crate::types::{LegId, SessionId, Ssrc};

/// Codec used for the shared screen
const DISPLAY_CODEC: &str = "VP8";

/// Screen share leg; encoded but never decoded
struct DisplayShare {
    leg: Leg,
    encoder: SvcEncoder,
    frames_dropped: u64,
}

struct ActiveCall {
    participants: usize,
    presenting: bool,
    started_at: DateTime<Utc>,
    encoding: EncodingConfig,
    layout: CallLayout,
    topology: Topology,
    encoder: SvcEncoder,
    display: Option<DisplayShare>,
}

pub struct ConferenceSession {
    id: SessionId,
    config: SessionConfig,
    capture: Arc<dyn CaptureDevice>,
    factory: Arc<dyn EndpointFactory>,
    camera: Option<MediaSource>,
    call: Option<ActiveCall>,
}

impl ConferenceSession {
    #[must_use]
    pub fn new(
        config: SessionConfig,
        capture: Arc<dyn CaptureDevice>,
        factory: Arc<dyn EndpointFactory>,
    ) -> Self {
        let id = SessionId::generate();
        info!(session = %id, codec = %config.codec, "Conference session created");
        Self {
            id,
            config,
            capture,
            factory,
            camera: None,
            call: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    /// Open the camera without audio
    pub async fn start_camera(&mut self) -> Result<&MediaSource> {
        let source = self.capture.acquire(&CaptureConstraints::camera(false)).await?;
        Ok(self.camera.insert(source))
    }

    /// Reopen the camera together with the microphone
    pub async fn mic_on(&mut self) -> Result<&MediaSource> {
        let source = self.capture.acquire(&CaptureConstraints::camera(true)).await?;
        info!(session = %self.id, "Microphone on");
        Ok(self.camera.insert(source))
    }

    pub fn camera_resolution(&self) -> Result<Resolution> {
        self.camera
            .as_ref()
            .map(MediaSource::resolution)
            .ok_or(Error::CameraNotStarted)
    }

    pub fn display_resolution(&self) -> Result<Resolution> {
        self.call
            .as_ref()
            .and_then(|call| call.display.as_ref())
            .map(|display| display.encoder.output())
            .ok_or(Error::DisplayNotStarted)
    }

    /// Show the local camera on `renderer` and wait until it plays
    pub async fn show_camera_preview(&self, renderer: &dyn Renderer) -> Result<()> {
        let camera = self.camera.as_ref().ok_or(Error::CameraNotStarted)?;
        renderer
            .attach(StreamHandle::Local {
                label: camera.label.clone(),
                resolution: camera.resolution(),
            })
            .wait()
            .await?;
        debug!(session = %self.id, "Camera preview playing");
        Ok(())
    }

    /// Encoder settings for a call of `participants` people
    pub fn encoding_config(&self, participants: usize) -> Result<EncodingConfig> {
        if participants < 2 {
            return Err(Error::InvalidConfig(format!(
                "a call needs at least 2 participants, got {participants}"
            )));
        }
        let camera = self.camera_resolution()?;
        Ok(EncodingConfig::for_participants(participants, camera.height))
    }

    /// Start a call with `participants` people, self included
    ///
    /// `renderers` takes one renderer per remote participant. A call already
    /// in progress is torn down first.
    pub async fn hold_call(
        &mut self,
        participants: usize,
        presenting: bool,
        renderers: Vec<Arc<dyn Renderer>>,
    ) -> Result<()> {
        let encoding = self.encoding_config(participants)?;
        let camera = self.camera_resolution()?;
        if self.call.is_some() {
            self.reset().await;
        }

        let layout = plan_layout(participants, presenting, self.config.viewport);
        info!(
            session = %self.id,
            participants,
            presenting,
            output_height = encoding.output_height,
            mode = %encoding.scalability_mode,
            columns = layout.grid.columns,
            rows = layout.grid.rows,
            "Holding call"
        );

        let builder = TopologyBuilder::new(
            self.id.clone(),
            self.config.codec.clone(),
            self.config.leg_channel_capacity,
            Arc::clone(&self.factory),
        );
        let topology = builder
            .build(participants - 1, &encoding.send_encoding(), renderers)
            .await?;

        let output_width = u64::from(camera.width) * u64::from(encoding.output_height)
            / u64::from(camera.height.max(1));
        let output = Resolution::new(
            u32::try_from(output_width).unwrap_or(camera.width),
            encoding.output_height,
        );
        let encoder = SvcEncoder::new(
            encoding.scalability_mode.clone(),
            topology.primary_ssrc().unwrap_or_else(Ssrc::random),
            output,
            self.config.encoder_settings(),
        );

        self.call = Some(ActiveCall {
            participants,
            presenting: false,
            started_at: Utc::now(),
            encoding,
            layout,
            topology,
            encoder,
            display: None,
        });

        if presenting {
            self.present().await?;
        }
        Ok(())
    }

    /// Share the screen in the current call
    ///
    /// The display stream runs its own VP8 `L1T3` encoder on a separate leg;
    /// everything it produces is dropped before the transport.
    pub async fn present(&mut self) -> Result<()> {
        if self.call.is_none() {
            return Err(Error::NoActiveCall);
        }
        let source = self
            .capture
            .acquire_display(&CaptureConstraints::display())
            .await?;

        let id = LegId::new(format!("{}/display", self.id));
        let mut leg = Leg::new(
            id.clone(),
            LegRole::Display,
            self.factory.create(&id, EndpointSide::Encode),
            self.factory.create(&id, EndpointSide::Decode),
            self.config.leg_channel_capacity,
        );
        let mut params = SenderParameters::encoding(&SendEncoding {
            scale_resolution_down_by: 1.0,
            scalability_mode: ScalabilityMode::l1t3(),
        });
        params.enable_dependency_descriptor();
        leg.add_transceiver(params);
        let ssrc = leg.connect(DISPLAY_CODEC).await?;

        let encoder = SvcEncoder::new(
            ScalabilityMode::l1t3(),
            ssrc.unwrap_or_else(Ssrc::random),
            source.resolution(),
            self.config.encoder_settings(),
        );

        let Some(call) = self.call.as_mut() else {
            return Err(Error::NoActiveCall);
        };
        if let Some(mut previous) = call.display.take() {
            previous.leg.close().await;
        }
        call.presenting = true;
        call.layout = plan_layout(call.participants, true, self.config.viewport);
        call.display = Some(DisplayShare {
            leg,
            encoder,
            frames_dropped: 0,
        });
        info!(session = %self.id, resolution = %source.resolution(), "Presenting");
        Ok(())
    }

    /// Encode one camera picture and push all of its layers into the call
    ///
    /// Returns how many leg writes succeeded.
    pub async fn send_picture(&mut self) -> Result<usize> {
        let call = self.call.as_mut().ok_or(Error::NoActiveCall)?;
        let mut delivered = 0;
        for frame in call.encoder.encode_next() {
            delivered += call.topology.send_frame(frame).await;
        }

        if let Some(display) = call.display.as_mut() {
            let dropped = display.encoder.encode_next().len() as u64;
            display.frames_dropped += dropped;
        }
        Ok(delivered)
    }

    /// Ask the camera encoder for a key picture next
    pub fn request_key_frame(&mut self) -> Result<()> {
        let call = self.call.as_mut().ok_or(Error::NoActiveCall)?;
        call.encoder.request_key_frame();
        Ok(())
    }

    #[must_use]
    pub fn is_in_call(&self) -> bool {
        self.call.is_some()
    }

    #[must_use]
    pub fn topology(&self) -> Option<&Topology> {
        self.call.as_ref().map(|call| &call.topology)
    }

    pub fn topology_mut(&mut self) -> Option<&mut Topology> {
        self.call.as_mut().map(|call| &mut call.topology)
    }

    #[must_use]
    pub fn layout(&self) -> Option<&CallLayout> {
        self.call.as_ref().map(|call| &call.layout)
    }

    /// Hang up, closing every leg; queued frames are discarded
    pub async fn reset(&mut self) {
        let Some(mut call) = self.call.take() else {
            return;
        };
        call.topology.close().await;
        if let Some(mut display) = call.display.take() {
            display.leg.close().await;
        }
        info!(session = %self.id, "Call reset");
    }

    /// Hang up after every queued frame was decoded and report on the call
    pub async fn finish(&mut self) -> Result<SessionReport> {
        let mut call = self.call.take().ok_or(Error::NoActiveCall)?;
        let mut legs: Vec<LegReport> = call.topology.finish().await;

        let mut display_frames_dropped = 0;
        if let Some(mut display) = call.display.take() {
            display.leg.close().await;
            display_frames_dropped = display.frames_dropped;
            legs.push(LegReport {
                leg: display.leg.id().clone(),
                role: display.leg.role(),
                state: display.leg.state(),
                ssrc: display.leg.ssrc(),
                selector: None,
                stats: display.leg.stats().snapshot(),
            });
        }

        let report = SessionReport {
            session_id: self.id.clone(),
            started_at: call.started_at,
            ended_at: Utc::now(),
            participants: call.participants,
            presenting: call.presenting,
            encoding: call.encoding,
            pictures_encoded: call.encoder.pictures_encoded(),
            display_frames_dropped,
            legs,
        };
        if report.legs.iter().any(|leg| leg.stats.transport_drops > 0) {
            warn!(session = %self.id, "Some frames were dropped by a full transport queue");
        }
        info!(
            session = %self.id,
            pictures = report.pictures_encoded,
            legs = report.legs.len(),
            "Call finished"
        );
        Ok(report)
    }
}
