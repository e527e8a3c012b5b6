//! Fan-out topology construction
//!
//! One call with N receivers is modelled as N legs. The last leg is the
//! primary and carries the real encoder output; every other leg is a
//! secondary fed by the [`FanoutDuplicator`]. Each decode side gets its own
//! [`LayerSelector`] in front of its renderer.

use futures::future::try_join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::encoding::SendEncoding;
use crate::error::{Error, Result};
use crate::fanout::{FanoutDestination, FanoutDuplicator, FanoutOutput};
use crate::frame::EncodedFrame;
use crate::leg::{Leg, LegRole};
use crate::render::{ReadySignal, Renderer, StreamHandle};
use crate::scalability::ScalabilityMode;
use crate::selector::{LayerSelector, LayerSelectorState};
use crate::sender::SenderParameters;
use crate::signaling::{EndpointFactory, EndpointSide};
use crate::stats::LegReport;
use crate::types::{LegId, SessionId, Ssrc};

/// Counters for frames entering the topology
#[derive(Debug, Default)]
pub struct TopologyStats {
    frames_in: AtomicU64,
    duplicates_out: AtomicU64,
    writes_failed: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopologyStatsSnapshot {
    pub frames_in: u64,
    pub duplicates_out: u64,
    pub writes_failed: u64,
}

impl TopologyStats {
    #[must_use]
    pub fn snapshot(&self) -> TopologyStatsSnapshot {
        TopologyStatsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            duplicates_out: self.duplicates_out.load(Ordering::Relaxed),
            writes_failed: self.writes_failed.load(Ordering::Relaxed),
        }
    }
}

pub struct TopologyBuilder {
    session: SessionId,
    codec: String,
    channel_capacity: usize,
    factory: Arc<dyn EndpointFactory>,
}

impl TopologyBuilder {
    #[must_use]
    pub fn new(
        session: SessionId,
        codec: impl Into<String>,
        channel_capacity: usize,
        factory: Arc<dyn EndpointFactory>,
    ) -> Self {
        Self {
            session,
            codec: codec.into(),
            channel_capacity,
            factory,
        }
    }

    fn new_leg(&self, index: usize, role: LegRole) -> Leg {
        let id = LegId::for_index(&self.session, index);
        let local = self.factory.create(&id, EndpointSide::Encode);
        let remote = self.factory.create(&id, EndpointSide::Decode);
        Leg::new(id, role, local, remote, self.channel_capacity)
    }

    /// Build and connect `receiver_count` legs
    ///
    /// `renderers` holds one renderer per receiver, in leg order. Returns once
    /// every leg finished signaling; the first signaling error fails the whole
    /// build.
    pub async fn build(
        &self,
        receiver_count: usize,
        encoding: &SendEncoding,
        renderers: Vec<Arc<dyn Renderer>>,
    ) -> Result<Topology> {
        if receiver_count == 0 {
            return Err(Error::InvalidConfig(
                "a call needs at least one receiver".to_string(),
            ));
        }
        if renderers.len() != receiver_count {
            return Err(Error::InvalidConfig(format!(
                "expected {receiver_count} renderers, got {}",
                renderers.len()
            )));
        }

        let mode = encoding.scalability_mode.clone();
        let top = mode.top_spatial_index();
        let primary_index = receiver_count - 1;
        let cancel = CancellationToken::new();

        let mut legs = Vec::with_capacity(receiver_count);
        let mut decoders = Vec::with_capacity(receiver_count);
        let mut ready = Vec::with_capacity(receiver_count);

        for (index, renderer) in renderers.into_iter().enumerate() {
            let (role, mut params) = if index == primary_index {
                (LegRole::Primary, SenderParameters::encoding(encoding))
            } else {
                (LegRole::Secondary, SenderParameters::passthrough())
            };
            params.enable_dependency_descriptor();

            let mut leg = self.new_leg(index, role);
            leg.add_transceiver(params);

            ready.push(Some(renderer.attach(StreamHandle::Remote {
                leg: leg.id().clone(),
            })));
            let decode = leg
                .attach_decoder(LayerSelector::new(&mode, top), renderer)
                .ok_or_else(|| Error::InvalidConfig(format!("decoder already attached to {}", leg.id())))?;
            decoders.push(tokio::spawn(decode.run(cancel.child_token())));
            legs.push(leg);
        }

        let codec = self.codec.as_str();
        let ssrcs = match try_join_all(legs.iter_mut().map(|leg| leg.connect(codec))).await {
            Ok(ssrcs) => ssrcs,
            Err(e) => {
                cancel.cancel();
                return Err(e);
            }
        };

        if let Err(e) = check_unique_ssrcs(&legs, &ssrcs) {
            cancel.cancel();
            return Err(e);
        }

        let destinations: Vec<FanoutDestination> = legs
            .iter()
            .zip(&ssrcs)
            .enumerate()
            .filter(|(_, (leg, _))| leg.role() == LegRole::Secondary)
            .filter_map(|(index, (leg, ssrc))| {
                ssrc.map(|ssrc| FanoutDestination {
                    index,
                    leg: leg.id().clone(),
                    ssrc,
                })
            })
            .collect();

        let connected = legs.iter().filter(|leg| leg.is_connected()).count();
        if connected < receiver_count {
            warn!(
                session = %self.session,
                connected,
                receivers = receiver_count,
                "Some legs did not complete setup and will not carry frames"
            );
        }
        info!(
            session = %self.session,
            receivers = receiver_count,
            mode = %mode,
            top_spatial_index = top,
            duplicates = destinations.len(),
            "Topology ready"
        );

        Ok(Topology {
            session: self.session.clone(),
            mode,
            legs,
            duplicator: FanoutDuplicator::new(destinations),
            decoders,
            ready,
            cancel,
            stats: Arc::new(TopologyStats::default()),
        })
    }
}

/// Every connected leg must carry its own SSRC, or receivers could not tell
/// the duplicated streams apart.
fn check_unique_ssrcs(legs: &[Leg], ssrcs: &[Option<Ssrc>]) -> Result<()> {
    let mut seen: HashMap<Ssrc, &LegId> = HashMap::with_capacity(ssrcs.len());
    for (leg, ssrc) in legs.iter().zip(ssrcs) {
        let Some(ssrc) = *ssrc else { continue };
        if let Some(first) = seen.insert(ssrc, leg.id()) {
            return Err(Error::SsrcCollision {
                ssrc,
                first: first.clone(),
                second: leg.id().clone(),
            });
        }
    }
    Ok(())
}

/// A connected set of legs for one call
pub struct Topology {
    session: SessionId,
    mode: ScalabilityMode,
    legs: Vec<Leg>,
    duplicator: FanoutDuplicator,
    decoders: Vec<JoinHandle<LayerSelectorState>>,
    ready: Vec<Option<ReadySignal>>,
    cancel: CancellationToken,
    stats: Arc<TopologyStats>,
}

impl Topology {
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.legs.len()
    }

    #[must_use]
    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    #[must_use]
    pub const fn scalability_mode(&self) -> &ScalabilityMode {
        &self.mode
    }

    #[must_use]
    pub const fn top_spatial_index(&self) -> u8 {
        self.mode.top_spatial_index()
    }

    #[must_use]
    pub fn selector_count(&self) -> usize {
        self.legs.iter().filter(|leg| leg.selector_target().is_some()).count()
    }

    #[must_use]
    pub fn selector_targets(&self) -> Vec<u8> {
        self.legs.iter().filter_map(Leg::selector_target).collect()
    }

    fn primary(&self) -> Option<&Leg> {
        self.legs.last()
    }

    #[must_use]
    pub fn primary_ssrc(&self) -> Option<Ssrc> {
        self.primary().and_then(Leg::ssrc)
    }

    /// SSRCs the duplicator rewrites to, in leg order
    #[must_use]
    pub fn secondary_ssrcs(&self) -> Vec<Ssrc> {
        self.duplicator.destinations().iter().map(|d| d.ssrc).collect()
    }

    /// "Now playing" signal of the renderer on leg `index`; can be taken once
    pub fn take_ready_signal(&mut self, index: usize) -> Option<ReadySignal> {
        self.ready.get_mut(index).and_then(Option::take)
    }

    #[must_use]
    pub fn stats(&self) -> TopologyStatsSnapshot {
        self.stats.snapshot()
    }

    /// Push one encoded frame into every leg
    ///
    /// Waits while a leg's transport is full. Returns the number of legs that
    /// accepted the frame.
    pub async fn send_frame(&self, frame: EncodedFrame) -> usize {
        self.stats.frames_in.fetch_add(1, Ordering::Relaxed);
        let output = self.duplicator.process(frame);
        self.stats
            .duplicates_out
            .fetch_add(output.duplicates.len() as u64, Ordering::Relaxed);
        self.dispatch(output).await
    }

    async fn dispatch(&self, output: FanoutOutput) -> usize {
        let mut delivered = 0;
        for (index, duplicate) in output.duplicates {
            let Some(leg) = self.legs.get(index) else {
                self.stats.writes_failed.fetch_add(1, Ordering::Relaxed);
                continue;
            };
            if leg.write(duplicate).await {
                delivered += 1;
            } else {
                self.stats.writes_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        if let Some(primary) = self.primary() {
            if primary.write(output.primary).await {
                delivered += 1;
            } else {
                self.stats.writes_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        delivered
    }

    /// Stop the input, let every decode side drain, then close all legs
    pub async fn finish(&mut self) -> Vec<LegReport> {
        for leg in &mut self.legs {
            leg.shut_transport();
        }

        let mut selectors = Vec::with_capacity(self.decoders.len());
        for handle in std::mem::take(&mut self.decoders) {
            match handle.await {
                Ok(state) => selectors.push(Some(state)),
                Err(e) => {
                    warn!(session = %self.session, error = %e, "Decode task failed");
                    selectors.push(None);
                }
            }
        }

        let mut reports = Vec::with_capacity(self.legs.len());
        for (leg, selector) in self.legs.iter_mut().zip(selectors) {
            leg.close().await;
            reports.push(LegReport {
                leg: leg.id().clone(),
                role: leg.role(),
                state: leg.state(),
                ssrc: leg.ssrc(),
                selector,
                stats: leg.stats().snapshot(),
            });
        }
        info!(session = %self.session, stats = ?self.stats.snapshot(), "Topology finished");
        reports
    }

    /// Tear down every leg; frames still in flight are discarded
    pub async fn close(&mut self) {
        self.cancel.cancel();
        for leg in &mut self.legs {
            leg.close().await;
        }
        self.decoders.clear();
        debug!(session = %self.session, "Topology closed");
    }
}

impl Drop for Topology {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
