//! Per-leg counters and the end-of-call report

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::encoding::EncodingConfig;
use crate::leg::{LegRole, LegState};
use crate::selector::{DropReason, LayerSelectorState};
use crate::types::{LegId, SessionId, Ssrc};

/// Counters shared between the encode and decode side of one leg
#[derive(Debug, Default)]
pub struct LegStats {
    frames_sent: AtomicU64,
    transport_drops: AtomicU64,
    not_connected_drops: AtomicU64,
    frames_received: AtomicU64,
    frames_forwarded: AtomicU64,
    dropped_above_target: AtomicU64,
    dropped_malformed: AtomicU64,
    dropped_not_top: AtomicU64,
}

impl LegStats {
    pub fn record_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Decode side of the transport is gone
    pub fn record_transport_drop(&self) {
        self.transport_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Frame offered before the leg finished signaling
    pub fn record_not_connected_drop(&self) {
        self.not_connected_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.frames_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::AboveTargetLayer => &self.dropped_above_target,
            DropReason::KeyFrameAboveBaseLayer => &self.dropped_malformed,
            DropReason::NotTopLayer => &self.dropped_not_top,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> LegStatsSnapshot {
        LegStatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            transport_drops: self.transport_drops.load(Ordering::Relaxed),
            not_connected_drops: self.not_connected_drops.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_forwarded: self.frames_forwarded.load(Ordering::Relaxed),
            dropped_above_target: self.dropped_above_target.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dropped_not_top: self.dropped_not_top.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LegStatsSnapshot {
    pub frames_sent: u64,
    pub transport_drops: u64,
    pub not_connected_drops: u64,
    pub frames_received: u64,
    pub frames_forwarded: u64,
    pub dropped_above_target: u64,
    pub dropped_malformed: u64,
    pub dropped_not_top: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegReport {
    pub leg: LegId,
    pub role: LegRole,
    pub state: LegState,
    pub ssrc: Option<Ssrc>,
    /// Selector state when the decode side stopped, if the leg has one
    pub selector: Option<LayerSelectorState>,
    pub stats: LegStatsSnapshot,
}

/// Summary of one call
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub participants: usize,
    pub presenting: bool,
    pub encoding: EncodingConfig,
    pub pictures_encoded: u64,
    pub display_frames_dropped: u64,
    pub legs: Vec<LegReport>,
}

impl SessionReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
