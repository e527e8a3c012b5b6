//! Renderer seam and a recording renderer
//!
//! A renderer is told which stream it shows and answers with a one-shot
//! [`ReadySignal`] that fires once playback starts.

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::capture::Resolution;
use crate::error::{Error, Result};
use crate::frame::{EncodedFrame, FrameMetadata};
use crate::types::LegId;

/// "Now playing" notification, awaited at most once
#[derive(Debug)]
pub struct ReadySignal(oneshot::Receiver<()>);

/// Sending half of a [`ReadySignal`]
#[derive(Debug)]
pub struct ReadyNotifier(Option<oneshot::Sender<()>>);

impl ReadySignal {
    #[must_use]
    pub fn pair() -> (ReadyNotifier, Self) {
        let (tx, rx) = oneshot::channel();
        (ReadyNotifier(Some(tx)), Self(rx))
    }

    /// Wait until playback starts
    ///
    /// Fails if the renderer goes away without ever starting playback.
    pub async fn wait(self) -> Result<()> {
        self.0.await.map_err(|_| Error::RendererDetached)
    }
}

impl ReadyNotifier {
    /// Fire the signal; later calls are no-ops
    pub fn notify(&mut self) {
        if let Some(tx) = self.0.take() {
            // receiver may already be gone, nobody is waiting then
            let _ = tx.send(());
        }
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.0.is_some()
    }
}

/// What a renderer is attached to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamHandle {
    /// Local capture, already producing pictures
    Local { label: String, resolution: Resolution },
    /// Decoded output of a receiver leg
    Remote { leg: LegId },
}

pub trait Renderer: Send + Sync {
    fn attach(&self, stream: StreamHandle) -> ReadySignal;

    fn render(&self, frame: &EncodedFrame);
}

#[derive(Debug, Default)]
struct CollectorState {
    stream: Option<StreamHandle>,
    notifier: Option<ReadyNotifier>,
    frames: Vec<FrameMetadata>,
}

/// Renderer that records the metadata of every frame it is given
#[derive(Debug, Default)]
pub struct FrameCollector {
    state: Mutex<CollectorState>,
}

impl FrameCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stream(&self) -> Option<StreamHandle> {
        self.state.lock().stream.clone()
    }

    #[must_use]
    pub fn frames(&self) -> Vec<FrameMetadata> {
        self.state.lock().frames.clone()
    }

    #[must_use]
    pub fn rendered_count(&self) -> usize {
        self.state.lock().frames.len()
    }
}

impl Renderer for FrameCollector {
    fn attach(&self, stream: StreamHandle) -> ReadySignal {
        let (mut notifier, signal) = ReadySignal::pair();
        let mut state = self.state.lock();
        // local capture plays as soon as it is attached
        if matches!(stream, StreamHandle::Local { .. }) {
            notifier.notify();
        }
        state.stream = Some(stream);
        state.notifier = Some(notifier);
        state.frames.clear();
        signal
    }

    fn render(&self, frame: &EncodedFrame) {
        let mut state = self.state.lock();
        state.frames.push(*frame.metadata());
        if let Some(notifier) = state.notifier.as_mut() {
            notifier.notify();
        }
    }
}
