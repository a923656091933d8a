// Watch session: one poller, one latch, one engine, one output surface.
// Owns the whole lifecycle: dropping or shutting it down stops the poller
// and destroys any active decoding session.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::PlayerEngine;
use crate::hls::SessionEvent;
use crate::latch::ManifestLatch;
use crate::poller::{PollerConfig, PollerHandle, PollerSnapshot, StatusPoller, StatusSource};
use crate::quality::QualityMode;
use crate::session::{SessionFactory, SessionOptions};

#[derive(Debug, Clone, Default)]
pub struct WatchConfig {
    pub poller: PollerConfig,
    pub options: SessionOptions,
}

/// Handle to a running watch session.
///
/// Each watch view owns exactly one of these; there is no sharing of pollers
/// or decoding sessions across videos.
pub struct WatchSession {
    snapshots: watch::Receiver<PollerSnapshot>,
    quality: mpsc::UnboundedSender<QualityMode>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchSession {
    /// Spawn the session driver.
    ///
    /// `session_events` is the event stream of the decoding sessions built by
    /// `factory`; segment bytes are forwarded to `output` in playback order.
    pub fn start(
        source: Arc<dyn StatusSource>,
        video_id: impl Into<String>,
        factory: Box<dyn SessionFactory>,
        session_events: mpsc::Receiver<SessionEvent>,
        output: mpsc::Sender<Bytes>,
        config: WatchConfig,
    ) -> Self {
        let video_id = video_id.into();
        let poller = StatusPoller::spawn(source, video_id.clone(), config.poller.clone());
        let snapshots = poller.subscribe();
        let (quality_tx, quality_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let driver = Driver {
            video_id,
            poller,
            latch: ManifestLatch::new(),
            engine: PlayerEngine::with_options(factory, config.options),
            session_events,
            output: Some(output),
            token: token.clone(),
        };
        let task = tokio::spawn(driver.run(quality_rx));

        Self {
            snapshots,
            quality: quality_tx,
            token,
            task,
        }
    }

    /// Latest poller snapshot stream, for status display.
    pub fn snapshots(&self) -> watch::Receiver<PollerSnapshot> {
        self.snapshots.clone()
    }

    /// Request a quality mode change; applied by the driver in order.
    pub fn set_quality(&self, mode: QualityMode) {
        let _ = self.quality.send(mode);
    }

    /// Stop polling, destroy any active session, and wait for the driver to
    /// finish its cleanup.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        let _ = (&mut self.task).await;
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

struct Driver {
    video_id: String,
    poller: PollerHandle,
    latch: ManifestLatch,
    engine: PlayerEngine,
    session_events: mpsc::Receiver<SessionEvent>,
    /// Dropped on stream end so the consumer sees a closed channel.
    output: Option<mpsc::Sender<Bytes>>,
    token: CancellationToken,
}

impl Driver {
    async fn run(mut self, mut quality_rx: mpsc::UnboundedReceiver<QualityMode>) {
        let mut updates = self.poller.subscribe();
        let mut polling_done = false;
        let mut events_done = false;

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,

                changed = updates.changed(), if !polling_done => {
                    if changed.is_err() {
                        // Poller ended on its own (stall); playback, if any,
                        // keeps running on the already-latched manifest.
                        polling_done = true;
                        continue;
                    }
                    let snapshot = updates.borrow_and_update().clone();
                    self.on_snapshot(snapshot).await;
                }

                Some(mode) = quality_rx.recv() => {
                    self.engine.set_quality(mode).await;
                }

                event = self.session_events.recv(), if !events_done => {
                    match event {
                        Some(event) => self.on_session_event(event).await,
                        None => events_done = true,
                    }
                }
            }
        }

        // Mandatory cleanup: no leaked poller, no leaked session.
        self.engine.shutdown().await;
        self.poller.shutdown().await;
        debug!(video_id = %self.video_id, "watch session closed");
    }

    async fn on_snapshot(&mut self, snapshot: PollerSnapshot) {
        if let Some(status) = &snapshot.status {
            self.latch.observe(status);
        }
        match self.engine.try_attach(&self.latch, snapshot.ready).await {
            Ok(_) => {}
            Err(e) => {
                // A failed attach leaves no session behind; the next status
                // update drives another attempt.
                warn!(video_id = %self.video_id, error = %e, "attach failed; will retry on next status update");
            }
        }
    }

    async fn on_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Data(bytes) => {
                let Some(output) = self.output.as_ref() else {
                    return;
                };
                if output.send(bytes).await.is_err() {
                    warn!(video_id = %self.video_id, "output consumer dropped; cancelling watch session");
                    self.token.cancel();
                }
            }
            SessionEvent::LevelSwitched { index } => {
                debug!(video_id = %self.video_id, index, "session switched level");
            }
            SessionEvent::Ended => {
                info!(video_id = %self.video_id, "stream ended");
                self.output.take();
            }
            SessionEvent::Fatal(error) => {
                let kind = error.fatal_kind();
                warn!(video_id = %self.video_id, error = %error, ?kind, "fatal session error");
                self.engine.handle_fatal_error(kind).await;
            }
        }
    }
}
