// Adaptive Player Engine: owns at most one decoding session, attaches it to
// the latched manifest exactly once, and walks the recovery ladder on fatal
// errors.

use tracing::{debug, info, warn};

use crate::error::{FatalErrorKind, PlaybackError};
use crate::latch::ManifestLatch;
use crate::quality::{QualityMode, select_level};
use crate::session::{AbrSession, SessionFactory, SessionOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No session exists. Attach conditions are re-evaluated from here.
    Uninitialized,
    /// A session (or native playback) is bound to the surface.
    Attached,
    /// A recovery operation is in flight.
    Recovering,
    /// The owner disposed of the engine; terminal.
    Destroyed,
}

pub struct PlayerEngine {
    factory: Box<dyn SessionFactory>,
    options: SessionOptions,
    session: Option<Box<dyn AbrSession>>,
    state: EngineState,
    native: bool,
    /// Set after an unrecoverable fatal error: the owner must remount
    /// (`reset`) before another attach is allowed, so the state machine
    /// cannot loop straight back into a broken session.
    needs_remount: bool,
    mode: QualityMode,
}

impl PlayerEngine {
    pub fn new(factory: Box<dyn SessionFactory>) -> Self {
        Self::with_options(factory, SessionOptions::default())
    }

    pub fn with_options(factory: Box<dyn SessionFactory>, options: SessionOptions) -> Self {
        Self {
            factory,
            options,
            session: None,
            state: EngineState::Uninitialized,
            native: false,
            needs_remount: false,
            mode: QualityMode::Auto,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_attached(&self) -> bool {
        self.state == EngineState::Attached
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Whether playback was delegated to a natively-decoding surface.
    pub fn is_native(&self) -> bool {
        self.native
    }

    pub fn quality(&self) -> QualityMode {
        self.mode
    }

    /// Attach once the preconditions hold: a latched manifest, readiness, and
    /// no existing session. Anything else is a quiet no-op, which makes this
    /// safe to drive from every poller update.
    ///
    /// Returns `true` exactly when an attachment happened.
    pub async fn try_attach(
        &mut self,
        latch: &ManifestLatch,
        ready: bool,
    ) -> Result<bool, PlaybackError> {
        if self.state != EngineState::Uninitialized || self.session.is_some() {
            return Ok(false);
        }
        if self.needs_remount {
            return Ok(false);
        }
        let Some(manifest) = latch.get() else {
            return Ok(false);
        };
        if !ready {
            return Ok(false);
        }

        if self.factory.native_playback() {
            self.factory.attach_native(manifest)?;
            self.native = true;
            self.state = EngineState::Attached;
            info!(manifest = %manifest, "attached manifest to natively-decoding surface");
            return Ok(true);
        }

        if !self.factory.is_supported() {
            debug!("surface supports neither native nor engine playback; staying detached");
            return Ok(false);
        }

        let mut session = self.factory.create(&self.options)?;
        if let Err(e) = session.load(manifest).await {
            // A session that failed to load never counts as attached; destroy
            // the half-built one so a later attempt starts clean.
            session.destroy().await;
            return Err(e);
        }
        self.session = Some(session);
        self.state = EngineState::Attached;
        info!(manifest = %manifest, "decoding session attached");
        self.apply_quality().await;
        Ok(true)
    }

    /// Walk the recovery ladder for a fatal session error.
    ///
    /// Network class reloads in place, media class runs decoder recovery; in
    /// both cases the session keeps its identity. Anything else destroys the
    /// session and returns the engine to `Uninitialized` with the remount
    /// guard set: no re-attach happens until the owner calls [`reset`]
    /// (external remount) and the attach conditions hold again.
    ///
    /// [`reset`]: Self::reset
    pub async fn handle_fatal_error(&mut self, kind: FatalErrorKind) {
        if self.state == EngineState::Destroyed {
            return;
        }
        match kind {
            FatalErrorKind::Network => {
                self.recover(kind, "restarting load after network error")
                    .await;
            }
            FatalErrorKind::Media => {
                self.recover(kind, "running media error recovery").await;
            }
            FatalErrorKind::Other => {
                warn!("unrecoverable fatal error; destroying decoding session");
                self.teardown_session().await;
                self.native = false;
                self.needs_remount = true;
                self.state = EngineState::Uninitialized;
            }
        }
    }

    async fn recover(&mut self, kind: FatalErrorKind, what: &'static str) {
        let Some(session) = self.session.as_mut() else {
            // Native playback has no session to operate on; the surface owns
            // its own recovery.
            return;
        };
        self.state = EngineState::Recovering;
        warn!("{what}");
        let result = match kind {
            FatalErrorKind::Network => session.start_load().await,
            FatalErrorKind::Media => session.recover_media_error().await,
            FatalErrorKind::Other => unreachable!("recover() is only called for recoverable kinds"),
        };
        match result {
            Ok(()) => {
                self.state = EngineState::Attached;
            }
            Err(e) => {
                // Recovery itself failing is beyond the ladder; escalate to
                // teardown.
                warn!(error = %e, "recovery failed; destroying decoding session");
                self.teardown_session().await;
                self.needs_remount = true;
                self.state = EngineState::Uninitialized;
            }
        }
    }

    /// Apply a quality mode change. Auto returns the session to adaptive
    /// selection; a fixed height pins the exact level, or the nearest one by
    /// height when no exact rendition exists.
    pub async fn set_quality(&mut self, mode: QualityMode) {
        self.mode = mode;
        self.apply_quality().await;
    }

    async fn apply_quality(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        match self.mode {
            QualityMode::Auto => {
                debug!("quality mode: automatic bitrate");
                session.set_auto_level();
            }
            QualityMode::Fixed { height } => {
                let levels = session.levels();
                match select_level(&levels, height) {
                    Some(index) => {
                        debug!(height, index, level_height = levels[index].height, "pinning level");
                        session.set_level(index);
                    }
                    None => {
                        warn!(height, "no levels available to pin; leaving mode pending");
                    }
                }
            }
        }
    }

    /// External remount: clear the post-teardown guard so the attach
    /// conditions are evaluated again. A no-op while a session exists or
    /// after disposal.
    pub fn reset(&mut self) {
        if self.state == EngineState::Uninitialized && self.session.is_none() {
            self.needs_remount = false;
        }
    }

    /// Dispose of the engine. The session is destroyed and its handle cleared
    /// before this returns; the engine is terminal afterwards.
    pub async fn shutdown(&mut self) {
        self.teardown_session().await;
        self.state = EngineState::Destroyed;
    }

    async fn teardown_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.destroy().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use url::Url;
    use vodio_api::PlaybackStatus;

    use crate::quality::Level;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Load(String),
        StartLoad,
        RecoverMediaError,
        SetAutoLevel,
        SetLevel(usize),
        Destroy,
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Call>>,
        sessions_created: AtomicUsize,
        sessions_destroyed: AtomicUsize,
    }

    impl Recorder {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    struct FakeSession {
        recorder: Arc<Recorder>,
        levels: Vec<Level>,
        fail_loads: Arc<AtomicU32>,
    }

    #[async_trait]
    impl AbrSession for FakeSession {
        async fn load(&mut self, manifest: &Url) -> Result<(), PlaybackError> {
            if self.fail_loads.load(Ordering::Relaxed) > 0 {
                self.fail_loads.fetch_sub(1, Ordering::Relaxed);
                return Err(PlaybackError::ManifestFetch {
                    url: manifest.to_string(),
                    reason: "connection refused".to_owned(),
                    retryable: true,
                });
            }
            self.recorder.push(Call::Load(manifest.to_string()));
            Ok(())
        }

        async fn start_load(&mut self) -> Result<(), PlaybackError> {
            self.recorder.push(Call::StartLoad);
            Ok(())
        }

        async fn recover_media_error(&mut self) -> Result<(), PlaybackError> {
            self.recorder.push(Call::RecoverMediaError);
            Ok(())
        }

        fn set_auto_level(&mut self) {
            self.recorder.push(Call::SetAutoLevel);
        }

        fn set_level(&mut self, index: usize) {
            self.recorder.push(Call::SetLevel(index));
        }

        fn levels(&self) -> Vec<Level> {
            self.levels.clone()
        }

        async fn destroy(&mut self) {
            self.recorder.push(Call::Destroy);
            self.recorder.sessions_destroyed.fetch_add(1, Ordering::Relaxed);
        }
    }

    struct FakeFactory {
        recorder: Arc<Recorder>,
        levels: Vec<Level>,
        supported: bool,
        fail_loads: Arc<AtomicU32>,
    }

    impl FakeFactory {
        fn new(recorder: Arc<Recorder>) -> Self {
            Self {
                recorder,
                levels: vec![
                    Level {
                        uri: "480p/index.m3u8".into(),
                        height: 480,
                        bandwidth: 1_400_000,
                    },
                    Level {
                        uri: "720p/index.m3u8".into(),
                        height: 720,
                        bandwidth: 2_800_000,
                    },
                    Level {
                        uri: "1080p/index.m3u8".into(),
                        height: 1080,
                        bandwidth: 5_000_000,
                    },
                ],
                supported: true,
                fail_loads: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    impl SessionFactory for FakeFactory {
        fn is_supported(&self) -> bool {
            self.supported
        }

        fn create(
            &mut self,
            _options: &SessionOptions,
        ) -> Result<Box<dyn AbrSession>, PlaybackError> {
            self.recorder.sessions_created.fetch_add(1, Ordering::Relaxed);
            Ok(Box::new(FakeSession {
                recorder: self.recorder.clone(),
                levels: self.levels.clone(),
                fail_loads: self.fail_loads.clone(),
            }))
        }
    }

    fn ready_latch() -> ManifestLatch {
        let status: PlaybackStatus = serde_json::from_value(serde_json::json!({
            "videoId": "v1",
            "status": "completed",
            "progress": 100,
            "playbackReady": true,
            "masterUrl": "https://cdn.example/v1/master.m3u8",
        }))
        .unwrap();
        let mut latch = ManifestLatch::new();
        latch.observe(&status);
        latch
    }

    fn engine_with(recorder: &Arc<Recorder>) -> PlayerEngine {
        PlayerEngine::new(Box::new(FakeFactory::new(recorder.clone())))
    }

    #[tokio::test]
    async fn attaches_exactly_once() {
        let recorder = Arc::new(Recorder::default());
        let mut engine = engine_with(&recorder);
        let latch = ready_latch();

        assert!(engine.try_attach(&latch, true).await.unwrap());
        assert_eq!(engine.state(), EngineState::Attached);

        // Every further update is a no-op.
        assert!(!engine.try_attach(&latch, true).await.unwrap());
        assert_eq!(recorder.sessions_created.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn does_not_attach_without_manifest_or_readiness() {
        let recorder = Arc::new(Recorder::default());
        let mut engine = engine_with(&recorder);

        assert!(!engine.try_attach(&ManifestLatch::new(), true).await.unwrap());
        assert!(!engine.try_attach(&ready_latch(), false).await.unwrap());
        assert_eq!(recorder.sessions_created.load(Ordering::Relaxed), 0);
        assert_eq!(engine.state(), EngineState::Uninitialized);
    }

    #[tokio::test]
    async fn unsupported_surface_is_a_no_op() {
        let recorder = Arc::new(Recorder::default());
        let mut factory = FakeFactory::new(recorder.clone());
        factory.supported = false;
        let mut engine = PlayerEngine::new(Box::new(factory));

        assert!(!engine.try_attach(&ready_latch(), true).await.unwrap());
        assert_eq!(recorder.sessions_created.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn network_error_recovers_without_teardown() {
        let recorder = Arc::new(Recorder::default());
        let mut engine = engine_with(&recorder);
        engine.try_attach(&ready_latch(), true).await.unwrap();

        engine.handle_fatal_error(FatalErrorKind::Network).await;

        assert_eq!(engine.state(), EngineState::Attached);
        assert!(engine.has_session(), "session identity must survive");
        assert_eq!(recorder.sessions_destroyed.load(Ordering::Relaxed), 0);
        assert!(recorder.calls().contains(&Call::StartLoad));
    }

    #[tokio::test]
    async fn media_error_recovers_without_teardown() {
        let recorder = Arc::new(Recorder::default());
        let mut engine = engine_with(&recorder);
        engine.try_attach(&ready_latch(), true).await.unwrap();

        engine.handle_fatal_error(FatalErrorKind::Media).await;

        assert_eq!(engine.state(), EngineState::Attached);
        assert!(engine.has_session());
        assert_eq!(recorder.sessions_destroyed.load(Ordering::Relaxed), 0);
        assert!(recorder.calls().contains(&Call::RecoverMediaError));
    }

    #[tokio::test]
    async fn unclassified_error_destroys_and_permits_fresh_attach() {
        let recorder = Arc::new(Recorder::default());
        let mut engine = engine_with(&recorder);
        let latch = ready_latch();
        engine.try_attach(&latch, true).await.unwrap();

        engine.handle_fatal_error(FatalErrorKind::Other).await;

        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!(!engine.has_session(), "handle must be cleared");
        assert_eq!(recorder.sessions_destroyed.load(Ordering::Relaxed), 1);

        // No automatic re-attach, even though manifest and readiness still
        // hold; an explicit remount is required.
        assert!(!engine.try_attach(&latch, true).await.unwrap());
        assert_eq!(recorder.sessions_created.load(Ordering::Relaxed), 1);

        engine.reset();
        assert!(engine.try_attach(&latch, true).await.unwrap());
        assert_eq!(recorder.sessions_created.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn failed_load_cleans_up_the_half_built_session() {
        let recorder = Arc::new(Recorder::default());
        let mut factory = FakeFactory::new(recorder.clone());
        factory.fail_loads.store(1, Ordering::Relaxed);
        let mut engine = PlayerEngine::new(Box::new(factory));
        let latch = ready_latch();

        let err = engine.try_attach(&latch, true).await.unwrap_err();
        assert_eq!(err.fatal_kind(), FatalErrorKind::Network);
        assert!(!engine.has_session());
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(recorder.sessions_destroyed.load(Ordering::Relaxed), 1);

        // The next update retries and succeeds.
        assert!(engine.try_attach(&latch, true).await.unwrap());
        assert_eq!(engine.state(), EngineState::Attached);
    }

    #[tokio::test]
    async fn quality_pins_exact_then_nearest() {
        let recorder = Arc::new(Recorder::default());
        let mut engine = engine_with(&recorder);
        engine.try_attach(&ready_latch(), true).await.unwrap();

        engine.set_quality(QualityMode::fixed(720)).await;
        engine.set_quality(QualityMode::fixed(1440)).await;
        engine.set_quality(QualityMode::Auto).await;

        let calls = recorder.calls();
        // Attach applies the default Auto mode first.
        assert_eq!(
            calls,
            vec![
                Call::Load("https://cdn.example/v1/master.m3u8".into()),
                Call::SetAutoLevel,
                Call::SetLevel(1),
                Call::SetLevel(2),
                Call::SetAutoLevel,
            ]
        );
    }

    #[tokio::test]
    async fn quality_change_before_attach_is_applied_on_attach() {
        let recorder = Arc::new(Recorder::default());
        let mut engine = engine_with(&recorder);

        engine.set_quality(QualityMode::fixed(480)).await;
        engine.try_attach(&ready_latch(), true).await.unwrap();

        assert!(recorder.calls().contains(&Call::SetLevel(0)));
    }

    #[tokio::test]
    async fn shutdown_is_terminal() {
        let recorder = Arc::new(Recorder::default());
        let mut engine = engine_with(&recorder);
        let latch = ready_latch();
        engine.try_attach(&latch, true).await.unwrap();

        engine.shutdown().await;
        assert_eq!(engine.state(), EngineState::Destroyed);
        assert!(!engine.has_session());
        assert_eq!(recorder.sessions_destroyed.load(Ordering::Relaxed), 1);

        // No resurrection after disposal.
        assert!(!engine.try_attach(&latch, true).await.unwrap());
        assert_eq!(recorder.sessions_created.load(Ordering::Relaxed), 1);
    }
}
