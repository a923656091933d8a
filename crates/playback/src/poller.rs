// Status Poller: serialized polling of the playback endpoint with an interval
// that widens once the job is ready.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use vodio_api::{ApiClient, ApiError, PlaybackStatus};

/// Where playback status snapshots come from. Implemented by [`ApiClient`];
/// substituted by fakes in tests.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, video_id: &str) -> Result<PlaybackStatus, ApiError>;
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn fetch_status(&self, video_id: &str) -> Result<PlaybackStatus, ApiError> {
        self.playback_status(video_id).await
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Tick interval while the job is not yet ready.
    pub active_interval: Duration,
    /// Tick interval once readiness has been observed; a liveness check, not a
    /// feedback loop.
    pub ready_interval: Duration,
    /// Give up when neither readiness nor forward progress happens within this
    /// window. `None` polls indefinitely.
    pub stall_timeout: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            active_interval: Duration::from_millis(1500),
            ready_interval: Duration::from_secs(15),
            stall_timeout: None,
        }
    }
}

/// Latest poller state, published after every tick.
#[derive(Debug, Clone, Default)]
pub struct PollerSnapshot {
    /// Most recent successfully fetched status. A failed tick never clears
    /// this.
    pub status: Option<PlaybackStatus>,
    /// One-way readiness latch: set the first time a snapshot reports ready,
    /// never unset, even if a later snapshot regresses.
    pub ready: bool,
    /// Set when the stall timeout elapsed without readiness or progress; the
    /// poller has stopped.
    pub stalled: bool,
    /// Consecutive failed ticks; zeroed on every success. Only meaningful to
    /// surface while `status` is still `None`.
    pub consecutive_failures: u32,
}

/// Handle to a spawned poller. Dropping it cancels the task.
pub struct PollerHandle {
    updates: watch::Receiver<PollerSnapshot>,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn subscribe(&self) -> watch::Receiver<PollerSnapshot> {
        self.updates.clone()
    }

    pub fn latest(&self) -> PollerSnapshot {
        self.updates.borrow().clone()
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Stop and wait for the task to wind down.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        let _ = (&mut self.task).await;
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub struct StatusPoller;

impl StatusPoller {
    /// Spawn one polling task for `video_id`.
    ///
    /// Polls are serialized by construction: the task awaits each request
    /// before computing the next delay from the snapshot it just received, so
    /// overlapping polls for the same id cannot exist and stale out-of-order
    /// responses cannot be adopted.
    pub fn spawn(
        source: Arc<dyn StatusSource>,
        video_id: impl Into<String>,
        config: PollerConfig,
    ) -> PollerHandle {
        let video_id = video_id.into();
        let token = CancellationToken::new();
        let (tx, rx) = watch::channel(PollerSnapshot::default());
        let task = tokio::spawn(run(source, video_id, config, tx, token.clone()));
        PollerHandle {
            updates: rx,
            token,
            task,
        }
    }
}

async fn run(
    source: Arc<dyn StatusSource>,
    video_id: String,
    config: PollerConfig,
    tx: watch::Sender<PollerSnapshot>,
    token: CancellationToken,
) {
    let mut snapshot = PollerSnapshot::default();
    // Stall detection keys off (state, progress); any change counts as
    // forward movement and resets the clock.
    let mut last_movement = Instant::now();
    let mut movement_key = None;

    loop {
        let fetched = tokio::select! {
            _ = token.cancelled() => break,
            result = source.fetch_status(&video_id) => result,
        };

        match fetched {
            Ok(status) => {
                snapshot.consecutive_failures = 0;
                if status.playback_ready && !snapshot.ready {
                    debug!(video_id = %video_id, "playback became ready; widening poll interval");
                    snapshot.ready = true;
                }
                let key = (status.status, status.progress);
                if movement_key != Some(key) {
                    movement_key = Some(key);
                    last_movement = Instant::now();
                }
                snapshot.status = Some(status);
            }
            Err(e) => {
                snapshot.consecutive_failures += 1;
                warn!(
                    video_id = %video_id,
                    failures = snapshot.consecutive_failures,
                    error = %e,
                    "status poll failed; retrying on next tick"
                );
            }
        }

        if let Some(limit) = config.stall_timeout
            && !snapshot.ready
            && last_movement.elapsed() >= limit
        {
            warn!(video_id = %video_id, stalled_after = ?limit, "job made no progress; giving up on polling");
            snapshot.stalled = true;
            let _ = tx.send(snapshot);
            break;
        }

        if tx.send(snapshot.clone()).is_err() {
            break;
        }

        let delay = if snapshot.ready {
            config.ready_interval
        } else {
            config.active_interval
        };
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    debug!(video_id = %video_id, "status poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use vodio_api::JobState;

    /// Scripted status source: pops responses in order, repeats the last one,
    /// and records the instant of every call.
    struct ScriptedSource {
        script: Mutex<Vec<Result<PlaybackStatus, ApiError>>>,
        last: Mutex<Option<PlaybackStatus>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<PlaybackStatus, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                last: Mutex::new(None),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_instants(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn fetch_status(&self, _video_id: &str) -> Result<PlaybackStatus, ApiError> {
            self.calls.lock().unwrap().push(Instant::now());
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Ok(self.last.lock().unwrap().clone().expect("script exhausted"));
            }
            let next = script.remove(0);
            if let Ok(status) = &next {
                *self.last.lock().unwrap() = Some(status.clone());
            }
            next
        }
    }

    fn processing(progress: u8) -> PlaybackStatus {
        serde_json::from_value(serde_json::json!({
            "videoId": "v1",
            "jobId": "j1",
            "status": "processing",
            "progress": progress,
            "playbackReady": false,
        }))
        .unwrap()
    }

    fn ready() -> PlaybackStatus {
        serde_json::from_value(serde_json::json!({
            "videoId": "v1",
            "jobId": "j1",
            "status": "completed",
            "progress": 100,
            "playbackReady": true,
            "availableRenditions": ["480p", "720p", "1080p"],
            "masterUrl": "https://cdn.example/v1/master.m3u8",
        }))
        .unwrap()
    }

    fn network_error() -> ApiError {
        ApiError::http_status(
            reqwest::StatusCode::BAD_GATEWAY,
            "http://x/videos/v1/playback",
            "playback status",
        )
    }

    async fn settle() {
        // Let the spawned poller run its pending ticks under the paused clock.
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn interval_widens_on_the_ready_transition() {
        let source = ScriptedSource::new(vec![
            Ok(processing(10)),
            Ok(processing(60)),
            Ok(ready()),
            Ok(ready()),
            Ok(ready()),
        ]);
        let handle = StatusPoller::spawn(source.clone(), "v1", PollerConfig::default());

        tokio::time::sleep(Duration::from_secs(40)).await;
        settle().await;
        handle.shutdown().await;

        let calls = source.call_instants();
        assert!(calls.len() >= 5, "expected at least 5 polls, got {}", calls.len());
        // First two gaps are the fast interval, the gaps after readiness the
        // slow one.
        assert_eq!(calls[1] - calls[0], Duration::from_millis(1500));
        assert_eq!(calls[2] - calls[1], Duration::from_millis(1500));
        assert_eq!(calls[3] - calls[2], Duration::from_secs(15));
        assert_eq!(calls[4] - calls[3], Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_latch_survives_regression() {
        let source = ScriptedSource::new(vec![Ok(ready()), Ok(processing(90)), Ok(processing(90))]);
        let handle = StatusPoller::spawn(source.clone(), "v1", PollerConfig::default());

        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;

        let snapshot = handle.latest();
        assert!(snapshot.ready, "latch must not revert");
        // The regressed status is still published for display...
        assert!(!snapshot.status.as_ref().unwrap().playback_ready);
        // ...and the interval stays widened: ~31s of wall time fits only the
        // initial poll plus two slow ticks.
        assert_eq!(source.call_instants().len(), 3);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn poll_errors_keep_previous_observation() {
        let source = ScriptedSource::new(vec![
            Ok(processing(42)),
            Err(network_error()),
            Err(network_error()),
        ]);
        let handle = StatusPoller::spawn(source.clone(), "v1", PollerConfig::default());

        tokio::time::sleep(Duration::from_secs(4)).await;
        settle().await;

        let snapshot = handle.latest();
        let status = snapshot.status.expect("observation preserved across errors");
        assert_eq!(status.progress, 42);
        assert_eq!(status.status, JobState::Processing);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failures_count_until_first_success() {
        let source = ScriptedSource::new(vec![
            Err(network_error()),
            Err(network_error()),
            Ok(processing(5)),
        ]);
        let handle = StatusPoller::spawn(source.clone(), "v1", PollerConfig::default());

        tokio::time::sleep(Duration::from_millis(1600)).await;
        settle().await;
        assert_eq!(handle.latest().consecutive_failures, 2);
        assert!(handle.latest().status.is_none());

        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(handle.latest().consecutive_failures, 0);
        assert!(handle.latest().status.is_some());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stalls_when_progress_freezes() {
        let source = ScriptedSource::new(vec![Ok(processing(30))]);
        let config = PollerConfig {
            stall_timeout: Some(Duration::from_secs(10)),
            ..PollerConfig::default()
        };
        let handle = StatusPoller::spawn(source.clone(), "v1", config);

        tokio::time::sleep(Duration::from_secs(20)).await;
        settle().await;

        let snapshot = handle.latest();
        assert!(snapshot.stalled);
        let polls_at_stall = source.call_instants().len();

        // Poller has stopped: no further polls.
        tokio::time::sleep(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(source.call_instants().len(), polls_at_stall);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn progress_movement_resets_the_stall_clock() {
        let source = ScriptedSource::new(vec![
            Ok(processing(10)),
            Ok(processing(20)),
            Ok(processing(30)),
            Ok(processing(40)),
            Ok(processing(50)),
            Ok(processing(60)),
            Ok(processing(70)),
            Ok(processing(80)),
        ]);
        let config = PollerConfig {
            stall_timeout: Some(Duration::from_secs(5)),
            ..PollerConfig::default()
        };
        let handle = StatusPoller::spawn(source.clone(), "v1", config);

        // 10s of steadily advancing progress: never stalls even though the
        // timeout is 5s.
        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert!(!handle.latest().stalled);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_polling() {
        let source = ScriptedSource::new(vec![Ok(processing(10))]);
        let handle = StatusPoller::spawn(source.clone(), "v1", PollerConfig::default());

        tokio::time::sleep(Duration::from_secs(3)).await;
        settle().await;
        let before = source.call_instants().len();
        handle.shutdown().await;

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.call_instants().len(), before);
    }
}
