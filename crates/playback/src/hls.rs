// Built-in AbrSession: streams HLS segments from storage to an output sink.
//
// One background worker per session fetches the selected level's segments in
// order and pushes their bytes through a bounded channel; channel backpressure
// is the pacing. Transient fetch failures self-heal through retry-with-backoff;
// exhausted retries surface as a fatal event for the engine's recovery ladder.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use m3u8_rs::{MediaPlaylist, Playlist};
use reqwest::{Client, StatusCode};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{PlaybackError, is_retryable_reqwest_error};
use crate::quality::Level;
use crate::retry::{BackoffPolicy, RetryOutcome, retry_with_backoff};
use crate::session::{AbrSession, SessionFactory, SessionOptions};

/// Events a decoding session emits toward its output surface.
#[derive(Debug)]
pub enum SessionEvent {
    /// One media segment's bytes, in playback order.
    Data(Bytes),
    /// The worker moved to a different level (quality switch or ABR pick).
    LevelSwitched { index: usize },
    /// The VOD playlist is exhausted.
    Ended,
    /// A fatal error the session could not self-heal. The engine decides
    /// whether to recover or tear down.
    Fatal(PlaybackError),
}

/// Builds [`HlsAbrSession`]s that all deliver to the same event channel. The
/// channel is the output surface, which is why the engine must never let two
/// sessions live at once.
pub struct HlsSessionFactory {
    client: Client,
    events: mpsc::Sender<SessionEvent>,
    retry: BackoffPolicy,
}

impl HlsSessionFactory {
    pub fn new(client: Client, events: mpsc::Sender<SessionEvent>) -> Self {
        Self {
            client,
            events,
            retry: BackoffPolicy::default(),
        }
    }

    pub fn with_backoff(mut self, retry: BackoffPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl SessionFactory for HlsSessionFactory {
    fn create(&mut self, options: &SessionOptions) -> Result<Box<dyn AbrSession>, PlaybackError> {
        Ok(Box::new(HlsAbrSession::new(
            self.client.clone(),
            self.events.clone(),
            self.retry.clone(),
            options.clone(),
        )))
    }
}

struct Worker {
    token: CancellationToken,
    task: JoinHandle<()>,
}

pub struct HlsAbrSession {
    client: Client,
    events: mpsc::Sender<SessionEvent>,
    retry: BackoffPolicy,
    options: SessionOptions,
    manifest: Option<Url>,
    levels: Vec<Level>,
    /// `None` = automatic selection; `Some(i)` = pinned level index.
    level_pin: watch::Sender<Option<usize>>,
    /// Index of the next segment to deliver. Survives worker restarts so
    /// recovery resumes instead of replaying.
    position: Arc<AtomicUsize>,
    worker: Option<Worker>,
}

impl HlsAbrSession {
    pub fn new(
        client: Client,
        events: mpsc::Sender<SessionEvent>,
        retry: BackoffPolicy,
        options: SessionOptions,
    ) -> Self {
        let (level_pin, _) = watch::channel(None);
        Self {
            client,
            events,
            retry,
            options,
            manifest: None,
            levels: Vec::new(),
            level_pin,
            position: Arc::new(AtomicUsize::new(0)),
            worker: None,
        }
    }

    async fn spawn_worker(&mut self) {
        self.stop_worker().await;
        let token = CancellationToken::new();
        let ctx = WorkerContext {
            client: self.client.clone(),
            events: self.events.clone(),
            retry: self.retry.clone(),
            levels: self.levels.clone(),
            level_pin: self.level_pin.subscribe(),
            position: self.position.clone(),
            token: token.clone(),
        };
        let task = tokio::spawn(run_worker(ctx));
        self.worker = Some(Worker { token, task });
    }

    async fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.token.cancel();
            let _ = worker.task.await;
        }
    }

    fn parse_master(&self, manifest: &Url, bytes: &[u8]) -> Result<Vec<Level>, PlaybackError> {
        let playlist = m3u8_rs::parse_playlist_res(bytes).map_err(|e| {
            PlaybackError::ManifestParse {
                url: manifest.to_string(),
                reason: format!("{e:?}"),
            }
        })?;
        let levels = match playlist {
            Playlist::MasterPlaylist(master) => {
                let mut levels = Vec::with_capacity(master.variants.len());
                for variant in &master.variants {
                    let uri = manifest.join(&variant.uri).map_err(|e| {
                        PlaybackError::ManifestParse {
                            url: manifest.to_string(),
                            reason: format!("variant URI `{}` does not resolve: {e}", variant.uri),
                        }
                    })?;
                    levels.push(Level {
                        uri: uri.to_string(),
                        height: variant
                            .resolution
                            .map(|r| r.height as u32)
                            .unwrap_or_default(),
                        bandwidth: variant.bandwidth,
                    });
                }
                levels
            }
            // A bare media playlist is a single unlabelled level.
            Playlist::MediaPlaylist(_) => vec![Level {
                uri: manifest.to_string(),
                height: 0,
                bandwidth: 0,
            }],
        };
        if levels.is_empty() {
            return Err(PlaybackError::NoLevels);
        }
        Ok(levels)
    }
}

#[async_trait::async_trait]
impl AbrSession for HlsAbrSession {
    async fn load(&mut self, manifest: &Url) -> Result<(), PlaybackError> {
        if !self.options.background_worker {
            // Inline demuxing is a browser-engine concern; this session always
            // fetches on a worker task.
            debug!("background_worker=false requested; segment worker is used regardless");
        }
        if self.options.low_latency {
            warn!("low-latency mode is not supported for VOD sessions; ignoring");
        }

        let token = CancellationToken::new();
        let bytes = fetch_bytes(
            &self.client,
            &self.retry,
            &token,
            manifest,
            FetchKind::Manifest,
        )
        .await?;
        self.levels = self.parse_master(manifest, &bytes)?;
        self.manifest = Some(manifest.clone());
        info!(
            manifest = %manifest,
            levels = self.levels.len(),
            "manifest loaded; starting segment worker"
        );
        self.spawn_worker().await;
        Ok(())
    }

    async fn start_load(&mut self) -> Result<(), PlaybackError> {
        if self.manifest.is_none() {
            return Err(PlaybackError::NotLoaded);
        }
        info!(
            position = self.position.load(Ordering::SeqCst),
            "restarting load from current position"
        );
        self.spawn_worker().await;
        Ok(())
    }

    async fn recover_media_error(&mut self) -> Result<(), PlaybackError> {
        if self.manifest.is_none() {
            return Err(PlaybackError::NotLoaded);
        }
        // Byte delivery has no decoder state to rebuild; recovery is a worker
        // restart that re-fetches playlists and resumes at the same position.
        info!(
            position = self.position.load(Ordering::SeqCst),
            "recovering media pipeline"
        );
        self.spawn_worker().await;
        Ok(())
    }

    fn set_auto_level(&mut self) {
        self.level_pin.send_replace(None);
    }

    fn set_level(&mut self, index: usize) {
        self.level_pin.send_replace(Some(index));
    }

    fn levels(&self) -> Vec<Level> {
        self.levels.clone()
    }

    async fn destroy(&mut self) {
        self.stop_worker().await;
        self.manifest = None;
        self.levels.clear();
        debug!("decoding session destroyed");
    }
}

impl Drop for HlsAbrSession {
    fn drop(&mut self) {
        // Destroy is async and should have run already; this is the backstop
        // so a leaked session cannot keep its worker alive.
        if let Some(worker) = self.worker.take() {
            worker.token.cancel();
        }
    }
}

struct WorkerContext {
    client: Client,
    events: mpsc::Sender<SessionEvent>,
    retry: BackoffPolicy,
    levels: Vec<Level>,
    level_pin: watch::Receiver<Option<usize>>,
    position: Arc<AtomicUsize>,
    token: CancellationToken,
}

struct LevelPlaylist {
    url: Url,
    playlist: MediaPlaylist,
}

/// Send an event to the surface unless cancellation wins first.
///
/// Cancellation-aware so a worker blocked on a full channel can never deadlock
/// `stop_worker`, whose caller is often the channel's consumer. `Err` means
/// the worker must stop.
async fn deliver(ctx: &WorkerContext, event: SessionEvent) -> Result<(), ()> {
    tokio::select! {
        _ = ctx.token.cancelled() => Err(()),
        sent = ctx.events.send(event) => sent.map_err(|_| ()),
    }
}

/// Automatic selection: highest advertised bandwidth, first occurrence on
/// ties. Delivery pacing comes from sink backpressure, so the top rendition is
/// the steady-state pick for VOD.
fn auto_level(levels: &[Level]) -> usize {
    levels
        .iter()
        .enumerate()
        .max_by_key(|(index, level)| (level.bandwidth, std::cmp::Reverse(*index)))
        .map(|(index, _)| index)
        .unwrap_or(0)
}

async fn run_worker(ctx: WorkerContext) {
    let mut playlists: HashMap<usize, LevelPlaylist> = HashMap::new();
    let mut current: Option<usize> = None;

    loop {
        if ctx.token.is_cancelled() {
            break;
        }

        let desired = match *ctx.level_pin.borrow() {
            Some(pinned) => pinned.min(ctx.levels.len().saturating_sub(1)),
            None => auto_level(&ctx.levels),
        };
        if current != Some(desired) {
            debug!(level = desired, height = ctx.levels[desired].height, "switching level");
            current = Some(desired);
            if deliver(&ctx, SessionEvent::LevelSwitched { index: desired })
                .await
                .is_err()
            {
                break;
            }
        }

        if !playlists.contains_key(&desired) {
            match load_level_playlist(&ctx, desired).await {
                Ok(playlist) => {
                    playlists.insert(desired, playlist);
                }
                Err(PlaybackError::Cancelled) => break,
                Err(e) => {
                    let _ = deliver(&ctx, SessionEvent::Fatal(e)).await;
                    break;
                }
            }
        }
        let level_playlist = &playlists[&desired];

        let index = ctx.position.load(Ordering::SeqCst);
        if index >= level_playlist.playlist.segments.len() {
            debug!(segments = index, "playlist exhausted");
            let _ = deliver(&ctx, SessionEvent::Ended).await;
            break;
        }

        let segment = &level_playlist.playlist.segments[index];
        let segment_url = match level_playlist.url.join(&segment.uri) {
            Ok(url) => url,
            Err(e) => {
                let _ = deliver(
                    &ctx,
                    SessionEvent::Fatal(PlaybackError::ManifestParse {
                        url: level_playlist.url.to_string(),
                        reason: format!("segment URI `{}` does not resolve: {e}", segment.uri),
                    }),
                )
                .await;
                break;
            }
        };

        let bytes = match fetch_bytes(
            &ctx.client,
            &ctx.retry,
            &ctx.token,
            &segment_url,
            FetchKind::Segment,
        )
        .await
        {
            Ok(bytes) => bytes,
            Err(PlaybackError::Cancelled) => break,
            Err(e) => {
                warn!(url = %segment_url, error = %e, "segment fetch failed beyond retry budget");
                let _ = deliver(&ctx, SessionEvent::Fatal(e)).await;
                break;
            }
        };

        if deliver(&ctx, SessionEvent::Data(bytes)).await.is_err() {
            debug!("output surface dropped or session cancelled; stopping worker");
            break;
        }
        ctx.position.fetch_add(1, Ordering::SeqCst);
    }
}

async fn load_level_playlist(
    ctx: &WorkerContext,
    index: usize,
) -> Result<LevelPlaylist, PlaybackError> {
    let url = Url::parse(&ctx.levels[index].uri).map_err(|e| PlaybackError::ManifestParse {
        url: ctx.levels[index].uri.clone(),
        reason: e.to_string(),
    })?;
    let bytes = fetch_bytes(&ctx.client, &ctx.retry, &ctx.token, &url, FetchKind::Manifest).await?;
    match m3u8_rs::parse_playlist_res(&bytes) {
        Ok(Playlist::MediaPlaylist(playlist)) => Ok(LevelPlaylist { url, playlist }),
        Ok(Playlist::MasterPlaylist(_)) => Err(PlaybackError::ManifestParse {
            url: url.to_string(),
            reason: "expected a media playlist, found a master playlist".to_owned(),
        }),
        Err(e) => Err(PlaybackError::ManifestParse {
            url: url.to_string(),
            reason: format!("{e:?}"),
        }),
    }
}

#[derive(Clone, Copy)]
enum FetchKind {
    Manifest,
    Segment,
}

impl FetchKind {
    fn error(self, url: &Url, reason: String, retryable: bool) -> PlaybackError {
        match self {
            Self::Manifest => PlaybackError::ManifestFetch {
                url: url.to_string(),
                reason,
                retryable,
            },
            Self::Segment => PlaybackError::SegmentFetch { reason, retryable },
        }
    }
}

async fn fetch_bytes(
    client: &Client,
    retry: &BackoffPolicy,
    token: &CancellationToken,
    url: &Url,
    kind: FetchKind,
) -> Result<Bytes, PlaybackError> {
    retry_with_backoff(retry, token, |_| async move {
        let response = match client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                let retryable = is_retryable_reqwest_error(&e);
                let err = kind.error(url, e.to_string(), retryable);
                return if retryable {
                    RetryOutcome::Retry(err)
                } else {
                    RetryOutcome::Fail(err)
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            let retryable = status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
            let err = kind.error(url, format!("HTTP {status}"), retryable);
            return if retryable {
                RetryOutcome::Retry(err)
            } else {
                RetryOutcome::Fail(err)
            };
        }

        match response.bytes().await {
            Ok(bytes) => RetryOutcome::Success(bytes),
            // The connection died mid-body; the next attempt may complete.
            Err(e) => RetryOutcome::Retry(kind.error(url, e.to_string(), true)),
        }
    })
    .await
}
