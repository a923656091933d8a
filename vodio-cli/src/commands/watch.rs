use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{info, warn};
use vodio_api::ApiClient;
use vodio_playback::{
    HlsSessionFactory, PollerConfig, QualityMode, SessionEvent, StatusSource, WatchConfig,
    WatchSession,
};

pub struct WatchArgs {
    pub id: String,
    pub quality: QualityMode,
    pub output: Option<PathBuf>,
    pub stall_timeout: u64,
}

pub async fn run(client: Arc<ApiClient>, args: WatchArgs) -> anyhow::Result<()> {
    let (events_tx, events_rx) = mpsc::channel::<SessionEvent>(16);
    let (data_tx, mut data_rx) = mpsc::channel::<Bytes>(16);
    // Segment and manifest fetches go straight to storage; use the client
    // without an overall timeout so large segments are never cut off.
    let factory = HlsSessionFactory::new(client.transfer_client().clone(), events_tx);

    let config = WatchConfig {
        poller: PollerConfig {
            stall_timeout: (args.stall_timeout > 0)
                .then(|| Duration::from_secs(args.stall_timeout)),
            ..PollerConfig::default()
        },
        ..WatchConfig::default()
    };

    let source: Arc<dyn StatusSource> = client;
    let session = WatchSession::start(
        source,
        args.id.clone(),
        Box::new(factory),
        events_rx,
        data_tx,
        config,
    );
    session.set_quality(args.quality);

    let mut writer = match &args.output {
        Some(path) => Some(tokio::fs::File::create(path).await?),
        None => None,
    };

    let mut snapshots = session.snapshots();
    let mut polls_done = false;
    let mut received: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; shutting down");
                break;
            }

            changed = snapshots.changed(), if !polls_done => {
                if changed.is_err() {
                    polls_done = true;
                    continue;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if snapshot.stalled {
                    warn!(video_id = %args.id, "transcoding made no progress; giving up");
                    break;
                }
                if let Some(status) = &snapshot.status {
                    info!(
                        status = %status.status,
                        progress = status.progress,
                        ready = snapshot.ready,
                        renditions = ?status.available_renditions,
                        "job status"
                    );
                } else if snapshot.consecutive_failures >= 5 {
                    warn!(
                        failures = snapshot.consecutive_failures,
                        "status endpoint unreachable; still retrying"
                    );
                }
            }

            maybe_bytes = data_rx.recv() => {
                match maybe_bytes {
                    Some(bytes) => {
                        received += bytes.len() as u64;
                        if let Some(writer) = writer.as_mut() {
                            writer.write_all(&bytes).await?;
                        }
                    }
                    // Closed output channel means the stream ended (or the
                    // session is gone for good); either way we are done.
                    None => break,
                }
            }
        }
    }

    if let Some(mut writer) = writer.take() {
        writer.flush().await?;
    }
    session.shutdown().await;

    if received > 0 {
        match &args.output {
            Some(path) => println!("wrote {received} bytes to {}", path.display()),
            None => println!("received {received} bytes (discarded; pass --output to keep them)"),
        }
    }
    Ok(())
}
