use std::path::PathBuf;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use vodio_api::ApiClient;
use vodio_playback::QualityMode;
use vodio_upload::{FileSource, UploadOrchestrator, UploadRequest};

use crate::commands::watch::{self, WatchArgs};

pub struct UploadArgs {
    pub title: String,
    pub description: String,
    pub video: PathBuf,
    pub thumbnail: PathBuf,
    pub pipeline: String,
    pub no_watch: bool,
}

pub async fn run(client: Arc<ApiClient>, args: UploadArgs) -> anyhow::Result<()> {
    let orchestrator = UploadOrchestrator::new(client.clone());
    let mut progress = orchestrator.progress();

    let bar = ProgressBar::new(100);
    bar.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos:>3}% {msg}",
    )?);
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let p = *progress.borrow();
            bar.set_position(u64::from(p.percent));
            bar.set_message(p.phase.to_string());
        }
        bar.finish_and_clear();
    });

    let request = UploadRequest::new(args.title, args.description)
        .with_video(FileSource::video(args.video))
        .with_thumbnail(FileSource::thumbnail(args.thumbnail))
        .with_pipeline(args.pipeline);

    let result = orchestrator.submit(request).await;
    drop(orchestrator);
    let _ = reporter.await;

    let video_id = result?;
    println!("upload complete: {video_id}");

    if !args.no_watch {
        info!(video_id = %video_id, "entering watch view");
        watch::run(
            client,
            WatchArgs {
                id: video_id,
                quality: QualityMode::Auto,
                output: None,
                stall_timeout: 900,
            },
        )
        .await?;
    }
    Ok(())
}
