// Upload Orchestrator: presign -> thumbnail PUT -> video PUT -> job start,
// strictly in that order, with monotone progress and full reset on failure.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use vodio_api::{ApiClient, ApiError, JobStartResponse, PresignRequest, PresignResponse};

use crate::error::UploadError;
use crate::source::FileSource;

/// Default transcoding pipeline requested after upload.
pub const DEFAULT_PIPELINE: &str = "hls";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadPhase {
    #[default]
    Idle,
    Presigning,
    Uploading,
    Starting,
    Done,
}

impl std::fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Presigning => "presigning",
            Self::Uploading => "uploading",
            Self::Starting => "starting",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadProgress {
    pub phase: UploadPhase,
    pub percent: u8,
}

/// The network operations the orchestrator drives, in the order it drives
/// them. Implemented by [`ApiClient`]; substituted by recording fakes in tests.
#[async_trait]
pub trait UploadBackend: Send + Sync {
    async fn presign(&self, request: &PresignRequest) -> Result<PresignResponse, ApiError>;
    async fn put_file(&self, url: &str, source: &FileSource) -> Result<(), ApiError>;
    async fn start_job(&self, video_id: &str, pipeline: &str)
    -> Result<JobStartResponse, ApiError>;
}

#[async_trait]
impl UploadBackend for ApiClient {
    async fn presign(&self, request: &PresignRequest) -> Result<PresignResponse, ApiError> {
        self.presign_upload(request).await
    }

    async fn put_file(&self, url: &str, source: &FileSource) -> Result<(), ApiError> {
        ApiClient::put_file(self, url, source.path(), &source.content_type()).await
    }

    async fn start_job(
        &self,
        video_id: &str,
        pipeline: &str,
    ) -> Result<JobStartResponse, ApiError> {
        ApiClient::start_job(self, video_id, pipeline).await
    }
}

/// Everything the user filled in before hitting submit.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub title: String,
    pub description: String,
    pub video: Option<FileSource>,
    pub thumbnail: Option<FileSource>,
    /// Transcoding pipeline name; empty means [`DEFAULT_PIPELINE`].
    pub pipeline: String,
}

impl UploadRequest {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_video(mut self, video: FileSource) -> Self {
        self.video = Some(video);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: FileSource) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn with_pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = pipeline.into();
        self
    }
}

pub struct UploadOrchestrator {
    backend: Arc<dyn UploadBackend>,
    progress: watch::Sender<UploadProgress>,
}

impl UploadOrchestrator {
    pub fn new(backend: Arc<dyn UploadBackend>) -> Self {
        let (progress, _) = watch::channel(UploadProgress::default());
        Self { backend, progress }
    }

    /// Subscribe to phase/percent updates.
    pub fn progress(&self) -> watch::Receiver<UploadProgress> {
        self.progress.subscribe()
    }

    /// Run the whole flow. Returns the minted video id on success.
    ///
    /// Validation failures surface before any network call and leave the
    /// session idle. Any later failure aborts the flow, resets to idle at 0%,
    /// and collapses into the single generic [`UploadError::Failed`].
    pub async fn submit(&self, request: UploadRequest) -> Result<String, UploadError> {
        let video = request.video.clone().ok_or(UploadError::MissingVideo)?;
        let thumbnail = request
            .thumbnail
            .clone()
            .ok_or(UploadError::MissingThumbnail)?;

        match self.run(&request, &video, &thumbnail).await {
            Ok(video_id) => {
                self.publish(UploadPhase::Done, 100);
                info!(video_id = %video_id, "upload complete; transcoding started");
                Ok(video_id)
            }
            Err(e) => {
                warn!(error = %e, "upload flow aborted; resetting to idle");
                self.reset();
                Err(UploadError::Failed { source: e })
            }
        }
    }

    async fn run(
        &self,
        request: &UploadRequest,
        video: &FileSource,
        thumbnail: &FileSource,
    ) -> Result<String, ApiError> {
        self.publish(UploadPhase::Presigning, 5);
        let presign = self
            .backend
            .presign(&PresignRequest {
                title: request.title.clone(),
                description: request.description.clone(),
                video_filename: video.file_name(),
                video_type: video.content_type(),
                thumb_filename: thumbnail.file_name(),
                thumb_type: thumbnail.content_type(),
            })
            .await?;
        self.publish(UploadPhase::Uploading, 15);

        // Thumbnail first: it is small and gives fast feedback. The video
        // transfer must not begin until this one has completed.
        self.backend
            .put_file(&presign.thumb_put_url, thumbnail)
            .await?;
        self.publish(UploadPhase::Uploading, 40);

        self.backend.put_file(&presign.video_put_url, video).await?;
        self.publish(UploadPhase::Uploading, 70);

        self.publish(UploadPhase::Starting, 70);
        let pipeline = if request.pipeline.is_empty() {
            DEFAULT_PIPELINE
        } else {
            &request.pipeline
        };
        let job = self.backend.start_job(&presign.video_id, pipeline).await?;
        debug!(job_id = %job.job_id, status = %job.status, "transcoding job accepted");
        self.publish(UploadPhase::Starting, 95);

        Ok(presign.video_id)
    }

    /// Publish progress, clamped so the percentage never regresses within a
    /// run.
    fn publish(&self, phase: UploadPhase, percent: u8) {
        self.progress.send_modify(|current| {
            current.phase = phase;
            current.percent = current.percent.max(percent);
        });
    }

    /// Full reset after a failure: back to idle at 0%.
    fn reset(&self) {
        self.progress.send_replace(UploadProgress::default());
    }
}
