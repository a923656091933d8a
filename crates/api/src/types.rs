//! Wire types for the backend's JSON surface.
//!
//! Field names mirror the backend's camelCase JSON exactly; everything the
//! backend marks optional is `Option` or defaulted here so a sparse response
//! never fails to decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Lifecycle state of a video record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    Uploaded,
    Processing,
    Ready,
    Failed,
}

impl std::fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// State of a transcoding job.
///
/// Before any job exists the playback endpoint reports the *video* status in
/// the same field, so this enum carries `Uploaded` and an `Unknown` catch-all
/// for forward compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Uploaded,
    Queued,
    Processing,
    Completed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uploaded => "uploaded",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One row of `GET /videos`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSummary {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    pub status: VideoStatus,
    #[serde(default)]
    pub latest_job_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// `GET /videos/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetail {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    pub status: VideoStatus,
    #[serde(default)]
    pub latest_job_id: Option<String>,
}

/// Paged result of `GET /videos`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoPage {
    #[serde(default)]
    pub items: Vec<VideoSummary>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

/// `POST /videos/presign` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignRequest {
    pub title: String,
    pub description: String,
    pub video_filename: String,
    pub video_type: String,
    pub thumb_filename: String,
    pub thumb_type: String,
}

/// `POST /videos/presign` response: a freshly minted video id and one
/// destination URL per file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignResponse {
    pub video_id: String,
    pub video_key: String,
    pub video_put_url: String,
    pub thumb_key: String,
    pub thumb_put_url: String,
}

/// `POST /videos/{id}/jobs` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStartResponse {
    pub video_id: String,
    pub job_id: String,
    pub status: JobState,
}

/// `GET /videos/{id}/playback`: the snapshot the status poller consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStatus {
    pub video_id: String,
    #[serde(default)]
    pub job_id: Option<String>,
    pub status: JobState,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub playback_ready: bool,
    #[serde(default)]
    pub available_renditions: Vec<String>,
    #[serde(default)]
    pub master_key: Option<String>,
    #[serde(default)]
    pub master_url: Option<String>,
}

impl PlaybackStatus {
    /// The manifest URL, if present and non-empty.
    pub fn manifest_url(&self) -> Option<&str> {
        self.master_url.as_deref().filter(|u| !u.is_empty())
    }
}

/// Envelope every JSON endpoint wraps its payload in.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub(crate) struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    #[allow(dead_code)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<BackendError>,
}
