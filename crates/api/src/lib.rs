//! REST client for the vodio video platform backend.
//!
//! The backend owns video records, presigned storage credentials and
//! transcoding jobs; this crate is the typed surface the playback and upload
//! crates talk through. The client is constructed once from an explicit
//! [`ApiConfig`] (environment-driven by default) and passed into every
//! component; there is no ambient global client.

mod client;
mod config;
mod error;
mod types;

pub use client::ApiClient;
pub use config::{ApiConfig, DEFAULT_USER_AGENT, ENV_API_BASE_URL, ENV_API_TIMEOUT_SECS};
pub use error::{ApiError, BackendError};
pub use types::{
    JobStartResponse, JobState, PlaybackStatus, PresignRequest, PresignResponse, VideoDetail,
    VideoPage, VideoStatus, VideoSummary,
};
