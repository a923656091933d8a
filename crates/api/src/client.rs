use std::path::Path;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::io::ReaderStream;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::types::{
    ApiEnvelope, JobStartResponse, PlaybackStatus, PresignRequest, PresignResponse, VideoDetail,
    VideoPage,
};

/// Typed client over the backend REST surface plus the raw storage PUT.
///
/// Holds two `reqwest` clients: `api` carries the overall request timeout for
/// JSON endpoints, while `transfer` has no overall timeout so a multi-gigabyte
/// upload or a slow segment fetch is never cut off mid-body. Both share the
/// connect timeout and user agent.
#[derive(Debug, Clone)]
pub struct ApiClient {
    api: Client,
    transfer: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let api = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        let transfer = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            api,
            transfer,
            base: config.base_url.clone(),
        })
    }

    /// Convenience for `ApiClient::new(&ApiConfig::from_env()?)`.
    pub fn from_env() -> Result<Self, ApiError> {
        Self::new(&ApiConfig::from_env()?)
    }

    /// The timeout-free client, for callers that fetch storage objects
    /// themselves (manifests, segments).
    pub fn transfer_client(&self) -> &Client {
        &self.transfer
    }

    /// `GET /videos?limit&offset`
    pub async fn list_videos(&self, limit: u32, offset: u32) -> Result<VideoPage, ApiError> {
        let mut url = self.endpoint("videos")?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        self.get_json(url, "list videos").await
    }

    /// `GET /videos/{id}`
    pub async fn get_video(&self, video_id: &str) -> Result<VideoDetail, ApiError> {
        let url = self.endpoint(&format!("videos/{video_id}"))?;
        self.get_json(url, "get video").await
    }

    /// `POST /videos/presign`: mint a video id and two upload destinations.
    pub async fn presign_upload(
        &self,
        request: &PresignRequest,
    ) -> Result<PresignResponse, ApiError> {
        let url = self.endpoint("videos/presign")?;
        self.post_json(url, request, "presign upload").await
    }

    /// `POST /videos/{id}/jobs`: start a transcoding pipeline.
    pub async fn start_job(
        &self,
        video_id: &str,
        pipeline: &str,
    ) -> Result<JobStartResponse, ApiError> {
        #[derive(Serialize)]
        struct StartJobRequest<'a> {
            pipeline: &'a str,
        }
        let url = self.endpoint(&format!("videos/{video_id}/jobs"))?;
        self.post_json(url, &StartJobRequest { pipeline }, "start job")
            .await
    }

    /// `GET /videos/{id}/playback`: the snapshot consumed by the status poller.
    pub async fn playback_status(&self, video_id: &str) -> Result<PlaybackStatus, ApiError> {
        let url = self.endpoint(&format!("videos/{video_id}/playback"))?;
        self.get_json(url, "playback status").await
    }

    /// Stream a file to a presigned destination URL.
    ///
    /// The body is streamed straight off disk, so file size is bounded by the
    /// destination, not by memory. Content length is sent explicitly because
    /// object stores commonly reject chunked PUTs.
    pub async fn put_file(
        &self,
        url: &str,
        path: &Path,
        content_type: &str,
    ) -> Result<(), ApiError> {
        let file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        debug!(url, content_type, bytes = len, "storage put");
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let response = self
            .transfer
            .put(url)
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, len)
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::http_status(status, url, "storage put"));
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|e| ApiError::invalid_url(path, e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        operation: &'static str,
    ) -> Result<T, ApiError> {
        let response = self.api.get(url.clone()).send().await?;
        Self::unwrap_envelope(response, url, operation).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
        operation: &'static str,
    ) -> Result<T, ApiError> {
        let response = self.api.post(url.clone()).json(body).send().await?;
        Self::unwrap_envelope(response, url, operation).await
    }

    async fn unwrap_envelope<T: DeserializeOwned>(
        response: Response,
        url: Url,
        operation: &'static str,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            // Prefer the backend's own error envelope over a bare status code.
            if let Ok(envelope) = response.json::<ApiEnvelope<serde_json::Value>>().await
                && let Some(err) = envelope.error
            {
                return Err(ApiError::backend(operation, err));
            }
            return Err(ApiError::http_status(status, url.as_str(), operation));
        }

        let envelope: ApiEnvelope<T> = response.json().await?;
        if let Some(err) = envelope.error {
            return Err(ApiError::backend(operation, err));
        }
        if !envelope.success {
            return Err(ApiError::Decode {
                operation,
                reason: "response envelope reports success=false without an error".to_owned(),
            });
        }
        envelope.data.ok_or(ApiError::Decode {
            operation,
            reason: "response envelope has no data field".to_owned(),
        })
    }
}
