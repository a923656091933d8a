use vodio_api::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Local validation: no video file selected. No network call was made.
    #[error("video file required")]
    MissingVideo,

    /// Local validation: no thumbnail selected. No network call was made.
    #[error("thumbnail required")]
    MissingThumbnail,

    /// The flow aborted somewhere past validation. The message is
    /// deliberately generic: per-cause detail lives on the source for logs,
    /// the user gets one notification either way.
    #[error("upload failed")]
    Failed {
        #[source]
        source: ApiError,
    },
}

impl UploadError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::MissingVideo | Self::MissingThumbnail)
    }
}
