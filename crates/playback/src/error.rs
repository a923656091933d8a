use vodio_api::ApiError;

/// Classification of a fatal player error, mirroring the recovery ladder of
/// browser ABR engines: network errors restart loading, media errors run the
/// decoder recovery path, anything else tears the session down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalErrorKind {
    Network,
    Media,
    Other,
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("playback cancelled")]
    Cancelled,

    #[error("status request failed: {source}")]
    Status {
        #[from]
        source: ApiError,
    },

    #[error("manifest fetch failed for {url}: {reason}")]
    ManifestFetch {
        url: String,
        reason: String,
        retryable: bool,
    },

    #[error("invalid manifest at {url}: {reason}")]
    ManifestParse { url: String, reason: String },

    #[error("segment fetch failed: {reason}")]
    SegmentFetch { reason: String, retryable: bool },

    #[error("media pipeline error: {reason}")]
    Media { reason: String },

    #[error("manifest lists no playable levels")]
    NoLevels,

    #[error("session has no manifest loaded")]
    NotLoaded,

    #[error("output sink closed")]
    SinkClosed,

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl PlaybackError {
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Whether an immediate retry of the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Cancelled
            | Self::ManifestParse { .. }
            | Self::Media { .. }
            | Self::NoLevels
            | Self::NotLoaded
            | Self::SinkClosed
            | Self::Internal { .. } => false,
            Self::Status { source } => source.is_retryable(),
            Self::ManifestFetch { retryable, .. } | Self::SegmentFetch { retryable, .. } => {
                *retryable
            }
        }
    }

    /// Recovery class when this error is fatal to an attached session.
    ///
    /// Manifest parse failures count as network class, as they do in hls.js:
    /// the bytes on the wire were wrong, reloading may yield good ones.
    pub fn fatal_kind(&self) -> FatalErrorKind {
        match self {
            Self::Status { .. }
            | Self::ManifestFetch { .. }
            | Self::ManifestParse { .. }
            | Self::SegmentFetch { .. } => FatalErrorKind::Network,
            Self::Media { .. } => FatalErrorKind::Media,
            Self::Cancelled
            | Self::NoLevels
            | Self::NotLoaded
            | Self::SinkClosed
            | Self::Internal { .. } => FatalErrorKind::Other,
        }
    }
}

/// Classify a reqwest failure for retry purposes. Connect, timeout and body
/// errors are transient; redirect loops and builder misuse are not.
pub(crate) fn is_retryable_reqwest_error(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode()
}
