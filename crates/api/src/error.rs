use reqwest::StatusCode;

/// Error payload the backend attaches to failed responses.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BackendError {
    pub code: String,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing required configuration: {var} is not set")]
    MissingConfiguration { var: &'static str },

    #[error("invalid API base URL `{input}`: {reason}")]
    InvalidBaseUrl { input: String, reason: String },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} during {operation} for {url}")]
    HttpStatus {
        status: StatusCode,
        url: String,
        operation: &'static str,
    },

    #[error("backend rejected {operation}: {code}")]
    Backend {
        operation: &'static str,
        code: String,
        details: String,
    },

    #[error("failed to decode {operation} response: {reason}")]
    Decode {
        operation: &'static str,
        reason: String,
    },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl ApiError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(
        status: StatusCode,
        url: impl Into<String>,
        operation: &'static str,
    ) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
            operation,
        }
    }

    pub(crate) fn backend(operation: &'static str, err: BackendError) -> Self {
        Self::Backend {
            operation,
            code: err.code,
            details: err.details.unwrap_or_default(),
        }
    }

    /// Whether retrying the same request later could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::MissingConfiguration { .. }
            | Self::InvalidBaseUrl { .. }
            | Self::InvalidUrl { .. }
            | Self::Backend { .. }
            | Self::Decode { .. } => false,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Network { .. } | Self::Io { .. } => true,
        }
    }

    /// Whether this failure happened on the wire rather than in this process.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::HttpStatus { .. } | Self::Backend { .. }
        )
    }
}
