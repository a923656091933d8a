use std::time::Duration;

use url::Url;

use crate::error::ApiError;

/// Environment variable naming the backend base URL. Required.
pub const ENV_API_BASE_URL: &str = "VODIO_API_BASE_URL";

/// Environment variable overriding the API request timeout, in seconds.
pub const ENV_API_TIMEOUT_SECS: &str = "VODIO_API_TIMEOUT_SECS";

pub const DEFAULT_USER_AGENT: &str = concat!("vodio/", env!("CARGO_PKG_VERSION"));

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for [`ApiClient`](crate::ApiClient).
///
/// Built once at application start and handed to whichever components need
/// backend access. Absence of the base URL is a fatal startup condition, not
/// something to paper over with a default.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Backend base URL. Always stored with a trailing slash so endpoint
    /// joins resolve relative to the full path.
    pub base_url: Url,

    /// Overall timeout for API requests (JSON in/out). Raw storage transfers
    /// use [`connect_timeout`](Self::connect_timeout) only.
    pub timeout: Duration,

    /// Connection timeout applied to both the API and transfer clients.
    pub connect_timeout: Duration,

    /// User agent string sent on every request.
    pub user_agent: String,
}

impl ApiConfig {
    /// Build a config from a raw base URL with default timeouts.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let url = Url::parse(base_url).map_err(|e| ApiError::InvalidBaseUrl {
            input: base_url.to_owned(),
            reason: e.to_string(),
        })?;
        if !url.has_host() {
            return Err(ApiError::InvalidBaseUrl {
                input: base_url.to_owned(),
                reason: "URL has no host".to_owned(),
            });
        }
        Ok(Self {
            base_url: normalize_base(url),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        })
    }

    /// Build a config from the environment.
    ///
    /// `VODIO_API_BASE_URL` is required; `VODIO_API_TIMEOUT_SECS` optionally
    /// overrides the request timeout.
    pub fn from_env() -> Result<Self, ApiError> {
        let base = std::env::var(ENV_API_BASE_URL).map_err(|_| ApiError::MissingConfiguration {
            var: ENV_API_BASE_URL,
        })?;
        let mut config = Self::new(&base)?;
        if let Ok(raw) = std::env::var(ENV_API_TIMEOUT_SECS) {
            let secs: u64 = raw.parse().map_err(|_| ApiError::InvalidBaseUrl {
                input: raw,
                reason: format!("{ENV_API_TIMEOUT_SECS} must be an integer number of seconds"),
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// `Url::join` resolves relative to the parent of a path without a trailing
/// slash, which would silently drop a `/api/v1` style prefix.
fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
