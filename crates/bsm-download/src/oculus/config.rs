//! Configuration for the Oculus engine and its CDN client.

use std::time::Duration;

/// Default Oculus CDN.
pub const DEFAULT_CDN_BASE_URL: &str = "https://securecdn.oculus.com";

/// Files downloaded concurrently by default.
pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 15;

/// Configuration for [`OculusEngine`](super::OculusEngine).
///
/// # Example
///
/// ```
/// use bsm_download::oculus::OculusConfig;
/// use std::time::Duration;
///
/// let config = OculusConfig::new()
///     .with_max_concurrent_files(4)
///     .with_request_timeout(Duration::from_secs(120));
/// ```
#[derive(Debug, Clone)]
pub struct OculusConfig {
    pub(crate) cdn_base_url: String,
    pub(crate) max_concurrent_files: usize,
    pub(crate) user_agent: String,
    /// Per-request timeout; `None` leaves requests unbounded.
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) max_retries: u8,
    pub(crate) retry_base_delay: Duration,
}

impl Default for OculusConfig {
    fn default() -> Self {
        Self {
            cdn_base_url: DEFAULT_CDN_BASE_URL.to_string(),
            max_concurrent_files: DEFAULT_MAX_CONCURRENT_FILES,
            user_agent: concat!("bsm-download/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: None,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

impl OculusConfig {
    /// Create a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Base URL of the binaries CDN.
    ///
    /// Defaults to `https://securecdn.oculus.com`.
    #[must_use]
    pub fn with_cdn_base_url(mut self, url: impl Into<String>) -> Self {
        self.cdn_base_url = url.into();
        self
    }

    /// Maximum number of files downloaded at once (at least 1).
    ///
    /// Defaults to 15.
    #[must_use]
    pub fn with_max_concurrent_files(mut self, max: usize) -> Self {
        self.max_concurrent_files = max.max(1);
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Bound every HTTP request. Unbounded by default.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Retries for 5xx responses and network errors.
    ///
    /// Defaults to 3 retries.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries;
        self
    }

    /// Base delay for exponential backoff retries.
    ///
    /// Defaults to 500ms.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub const fn max_concurrent_files(&self) -> usize {
        self.max_concurrent_files
    }
}
