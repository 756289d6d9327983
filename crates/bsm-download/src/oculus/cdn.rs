//! HTTP access to the Oculus binaries CDN.
//!
//! [`CdnClient`] is the seam the engine downloads through, so tests can swap
//! in an in-memory CDN. [`ReqwestCdn`] is the production implementation with
//! retry on transient errors.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::config::OculusConfig;

// ============================================================================
// Error Types
// ============================================================================

/// Failure of one CDN request.
///
/// Messages never include the request URL, which carries the access token.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CdnError {
    #[error("CDN responded with HTTP {status}")]
    Status { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid CDN base URL: {0}")]
    InvalidBaseUrl(String),
}

impl CdnError {
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status } => Some(*status),
            Self::Network(_) | Self::InvalidBaseUrl(_) => None,
        }
    }
}

impl From<reqwest::Error> for CdnError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.without_url().to_string())
    }
}

// ============================================================================
// CDN Client Trait
// ============================================================================

/// Fetches raw bytes from the CDN.
#[async_trait]
pub trait CdnClient: Send + Sync {
    /// GET `url` and return the full body of a successful response.
    async fn get_bytes(&self, url: &Url) -> Result<Vec<u8>, CdnError>;
}

// ============================================================================
// Endpoints
// ============================================================================

/// URL templates of the manifest and segment endpoints.
#[derive(Debug, Clone)]
pub struct CdnEndpoints {
    base: Url,
}

impl CdnEndpoints {
    pub fn new(base_url: &str) -> Result<Self, CdnError> {
        let base = Url::parse(base_url).map_err(|e| CdnError::InvalidBaseUrl(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(CdnError::InvalidBaseUrl(base_url.to_string()));
        }
        Ok(Self { base })
    }

    /// `{base}/binaries/download/?id={binary}&access_token={token}&get_manifest=1`
    pub fn manifest_url(&self, binary_id: &str, token: &str) -> Url {
        let mut url = self.endpoint("download");
        url.query_pairs_mut()
            .append_pair("id", binary_id)
            .append_pair("access_token", token)
            .append_pair("get_manifest", "1");
        url
    }

    /// `{base}/binaries/segment/?access_token={token}&binary_id={binary}&segment_sha256={sha}`
    pub fn segment_url(&self, binary_id: &str, token: &str, segment_sha256: &str) -> Url {
        let mut url = self.endpoint("segment");
        url.query_pairs_mut()
            .append_pair("access_token", token)
            .append_pair("binary_id", binary_id)
            .append_pair("segment_sha256", segment_sha256);
        url
    }

    fn endpoint(&self, name: &str) -> Url {
        let mut url = self.base.clone();
        url.set_query(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["binaries", name, ""]);
        }
        url
    }
}

// ============================================================================
// Reqwest Client
// ============================================================================

/// Production CDN client using reqwest with retry logic.
///
/// Retries 5xx responses and network errors with exponential backoff; 4xx
/// responses fail immediately.
pub struct ReqwestCdn {
    client: reqwest::Client,
    max_retries: u8,
    retry_base_delay: Duration,
}

impl ReqwestCdn {
    pub fn new(config: &OculusConfig) -> Result<Self, CdnError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
        })
    }

    async fn fetch_with_retry(&self, url: &Url) -> Result<reqwest::Response, CdnError> {
        let mut last_error: Option<CdnError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.retry_base_delay * 2u32.pow(u32::from(attempt) - 1);
                debug!(path = url.path(), attempt, ?delay, "Retrying CDN request");
                tokio::time::sleep(delay).await;
            }

            match self.client.get(url.as_str()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let err = CdnError::Status {
                        status: status.as_u16(),
                    };
                    // 5xx errors are retryable (server-side issues)
                    if status.is_server_error() && attempt < self.max_retries {
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    // Network errors are retryable
                    if attempt < self.max_retries {
                        last_error = Some(e.into());
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CdnError::Network("Unknown error during fetch".to_string())))
    }
}

#[async_trait]
impl CdnClient for ReqwestCdn {
    async fn get_bytes(&self, url: &Url) -> Result<Vec<u8>, CdnError> {
        let response = self.fetch_with_retry(url).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

// ============================================================================
// Fake CDN for Testing
// ============================================================================
