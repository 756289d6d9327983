//! Sequential segment download of one manifest file.

use std::future::Future;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use bsm_core::{AcquireError, AcquireResult, Progression};
use flate2::read::DeflateDecoder;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::cdn::{CdnClient, CdnEndpoints};
use super::manifest::{ManifestFile, Segment};

/// How a file download ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// Every segment was written.
    Completed,
    /// Stopped between segments; the partial file stays on disk.
    Cancelled,
}

/// Fetches the segments of one binary's files.
pub struct SegmentDownloader {
    cdn: Arc<dyn CdnClient>,
    endpoints: CdnEndpoints,
    binary_id: String,
    token: String,
}

impl SegmentDownloader {
    pub fn new(
        cdn: Arc<dyn CdnClient>,
        endpoints: CdnEndpoints,
        binary_id: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            cdn,
            endpoints,
            binary_id: binary_id.into(),
            token: token.into(),
        }
    }

    /// Download `file` to `dest`, replacing whatever is there.
    ///
    /// Segments are fetched, inflated and appended in manifest order. Each
    /// written segment produces one tick whose `total` is the sum of segment
    /// sizes. `on_progress` is awaited before the next fetch, so a slow
    /// receiver holds the download back. `cancel` is checked before every fetch.
    pub async fn download_file<F, Fut>(
        &self,
        name: &str,
        file: &ManifestFile,
        dest: &Path,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> AcquireResult<SegmentOutcome>
    where
        F: FnMut(Progression<String>) -> Fut + Send,
        Fut: Future<Output = ()> + Send,
    {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut out = fs::File::create(dest).await?;
        let mut progress: Progression<String> = Progression::new(0, file.download_size());

        for segment in &file.segments {
            if cancel.is_cancelled() {
                out.flush().await?;
                debug!(file = %name, written = progress.current, "Segment download cancelled");
                return Ok(SegmentOutcome::Cancelled);
            }

            let data = self.fetch_segment(name, segment).await?;
            if data.len() as u64 != segment.size {
                debug!(
                    file = %name,
                    segment = segment.index,
                    declared = segment.size,
                    actual = data.len(),
                    "Segment size differs from manifest"
                );
            }
            out.write_all(&data).await?;

            progress.advance(segment.size);
            on_progress(progress.clone().with_data(name.to_string())).await;
        }

        out.flush().await?;
        Ok(SegmentOutcome::Completed)
    }

    async fn fetch_segment(&self, name: &str, segment: &Segment) -> AcquireResult<Vec<u8>> {
        let fetch_error = |message: String| AcquireError::SegmentFetch {
            file: name.to_string(),
            segment: segment.sha256.clone(),
            message,
        };

        let url = self
            .endpoints
            .segment_url(&self.binary_id, &self.token, &segment.sha256);
        let compressed = self
            .cdn
            .get_bytes(&url)
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        inflate(&compressed).map_err(|e| fetch_error(format!("Failed to inflate segment: {e}")))
    }
}

/// Decode a raw-deflate (no zlib header) buffer.
fn inflate(compressed: &[u8]) -> io::Result<Vec<u8>> {
    let mut data = Vec::new();
    DeflateDecoder::new(compressed).read_to_end(&mut data)?;
    Ok(data)
}
