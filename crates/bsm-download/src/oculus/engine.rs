//! Oculus acquisition engine.
//!
//! 1. Fetch the manifest for the binary.
//! 2. For every file, at most `max_concurrent_files` at a time: skip it when it
//!    already hashes correctly, otherwise download its segments.
//! 3. Hash every file again and fail with `IntegrityFailed` if any is wrong.
//!
//! Per-file ticks are folded into one running total by summing their `diff`s.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bsm_core::{AcquireError, AcquireResult, BuildIdentity, Progression};
use tokio::fs;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cdn::{CdnClient, CdnEndpoints, CdnError, ReqwestCdn};
use super::config::OculusConfig;
use super::integrity::{find_invalid_files, is_valid};
use super::manifest::{Manifest, ManifestFetcher, local_path};
use super::segments::{SegmentDownloader, SegmentOutcome};
use super::token::{TokenIssue, is_token_plausible};
use crate::slot::DownloadSlot;
use crate::stream::{DownloadStream, STREAM_BUFFER, StreamSink};

/// Stream returned by [`OculusEngine::download`].
///
/// Download mode counts bytes; verify-only mode counts files. Ticks carry the
/// name of the file that produced them.
pub type OculusProgressStream = DownloadStream<Progression<String>>;

// ============================================================================
// Request
// ============================================================================

/// One Oculus download.
#[derive(Clone)]
pub struct OculusDownloadRequest {
    /// Must carry a `binary_id`.
    pub identity: BuildIdentity,
    /// User access token.
    pub token: String,
    pub destination: PathBuf,
    /// Check existing files against the manifest without downloading.
    pub verify_only: bool,
}

impl OculusDownloadRequest {
    pub fn new(
        identity: BuildIdentity,
        token: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            identity,
            token: token.into(),
            destination: destination.into(),
            verify_only: false,
        }
    }

    #[must_use]
    pub const fn verify_only(mut self, verify: bool) -> Self {
        self.verify_only = verify;
        self
    }
}

impl fmt::Debug for OculusDownloadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OculusDownloadRequest")
            .field("identity", &self.identity)
            .field("token", &"<redacted>")
            .field("destination", &self.destination)
            .field("verify_only", &self.verify_only)
            .finish()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Segmented downloader for Oculus builds. One download at a time per instance.
pub struct OculusEngine {
    config: OculusConfig,
    endpoints: CdnEndpoints,
    cdn: Arc<dyn CdnClient>,
    slot: DownloadSlot<()>,
}

impl OculusEngine {
    /// Engine backed by the reqwest CDN client.
    pub fn new(config: OculusConfig) -> AcquireResult<Self> {
        let cdn = ReqwestCdn::new(&config).map_err(cdn_error)?;
        Self::with_client(config, Arc::new(cdn))
    }

    /// Engine backed by a caller-supplied CDN client.
    pub fn with_client(config: OculusConfig, cdn: Arc<dyn CdnClient>) -> AcquireResult<Self> {
        let endpoints = CdnEndpoints::new(&config.cdn_base_url).map_err(cdn_error)?;
        Ok(Self {
            config,
            endpoints,
            cdn,
            slot: DownloadSlot::new(),
        })
    }

    /// Start a download, or a verification when `request.verify_only` is set.
    ///
    /// Fails fast with [`AcquireError::AlreadyDownloading`] while another
    /// download runs on this engine. Must be called within a Tokio runtime.
    pub fn download(&self, request: OculusDownloadRequest) -> AcquireResult<OculusProgressStream> {
        let binary_id =
            request
                .identity
                .binary_id
                .clone()
                .ok_or_else(|| AcquireError::MissingIdentifier {
                    field: "binary_id".to_string(),
                })?;
        match is_token_plausible(&request.token) {
            Ok(()) => {}
            Err(TokenIssue::Empty) => {
                return Err(AcquireError::InvalidToken {
                    reason: TokenIssue::Empty.to_string(),
                });
            }
            Err(issue) => warn!(%issue, "Access token looks wrong; trying anyway"),
        }

        let lease = self.slot.try_acquire()?;
        let job = Job {
            cdn: Arc::clone(&self.cdn),
            endpoints: self.endpoints.clone(),
            binary_id,
            token: request.token,
            destination: request.destination,
            max_concurrent_files: self.config.max_concurrent_files,
            cancel: lease.cancel_token().clone(),
        };
        info!(
            version = %request.identity.version,
            binary_id = %job.binary_id,
            destination = %job.destination.display(),
            verify_only = request.verify_only,
            "Starting Oculus download"
        );

        let (sink, stream) = DownloadStream::channel();
        let verify_only = request.verify_only;
        tokio::spawn(async move {
            let result = if verify_only {
                job.verify(&sink).await
            } else {
                job.download(&sink).await
            };
            // Everything has settled; let the next download start.
            drop(lease);

            match result {
                Ok(true) => {
                    info!("Oculus download finished");
                    sink.succeed().await;
                }
                Ok(false) => info!("Oculus download stopped"),
                Err(err) => {
                    warn!(code = err.code(), error = %err, "Oculus download failed");
                    sink.fail(err).await;
                }
            }
        });
        Ok(stream)
    }

    /// Stop issuing segment fetches. In-flight fetches finish; no-op when idle.
    pub fn stop(&self) {
        self.slot.cancel();
    }

    pub fn is_downloading(&self) -> bool {
        self.slot.is_active()
    }
}

fn cdn_error(err: CdnError) -> AcquireError {
    AcquireError::network(err.to_string(), err.status_code())
}

// ============================================================================
// Job
// ============================================================================

enum FileEvent {
    Tick(Progression<String>),
    Failed(AcquireError),
}

/// Everything one invocation needs, owned by its task.
struct Job {
    cdn: Arc<dyn CdnClient>,
    endpoints: CdnEndpoints,
    binary_id: String,
    token: String,
    destination: PathBuf,
    max_concurrent_files: usize,
    cancel: CancellationToken,
}

impl Job {
    async fn fetch_manifest(&self) -> AcquireResult<Manifest> {
        let url = self.endpoints.manifest_url(&self.binary_id, &self.token);
        Ok(ManifestFetcher::new(Arc::clone(&self.cdn)).fetch(&url).await?)
    }

    /// Returns `Ok(false)` when stopped before completing.
    async fn download(&self, sink: &StreamSink<Progression<String>>) -> AcquireResult<bool> {
        let manifest = Arc::new(self.fetch_manifest().await?);
        if self.cancel.is_cancelled() {
            return Ok(false);
        }

        let total = manifest.download_size();
        info!(files = manifest.files.len(), total, "Manifest fetched");
        let mut overall: Progression<String> = Progression::new(0, total);
        if !sink.emit(overall.clone()).await {
            return Ok(false);
        }
        fs::create_dir_all(&self.destination).await?;

        // Failures stop the remaining files without looking like a user stop.
        let files_cancel = self.cancel.child_token();
        let downloader = Arc::new(SegmentDownloader::new(
            Arc::clone(&self.cdn),
            self.endpoints.clone(),
            self.binary_id.clone(),
            self.token.clone(),
        ));
        let root = Arc::new(self.destination.clone());
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_files));
        // Bounded so file tasks wait while the consumer falls behind.
        let (events_tx, mut events_rx) = mpsc::channel(STREAM_BUFFER);

        let mut tasks = JoinSet::new();
        for name in manifest.files.keys() {
            tasks.spawn(acquire_file(
                name.clone(),
                Arc::clone(&manifest),
                Arc::clone(&root),
                Arc::clone(&downloader),
                Arc::clone(&semaphore),
                files_cancel.clone(),
                events_tx.clone(),
            ));
        }
        drop(events_tx);

        let mut failure: Option<AcquireError> = None;
        let mut consumer_gone = false;
        while let Some(event) = events_rx.recv().await {
            match event {
                FileEvent::Tick(tick) => {
                    overall.advance(tick.diff.unwrap_or(0));
                    let update = Progression {
                        current: overall.current,
                        total,
                        diff: overall.diff,
                        data: tick.data,
                    };
                    if !consumer_gone && !sink.emit(update).await {
                        debug!("Oculus stream consumer went away");
                        consumer_gone = true;
                        files_cancel.cancel();
                    }
                }
                FileEvent::Failed(err) => {
                    if failure.is_none() {
                        files_cancel.cancel();
                        failure = Some(err);
                    }
                }
            }
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "File task did not complete");
                failure.get_or_insert_with(|| AcquireError::other(format!("File task failed: {e}")));
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }
        if consumer_gone || self.cancel.is_cancelled() {
            return Ok(false);
        }

        info!("Verifying downloaded files");
        let invalid = find_invalid_files(&manifest, &self.destination, |_| {}).await;
        if invalid.is_empty() {
            Ok(true)
        } else {
            Err(AcquireError::IntegrityFailed { files: invalid })
        }
    }

    /// Returns `Ok(false)` when stopped before completing.
    async fn verify(&self, sink: &StreamSink<Progression<String>>) -> AcquireResult<bool> {
        let manifest = self.fetch_manifest().await?;
        let (ticks_tx, mut ticks_rx) = mpsc::unbounded_channel();

        let check = find_invalid_files(&manifest, &self.destination, move |tick| {
            let _ = ticks_tx.send(tick);
        });
        let forward = async {
            while let Some(tick) = ticks_rx.recv().await {
                if !sink.emit(tick).await {
                    break;
                }
            }
        };

        let invalid = tokio::select! {
            (invalid, ()) = async { tokio::join!(check, forward) } => invalid,
            () = self.cancel.cancelled() => return Ok(false),
        };
        if sink.is_closed() {
            return Ok(false);
        }

        if invalid.is_empty() {
            Ok(true)
        } else {
            Err(AcquireError::IntegrityFailed { files: invalid })
        }
    }
}

async fn acquire_file(
    name: String,
    manifest: Arc<Manifest>,
    root: Arc<PathBuf>,
    downloader: Arc<SegmentDownloader>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    events: mpsc::Sender<FileEvent>,
) {
    let Ok(_permit) = semaphore.acquire_owned().await else {
        return;
    };
    if cancel.is_cancelled() {
        return;
    }
    let Some(file) = manifest.files.get(&name) else {
        return;
    };
    let Some(dest) = local_path(&root, &name) else {
        let _ = events
            .send(FileEvent::Failed(AcquireError::other(format!(
                "Manifest entry escapes the destination: {name}"
            ))))
            .await;
        return;
    };

    if is_valid(file, &dest).await {
        let size = file.download_size();
        debug!(file = %name, size, "File already valid, skipping");
        let mut tick = Progression::new(size, size).with_data(name);
        tick.diff = Some(size);
        let _ = events.send(FileEvent::Tick(tick)).await;
        return;
    }

    let result = downloader
        .download_file(&name, file, &dest, &cancel, |tick| {
            let events = events.clone();
            async move {
                let _ = events.send(FileEvent::Tick(tick)).await;
            }
        })
        .await;
    match result {
        Ok(SegmentOutcome::Completed) => debug!(file = %name, "File downloaded"),
        Ok(SegmentOutcome::Cancelled) => {}
        Err(err) => {
            let _ = events.send(FileEvent::Failed(err)).await;
        }
    }
}
