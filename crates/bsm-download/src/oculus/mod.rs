//! Oculus acquisition from the binaries CDN.
//!
//! - `cdn` - `CdnClient` seam, endpoint templates, reqwest client with retry
//! - `manifest` - zipped `manifest.json` model and fetcher
//! - `segments` - in-order raw-deflate segment download of one file
//! - `integrity` - SHA-256 pre-check and post-check
//! - `token` - access token plausibility check
//! - `engine` - bounded-concurrency orchestration behind `download` / `stop`

mod cdn;
mod config;
mod engine;
mod integrity;
mod manifest;
mod segments;
mod token;

pub use cdn::{CdnClient, CdnEndpoints, CdnError, ReqwestCdn};
pub use config::{DEFAULT_CDN_BASE_URL, DEFAULT_MAX_CONCURRENT_FILES, OculusConfig};
pub use engine::{OculusDownloadRequest, OculusEngine, OculusProgressStream};
pub use integrity::{find_invalid_files, hash_file, is_valid};
pub use manifest::{
    MANIFEST_ENTRY, Manifest, ManifestFetcher, ManifestFile, Segment, local_path,
    parse_manifest_archive,
};
pub use segments::{SegmentDownloader, SegmentOutcome};
pub use token::{TokenIssue, is_token_plausible};
