//! Build manifests of segmented Oculus binaries.
//!
//! The CDN serves the manifest as a zip archive containing a single
//! `manifest.json`. Every file is split into raw-deflate segments addressed by
//! their SHA-256:
//!
//! ```json
//! {
//!   "files": {
//!     "Beat Saber.exe": {
//!       "sha256": "…",
//!       "size": 651264,
//!       "segmentSize": 1048576,
//!       "segments": [[0, "…", 651264]]
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use bsm_core::ManifestError;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::cdn::CdnClient;

/// Name of the manifest entry inside the archive.
pub const MANIFEST_ENTRY: &str = "manifest.json";

// ============================================================================
// Types
// ============================================================================

/// Description of a complete, correct build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Number or string depending on the manifest generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_code: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_version: Option<u64>,
    /// Relative path to file description.
    pub files: BTreeMap<String, ManifestFile>,
}

impl Manifest {
    /// Bytes a full download writes: the sum of every file's segment sizes.
    pub fn download_size(&self) -> u64 {
        self.files.values().map(ManifestFile::download_size).sum()
    }
}

/// One file of the build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestFile {
    /// SHA-256 of the whole file, hex.
    pub sha256: String,
    /// Declared size. Informational; totals use [`Self::download_size`].
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub segment_size: u64,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl ManifestFile {
    /// Sum of segment sizes.
    pub fn download_size(&self) -> u64 {
        self.segments.iter().map(|s| s.size).sum()
    }
}

/// A chunk of a file, serialized as the triple `[index, sha256, size]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, String, u64)", into = "(u64, String, u64)")]
pub struct Segment {
    pub index: u64,
    pub sha256: String,
    pub size: u64,
}

impl From<(u64, String, u64)> for Segment {
    fn from((index, sha256, size): (u64, String, u64)) -> Self {
        Self {
            index,
            sha256,
            size,
        }
    }
}

impl From<Segment> for (u64, String, u64) {
    fn from(segment: Segment) -> Self {
        (segment.index, segment.sha256, segment.size)
    }
}

// ============================================================================
// Fetching
// ============================================================================

/// Downloads and unpacks manifests.
pub struct ManifestFetcher {
    cdn: Arc<dyn CdnClient>,
}

impl ManifestFetcher {
    pub fn new(cdn: Arc<dyn CdnClient>) -> Self {
        Self { cdn }
    }

    /// Download the archive at `url` and parse its manifest, all in memory.
    pub async fn fetch(&self, url: &Url) -> Result<Manifest, ManifestError> {
        let bytes = self
            .cdn
            .get_bytes(url)
            .await
            .map_err(|e| ManifestError::Download {
                message: e.to_string(),
                status_code: e.status_code(),
            })?;
        debug!(bytes = bytes.len(), "Downloaded manifest archive");

        let manifest = parse_manifest_archive(bytes)?;
        debug!(
            files = manifest.files.len(),
            download_size = manifest.download_size(),
            version = ?manifest.version,
            "Parsed manifest"
        );
        Ok(manifest)
    }
}

/// Open `bytes` as a zip archive and parse its `manifest.json`.
pub fn parse_manifest_archive(bytes: Vec<u8>) -> Result<Manifest, ManifestError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ManifestError::Archive {
            message: e.to_string(),
        })?;

    let mut entry = archive.by_name(MANIFEST_ENTRY).map_err(|e| match e {
        zip::result::ZipError::FileNotFound => ManifestError::EntryNotFound {
            name: MANIFEST_ENTRY.to_string(),
        },
        other => ManifestError::Archive {
            message: other.to_string(),
        },
    })?;

    let mut raw = Vec::new();
    entry
        .read_to_end(&mut raw)
        .map_err(|e| ManifestError::Archive {
            message: e.to_string(),
        })?;

    serde_json::from_slice(&raw).map_err(|e| ManifestError::Parse {
        message: e.to_string(),
    })
}

/// Where manifest entry `name` lives under `root`.
///
/// Accepts `/` and `\` separators. Returns `None` for absolute paths or paths
/// that would escape `root`.
pub fn local_path(root: &Path, name: &str) -> Option<PathBuf> {
    let normalized = name.replace('\\', "/");
    let relative = Path::new(&normalized);
    let mut path = root.to_path_buf();
    let mut pushed = false;
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                path.push(part);
                pushed = true;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    pushed.then_some(path)
}
