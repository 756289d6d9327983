//! SHA-256 verification of downloaded files against their manifest entry.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use bsm_core::Progression;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::manifest::{Manifest, ManifestFile, local_path};

/// Read buffer for hashing.
const HASH_CHUNK: usize = 1024 * 1024;

/// SHA-256 of the file at `path`, lowercase hex.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_CHUNK];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Whether `path` exists and hashes to the manifest-declared SHA-256.
///
/// Hashing runs on the blocking pool. Any read failure counts as invalid.
pub async fn is_valid(file: &ManifestFile, path: &Path) -> bool {
    let owned = path.to_path_buf();
    match tokio::task::spawn_blocking(move || hash_file(&owned)).await {
        Ok(Ok(actual)) => actual.eq_ignore_ascii_case(&file.sha256),
        Ok(Err(e)) => {
            if e.kind() != io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "Cannot hash file");
            }
            false
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Hashing task failed");
            false
        }
    }
}

/// Check every manifest file under `root`, returning the names that fail.
///
/// `on_progress` gets one tick per checked file, counted in files and tagged
/// with the file name.
pub async fn find_invalid_files(
    manifest: &Manifest,
    root: &Path,
    mut on_progress: impl FnMut(Progression<String>),
) -> Vec<String> {
    let mut progress: Progression<String> = Progression::new(0, manifest.files.len() as u64);
    let mut invalid = Vec::new();

    for (name, file) in &manifest.files {
        let valid = match local_path(root, name) {
            Some(path) => is_valid(file, &path).await,
            None => {
                warn!(file = %name, "Manifest entry escapes the destination");
                false
            }
        };
        if !valid {
            invalid.push(name.clone());
        }

        progress.advance(1);
        on_progress(progress.clone().with_data(name.clone()));
    }

    if !invalid.is_empty() {
        debug!(count = invalid.len(), "Files failed verification");
    }
    invalid
}
