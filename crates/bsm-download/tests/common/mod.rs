//! In-memory Oculus CDN for engine tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bsm_download::oculus::{CdnClient, CdnError, Manifest, ManifestFile, Segment};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use sha2::{Digest, Sha256};
use url::Url;

pub const BINARY_ID: &str = "2716512218368633";
pub const TOKEN: &str = "OCAfK3ZQxvB8HqZkd9jl2ZCZD";

pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Deterministic file content.
pub fn content(seed: u8, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| seed.wrapping_mul(31).wrapping_add((i % 251) as u8))
        .collect()
}

/// A build: files, their contents and the manifest describing them.
#[derive(Default)]
pub struct FakeBuild {
    pub files: BTreeMap<String, Vec<u8>>,
    pub manifest: Manifest,
}

impl FakeBuild {
    /// Add a file split into `segment_size` chunks.
    pub fn file(mut self, name: &str, data: Vec<u8>, segment_size: usize) -> Self {
        let segments = data
            .chunks(segment_size)
            .enumerate()
            .map(|(i, chunk)| Segment {
                index: i as u64,
                sha256: sha256_hex(chunk),
                size: chunk.len() as u64,
            })
            .collect();
        self.manifest.files.insert(
            name.to_string(),
            ManifestFile {
                sha256: sha256_hex(&data),
                size: data.len() as u64,
                segment_size: segment_size as u64,
                segments,
            },
        );
        self.files.insert(name.to_string(), data);
        self
    }

    pub fn total(&self) -> u64 {
        self.files.values().map(|d| d.len() as u64).sum()
    }

    pub fn segment_count(&self, name: &str) -> usize {
        self.manifest.files[name].segments.len()
    }

    pub fn manifest_zip(&self) -> Vec<u8> {
        let json = serde_json::to_vec(&self.manifest).unwrap();
        zip_entry("manifest.json", &json)
    }
}

pub fn zip_entry(name: &str, body: &[u8]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(name, zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(body).unwrap();
    writer.finish().unwrap().into_inner()
}

/// Serves one manifest archive and any number of segments.
#[derive(Default)]
pub struct FakeCdn {
    manifest: Mutex<Option<Vec<u8>>>,
    segments: Mutex<HashMap<String, Vec<u8>>>,
    delay: Duration,
    pub manifest_fetches: AtomicUsize,
    pub segment_fetches: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeCdn {
    pub fn serving(build: &FakeBuild) -> Self {
        let cdn = Self::default();
        cdn.set_manifest(build.manifest_zip());
        for (name, file) in &build.manifest.files {
            let data = &build.files[name];
            let mut offset = 0usize;
            for segment in &file.segments {
                let end = offset + segment.size as usize;
                cdn.add_segment(&segment.sha256, &data[offset..end]);
                offset = end;
            }
        }
        cdn
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_manifest(&self, archive: Vec<u8>) {
        *self.manifest.lock().unwrap() = Some(archive);
    }

    pub fn add_segment(&self, sha: &str, data: &[u8]) {
        self.segments
            .lock()
            .unwrap()
            .insert(sha.to_string(), deflate(data));
    }

    pub fn segment_fetches(&self) -> usize {
        self.segment_fetches.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn serve_segment(&self, sha: &str) -> Result<Vec<u8>, CdnError> {
        self.segment_fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let body = self.segments.lock().unwrap().get(sha).cloned();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        body.ok_or(CdnError::Status { status: 404 })
    }
}

#[async_trait]
impl CdnClient for FakeCdn {
    async fn get_bytes(&self, url: &Url) -> Result<Vec<u8>, CdnError> {
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(query.get("access_token").map(String::as_str), Some(TOKEN));

        if let Some(sha) = query.get("segment_sha256") {
            assert_eq!(query.get("binary_id").map(String::as_str), Some(BINARY_ID));
            return self.serve_segment(sha).await;
        }

        assert_eq!(query.get("get_manifest").map(String::as_str), Some("1"));
        assert_eq!(query.get("id").map(String::as_str), Some(BINARY_ID));
        self.manifest_fetches.fetch_add(1, Ordering::SeqCst);
        self.manifest
            .lock()
            .unwrap()
            .clone()
            .ok_or(CdnError::Status { status: 404 })
    }
}
