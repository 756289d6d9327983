//! Acquisition error types.
//!
//! These errors are designed to be serializable and not depend on external
//! error types like `std::io::Error` or `reqwest::Error`. For those, we
//! capture the kind and message as strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::depot::ErrorEvent;

/// Result type alias for acquisition operations.
pub type AcquireResult<T> = Result<T, AcquireError>;

/// Broad family an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Credentials, tokens, approvals.
    Authentication,
    /// Network, endpoints, missing remote resources.
    Transport,
    /// Downloaded content does not match what the manifest declares.
    Integrity,
    /// Unexpected output or lifecycle of the external downloader.
    Protocol,
    /// Misuse of an engine instance (e.g. concurrent `download()`).
    State,
    /// Local file system.
    Io,
}

/// Failure to obtain the manifest of a segmented build.
///
/// Each variant gets its own remediation text in the UI, so they are never
/// folded into one another.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManifestError {
    /// The manifest container could not be downloaded.
    #[error("Failed to download manifest: {message}")]
    Download {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// The downloaded bytes are not a readable archive.
    #[error("Manifest archive is unreadable: {message}")]
    Archive { message: String },

    /// The archive does not contain the manifest entry.
    #[error("Manifest file not found: {name}")]
    EntryNotFound { name: String },

    /// The manifest entry is not a valid manifest document.
    #[error("Failed to parse manifest: {message}")]
    Parse { message: String },
}

impl ManifestError {
    /// Stable code for this failure.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Download { .. } => "DOWNLOAD_MANIFEST_ZIP_FAILED",
            Self::Archive { .. } => "READ_MANIFEST_ZIP_FAILED",
            Self::EntryNotFound { .. } => "MANIFEST_FILE_NOT_FOUND",
            Self::Parse { .. } => "PARSE_MANIFEST_FILE_FAILED",
        }
    }
}

/// Error type for build acquisition.
///
/// Every engine stream terminates with at most one of these. Cancellation is
/// not an error: a cancelled stream simply ends.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "details", rename_all = "snake_case")]
pub enum AcquireError {
    /// `download()` was called while another download is active on the same engine.
    #[error("A download is already in progress")]
    AlreadyDownloading,

    /// Input was sent while no downloader process is running.
    #[error("No downloader process is running")]
    NotRunning,

    /// The downloader asked for a password during an unattended download.
    #[error("Password requested during unattended download")]
    PasswordRequired,

    /// The bearer token is unusable (empty, malformed).
    #[error("Invalid access token: {reason}")]
    InvalidToken { reason: String },

    /// A required build identifier is missing from the request.
    #[error("Build identity has no {field}")]
    MissingIdentifier { field: String },

    /// The external downloader reported an error line.
    #[error("DepotDownloader error {}: {}", .kind.token(), .message.as_deref().unwrap_or("no details"))]
    Depot {
        kind: ErrorEvent,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// The external downloader executable does not exist.
    #[error("DepotDownloader executable not found at {path}")]
    ExecutableNotFound { path: String },

    /// Spawning, reading from, or writing to the downloader process failed.
    #[error("Downloader process failed: {message}")]
    Process { message: String },

    /// The manifest could not be obtained.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// A segment of a file could not be fetched or decoded.
    #[error("Failed to fetch segment {segment} of {file}: {message}")]
    SegmentFetch {
        file: String,
        segment: String,
        message: String,
    },

    /// Network/HTTP error outside of segment fetching.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// Files still fail hash verification after the download pass.
    #[error("{} file(s) failed integrity verification", .files.len())]
    IntegrityFailed { files: Vec<String> },

    /// I/O error during file operations.
    #[error("I/O error ({kind}): {message}")]
    Io { kind: String, message: String },

    /// General/uncategorized error.
    #[error("{message}")]
    Other { message: String },
}

impl AcquireError {
    /// Create an I/O error from kind and message strings.
    pub fn io(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error from a `std::io::Error`.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        Self::Io {
            kind: format!("{:?}", err.kind()),
            message: err.to_string(),
        }
    }

    /// Create a process error.
    pub fn process(message: impl Into<String>) -> Self {
        Self::Process {
            message: message.into(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Self::Network {
            message: message.into(),
            status_code,
        }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Stable code a caller can map to a user-facing message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyDownloading => "ALREADY_DOWNLOADING",
            Self::NotRunning => "NOT_RUNNING",
            Self::PasswordRequired => "PASSWORD_REQUIRED",
            Self::InvalidToken { .. } => "INVALID_TOKEN",
            Self::MissingIdentifier { .. } => "MISSING_IDENTIFIER",
            Self::Depot { kind, .. } => kind.token(),
            Self::ExecutableNotFound { .. } => "EXE_NOT_FOUND",
            Self::Process { .. } => "PROCESS_FAILED",
            Self::Manifest(err) => err.code(),
            Self::SegmentFetch { .. } => "DOWNLOAD_FILE_FAILED",
            Self::Network { .. } => "NETWORK_ERROR",
            Self::IntegrityFailed { .. } => "SOME_FILES_FAILED_TO_DOWNLOAD",
            Self::Io { .. } => "IO_ERROR",
            Self::Other { .. } => "UNKNOWN",
        }
    }

    /// Family this error belongs to.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AlreadyDownloading | Self::NotRunning | Self::MissingIdentifier { .. } => {
                ErrorCategory::State
            }
            Self::PasswordRequired | Self::InvalidToken { .. } => ErrorCategory::Authentication,
            Self::Depot { kind, .. } => kind.category(),
            Self::ExecutableNotFound { .. } | Self::Io { .. } => ErrorCategory::Io,
            Self::Process { .. } | Self::Other { .. } => ErrorCategory::Protocol,
            Self::Manifest(_) | Self::SegmentFetch { .. } | Self::Network { .. } => {
                ErrorCategory::Transport
            }
            Self::IntegrityFailed { .. } => ErrorCategory::Integrity,
        }
    }
}

impl From<std::io::Error> for AcquireError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io_error(&err)
    }
}
