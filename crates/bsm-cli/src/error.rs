//! CLI error type and its mapping to process exit codes.

use bsm_core::{AcquireError, ErrorCategory};
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Failure reported by an acquisition engine.
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    /// The user stopped the download.
    #[error("Download stopped")]
    Cancelled,

    /// Argument validation error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// Terminal input/output error.
    #[error("IO error: {0}")]
    Io(String),
}

impl CliError {
    /// Map error to an exit code following sysexits.h where one fits.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Acquire(err) => match err.category() {
                ErrorCategory::Integrity => 65,      // EX_DATAERR
                ErrorCategory::Transport => 69,      // EX_UNAVAILABLE
                ErrorCategory::Io => 74,             // EX_IOERR
                ErrorCategory::Protocol => match err {
                    AcquireError::Process { .. } => 71, // EX_OSERR
                    _ => 76, // EX_PROTOCOL
                },
                ErrorCategory::Authentication => 77, // EX_NOPERM
                ErrorCategory::State => 1,
            },
            Self::Cancelled => 130,
            Self::Arguments(_) => 2,
            Self::Io(_) => 74,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
