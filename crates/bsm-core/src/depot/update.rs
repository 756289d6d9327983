//! Interpreted items of a Steam download stream.

use serde::{Deserialize, Serialize};

use super::events::WarningEvent;

/// Which one-time code the downloader is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    /// Steam Guard code sent by e-mail.
    SteamGuard,
    /// Mobile authenticator code.
    TwoFactor,
}

/// What a Steam download stream surfaces to its consumer.
///
/// Failures are not a variant: they terminate the stream as
/// `Err(AcquireError)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DepotUpdate {
    /// The downloader started; `context` echoes the caller-supplied start data.
    Started { context: serde_json::Value },
    /// The downloader asks for the account password. Answer with `send_input`.
    PasswordRequired,
    /// The downloader asks for a one-time code. Answer with `send_input`.
    CodeRequired { kind: CodeKind },
    /// Login awaits approval in the Steam mobile app.
    MobileApprovalPending,
    /// Login completed.
    LoggedIn { steam_id: Option<String> },
    /// QR-code login challenge to render for the user.
    QrCode { challenge_url: String },
    /// Transfer or validation progress in percent.
    Progress { percent: f64 },
    /// Non-fatal notice; the download continues.
    Warning {
        kind: WarningEvent,
        message: Option<String>,
    },
    /// Terminal success.
    Finished,
}

impl DepotUpdate {
    /// Whether this item ends the stream successfully.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Whether the stream is now waiting on caller input.
    pub const fn needs_input(&self) -> bool {
        matches!(self, Self::PasswordRequired | Self::CodeRequired { .. })
    }
}
